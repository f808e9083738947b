//! Ready-made networks: the textbook examples plus seeded random chains and trees.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distribution::{ConditionalProbabilityTable, DiscreteDistribution, Distribution};
use crate::error::Result;
use crate::network::Network;
use crate::variable::Variable;

const DOORS: [&str; 3] = ["A", "B", "C"];

/// Priors of the guest's pick and the prize, and the host's table conditioned on both.
pub fn monty_hall_distributions() -> Result<(Distribution, Distribution, Distribution)> {
    let guest = Variable::new("guest", DOORS)?;
    let prize = Variable::new("prize", DOORS)?;
    let monty = Variable::new("monty", DOORS)?;

    let mut rows = Vec::with_capacity(27);
    for g in DOORS {
        for p in DOORS {
            for m in DOORS {
                // NB monty opens neither the guest's door nor the prize door, at random if both
                //    are the same.
                let prob = if m == g || m == p {
                    0.0
                } else if g == p {
                    0.5
                } else {
                    1.0
                };
                rows.push((vec![g, p, m], prob));
            }
        }
    }

    Ok((
        DiscreteDistribution::uniform(&guest).into(),
        DiscreteDistribution::uniform(&prize).into(),
        ConditionalProbabilityTable::new(&monty, vec![guest, prize], rows)?.into(),
    ))
}

/// The Monty Hall network, baked: guest -> monty <- prize.
pub fn monty_hall() -> Result<Network> {
    let (guest, prize, monty) = monty_hall_distributions()?;

    let mut net = Network::new("monty-hall");
    net.add_state(guest.variable().clone(), guest, "guest")?;
    net.add_state(prize.variable().clone(), prize, "prize")?;
    net.add_state(monty.variable().clone(), monty, "monty")?;

    net.add_edge("guest", "monty")?;
    net.add_edge("prize", "monty")?;
    net.bake()?;

    Ok(net)
}

/// The cloudy / sprinkler / rain / wet-grass network, baked. Its undirected skeleton has a loop.
pub fn sprinkler() -> Result<Network> {
    let binary = ["F", "T"];
    let cloudy = Variable::new("cloudy", binary)?;
    let sprinkler = Variable::new("sprinkler", binary)?;
    let rain = Variable::new("rain", binary)?;
    let wet = Variable::new("wet", binary)?;

    let p_cloudy = DiscreteDistribution::from_probabilities(&cloudy, vec![0.5, 0.5])?;
    let p_sprinkler = ConditionalProbabilityTable::from_table(
        &sprinkler,
        vec![cloudy.clone()],
        vec![0.5, 0.5, 0.9, 0.1],
    )?;
    let p_rain = ConditionalProbabilityTable::from_table(
        &rain,
        vec![cloudy.clone()],
        vec![0.8, 0.2, 0.2, 0.8],
    )?;
    let p_wet = ConditionalProbabilityTable::from_table(
        &wet,
        vec![sprinkler.clone(), rain.clone()],
        vec![1.0, 0.0, 0.2, 0.8, 0.1, 0.9, 0.01, 0.99],
    )?;

    let mut net = Network::new("sprinkler");
    net.add_state(cloudy, p_cloudy, "cloudy")?;
    net.add_state(sprinkler, p_sprinkler, "sprinkler")?;
    net.add_state(rain, p_rain, "rain")?;
    net.add_state(wet, p_wet, "wet")?;

    net.add_edge("cloudy", "sprinkler")?;
    net.add_edge("cloudy", "rain")?;
    net.add_edge("sprinkler", "wet")?;
    net.add_edge("rain", "wet")?;
    net.bake()?;

    Ok(net)
}

fn random_rows<R: Rng>(rng: &mut R, n_rows: usize, k: usize) -> Vec<f64> {
    let mut table = Vec::with_capacity(n_rows * k);

    for _ in 0..n_rows {
        // NB offset keeps every cell strictly positive.
        let row: Vec<f64> = (0..k).map(|_| rng.random::<f64>() + 1e-3).collect();
        let sum: f64 = row.iter().sum();
        table.extend(row.iter().map(|p| p / sum));
    }
    table
}

fn random_variables(num_vars: usize, n_states: usize) -> Result<Vec<Variable>> {
    let domain: Vec<String> = (0..n_states).map(|s| s.to_string()).collect();

    (0..num_vars)
        .map(|i| Variable::new(&format!("x{i}"), &domain))
        .collect()
}

/// Builds a baked network over `x0..` where each `(parent, child)` edge carries a random table
/// and every state without a parent gets a random prior.
fn random_network(
    name: &str,
    num_vars: usize,
    n_states: usize,
    edges: &[(usize, usize)],
    seed: u64,
) -> Result<Network> {
    let mut rng = StdRng::seed_from_u64(seed);
    let variables = random_variables(num_vars, n_states)?;

    let mut parent = vec![None; num_vars];
    for &(p, c) in edges {
        parent[c] = Some(p);
    }

    let mut net = Network::new(name);
    for (i, var) in variables.iter().enumerate() {
        let distribution: Distribution = match parent[i] {
            None => {
                let probs = random_rows(&mut rng, 1, n_states);
                DiscreteDistribution::from_probabilities(var, probs)?.into()
            }
            Some(p) => {
                let table = random_rows(&mut rng, n_states, n_states);
                ConditionalProbabilityTable::from_table(var, vec![variables[p].clone()], table)?
                    .into()
            }
        };
        net.add_state(var.clone(), distribution, var.name())?;
    }

    for &(p, c) in edges {
        net.add_edge(variables[p].name(), variables[c].name())?;
    }
    net.bake()?;

    Ok(net)
}

/// A Markov chain `x0 -> x1 -> ...` with random tables.
pub fn random_chain(num_vars: usize, n_states: usize, seed: u64) -> Result<Network> {
    let edges: Vec<(usize, usize)> = (1..num_vars).map(|i| (i - 1, i)).collect();
    random_network("chain", num_vars, n_states, &edges, seed)
}

/// A random tree rooted at `x0`, grown by picking a random frontier node and giving it up to two
/// children until `num_vars` is reached.
pub fn random_tree(num_vars: usize, n_states: usize, seed: u64) -> Result<Network> {
    let mut rng = StdRng::seed_from_u64(seed);

    let mut edges = Vec::new();
    let mut frontier = vec![0];
    let mut current_vars = 1;

    while current_vars < num_vars && !frontier.is_empty() {
        let idx = rng.random_range(0..frontier.len());
        let parent = frontier.swap_remove(idx);

        for _ in 0..2 {
            if current_vars < num_vars {
                edges.push((parent, current_vars));
                frontier.push(current_vars);
                current_vars += 1;
            }
        }
    }

    // NB tables draw from a separate stream so the shape does not shift them.
    random_network("tree", num_vars, n_states, &edges, seed.wrapping_add(1))
}
