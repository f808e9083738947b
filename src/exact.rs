use crate::distribution::DiscreteDistribution;
use crate::error::Result;
use crate::network::Network;
use crate::query::Evidence;
use crate::utils::{logsumexp, next_assignment, uniform};

impl Network {
    /// Posterior marginals by enumerating every joint assignment consistent with `evidence`.
    ///
    /// NB warning: exponential complexity in the number of states. Serves as ground truth for
    ///    belief propagation on small networks.
    pub fn exact_marginals(&self, evidence: &Evidence) -> Result<Vec<DiscreteDistribution>> {
        let graph = self.factor_graph()?;
        let clamped = self.resolve_evidence(evidence)?;

        let domains: Vec<usize> = graph.variables.iter().map(|v| v.cardinality).collect();
        let mut log_joint: Vec<Vec<Vec<f64>>> =
            domains.iter().map(|&k| vec![Vec::new(); k]).collect();

        let mut config = vec![0; domains.len()];
        loop {
            let consistent = clamped
                .iter()
                .zip(config.iter())
                .all(|(c, &x)| c.map_or(true, |v| v == x));

            if consistent {
                let mut log_prob = 0.0;
                for factor in &graph.factors {
                    let table = self.states[factor.state].distribution.table();
                    let idx = factor
                        .variables
                        .iter()
                        .fold(0, |idx, &v| idx * domains[v] + config[v]);
                    log_prob += table[idx].ln();
                }

                for (i, &x) in config.iter().enumerate() {
                    log_joint[i][x].push(log_prob);
                }
            }

            if !next_assignment(&mut config, &domains) {
                break;
            }
        }

        let marginals = log_joint
            .iter()
            .zip(self.states.iter())
            .map(|(per_value, state)| {
                let logs: Vec<f64> = per_value.iter().map(|l| logsumexp(l)).collect();
                let log_z = logsumexp(&logs);

                // NB evidence of zero probability leaves nothing to normalize.
                let probs = if log_z == f64::NEG_INFINITY {
                    uniform(logs.len())
                } else {
                    logs.iter().map(|l| (l - log_z).exp()).collect()
                };
                DiscreteDistribution::from_marginal(&state.variable, probs)
            })
            .collect();

        Ok(marginals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BeliefError;
    use crate::models::{monty_hall, sprinkler};

    #[test]
    fn test_exact_monty_switching() {
        let net = monty_hall().unwrap();
        let exact = net
            .exact_marginals(&Evidence::from([("guest", "A"), ("monty", "C")]))
            .unwrap();

        let prize = exact[1].probabilities();
        assert!((prize[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((prize[1] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(prize[2], 0.0);
    }

    #[test]
    fn test_exact_sprinkler_wet_grass() {
        let net = sprinkler().unwrap();
        let exact = net.exact_marginals(&Evidence::new()).unwrap();

        // NB P(W = T) = 0.6061, summed over the four (S, R) configurations.
        assert!((exact[3].probability("T").unwrap() - 0.6061).abs() < 1e-4);

        let exact = net.exact_marginals(&Evidence::from([("wet", "T")])).unwrap();
        // NB P(R = T | W = T) = 0.4171 / 0.6061.
        assert!((exact[2].probability("T").unwrap() - 0.4171 / 0.6061).abs() < 1e-4);
    }

    #[test]
    fn test_exact_contradiction_is_uniform() {
        let net = monty_hall().unwrap();
        let exact = net
            .exact_marginals(&Evidence::from([("guest", "A"), ("monty", "A")]))
            .unwrap();

        for m in &exact {
            assert_eq!(m.probabilities(), &[1.0 / 3.0; 3]);
        }
    }

    #[test]
    fn test_exact_requires_bake() {
        let mut net = monty_hall().unwrap();
        net.graph = None;

        assert!(matches!(
            net.exact_marginals(&Evidence::new()),
            Err(BeliefError::UnbakedNetwork)
        ));
    }
}
