use rand::Rng;

use crate::distribution::Distribution;
use crate::error::Result;
use crate::network::Network;

impl Network {
    /// Draws `n` complete rows by ancestral sampling in topological order.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Result<Vec<Vec<String>>> {
        let graph = self.factor_graph()?;
        let mut rows = Vec::with_capacity(n);

        for _ in 0..n {
            let mut values = vec![0; self.states.len()];

            for &s in &graph.order {
                let state = &self.states[s];
                let drawn = match &state.distribution {
                    Distribution::Discrete(d) => d.sample(rng),
                    Distribution::Conditional(c) => {
                        let parent_values: Vec<usize> =
                            graph.parents(s).iter().map(|&p| values[p]).collect();
                        c.sample(&parent_values, rng)
                    }
                };
                values[s] = state.variable.index_of(drawn)?;
            }

            rows.push(
                values
                    .iter()
                    .zip(self.states.iter())
                    .map(|(&i, s)| s.variable.value(i).to_string())
                    .collect(),
            );
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::monty_hall;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_samples_are_legal_monty_moves() {
        let net = monty_hall().unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let rows = net.sample(&mut rng, 200).unwrap();
        assert_eq!(rows.len(), 200);

        for row in &rows {
            assert_ne!(row[2], row[0], "monty opened the guest's door: {:?}", row);
            assert_ne!(row[2], row[1], "monty opened the prize door: {:?}", row);
        }
    }

    #[test]
    fn test_sampling_is_seeded() {
        let net = monty_hall().unwrap();

        let a = net.sample(&mut StdRng::seed_from_u64(7), 20).unwrap();
        let b = net.sample(&mut StdRng::seed_from_u64(7), 20).unwrap();
        assert_eq!(a, b);
    }
}
