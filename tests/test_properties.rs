use belief_net::models::{random_chain, random_tree};
use belief_net::{Evidence, Pseudocount};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_tree_bp_matches_enumeration(
        num_vars in 2usize..8,
        n_states in 2usize..4,
        seed in any::<u64>(),
        observed in any::<prop::sample::Index>(),
    ) {
        let net = random_tree(num_vars, n_states, seed).unwrap();
        let name = format!("x{}", observed.index(num_vars));
        let evidence = Evidence::from([(name.as_str(), "1")]);

        let bp = net.predict_proba(&evidence).unwrap();
        let exact = net.exact_marginals(&evidence).unwrap();

        for (b, e) in bp.iter().zip(exact.iter()) {
            for (p, q) in b.probabilities().iter().zip(e.probabilities().iter()) {
                prop_assert!((p - q).abs() < 1e-3, "{:?} vs {:?}", b, e);
            }
        }
    }

    #[test]
    fn prop_fitted_rows_sum_to_one(
        num_vars in 2usize..6,
        n_states in 2usize..4,
        n_rows in 0usize..50,
        pseudocount in 0.0f64..2.0,
        seed in any::<u64>(),
    ) {
        let mut net = random_chain(num_vars, n_states, seed).unwrap();
        let rows = net.sample(&mut StdRng::seed_from_u64(seed), n_rows).unwrap();

        net.fit_weighted(&rows, None, &Pseudocount::Uniform(pseudocount)).unwrap();

        for state in net.states() {
            for row in state.distribution.table().chunks(n_states) {
                prop_assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
                prop_assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
            }
        }
    }

    #[test]
    fn prop_marginals_are_distributions(
        seed in any::<u64>(),
        damping in 0.0f64..0.9,
    ) {
        let config = belief_net::BeliefPropagationConfig { damping, ..Default::default() };
        let net = random_chain(5, 3, seed).unwrap().with_config(config).unwrap();

        for m in net.predict_proba(&Evidence::from([("x4", "2")])).unwrap() {
            prop_assert!((m.probabilities().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }
}
