//! Discrete Bayesian networks with loopy belief propagation.
//!
//! A `Network` holds named states, each bound to a prior or a conditional probability table.
//! `bake` compiles it into a factor graph; queries then run synchronous sum-product message
//! passing with evidence clamped. Parameters are fitted by maximum likelihood from complete rows.

// NB declare the public modules.
pub mod belief;
pub mod distribution;
pub mod error;
pub mod exact;
pub mod factor_graph;
pub mod learning;
pub mod models;
pub mod network;
pub mod query;
pub mod sampling;
pub mod utils;
pub mod variable;

pub use belief::{BeliefPropagationConfig, BeliefPropagationDiagnostics, PropagationState};
pub use distribution::{
    ConditionalProbabilityTable, DiscreteDistribution, Distribution, DistributionRecord,
    WeightedObservation,
};
pub use error::{BeliefError, Result};
pub use learning::{Pseudocount, SufficientStatistics};
pub use network::{Network, NetworkRecord, State};
pub use query::Evidence;
pub use variable::Variable;
