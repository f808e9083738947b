//! Loopy sum-product belief propagation over a compiled factor graph.
//!
//! Messages are updated synchronously: every round reads the previous round's messages and
//! writes into a second buffer, then the buffers are swapped. When the skeleton is a tree the run
//! first sweeps leaves-to-root and back, which is exact whatever the depth; the rounds then only
//! confirm the fixed point. On graphs with cycles results are approximate and convergence is not
//! guaranteed.

use log::{debug, warn};
use serde::Deserialize;

use crate::error::{BeliefError, Result};
use crate::factor_graph::{FactorGraph, FactorNode, FactorType, Message, VariableNode};
use crate::utils::{max_abs_diff, next_assignment, normalize, point_mass, uniform};

/// Configuration for belief propagation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BeliefPropagationConfig {
    /// Maximum synchronous rounds before giving up on convergence.
    pub max_iterations: usize,
    /// Converged once the max absolute message change in a round falls below this.
    pub tolerance: f64,
    /// Weight kept from the previous message, in [0, 1). Zero is plain sum-product.
    pub damping: f64,
}

impl Default for BeliefPropagationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-4,
            damping: 0.0,
        }
    }
}

impl BeliefPropagationConfig {
    pub fn validate(self) -> Result<Self> {
        if self.max_iterations == 0 {
            return Err(BeliefError::InvalidParameter(
                "max_iterations must be > 0".into(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(BeliefError::InvalidParameter(
                "tolerance must be finite and > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.damping) {
            return Err(BeliefError::InvalidParameter(
                "damping must be in [0, 1)".into(),
            ));
        }
        Ok(self)
    }

    /// Parses a (possibly partial) JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationState {
    Initialized,
    Propagating,
    Converged,
    IterationLimitReached,
}

/// Runtime diagnostics for one inference run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeliefPropagationDiagnostics {
    pub state: PropagationState,
    /// Rounds actually executed.
    pub iterations: usize,
    /// Max absolute message change in the last round.
    pub max_delta: f64,
}

impl BeliefPropagationDiagnostics {
    pub fn converged(&self) -> bool {
        self.state == PropagationState::Converged
    }
}

/// Marginals per variable plus how the run terminated.
#[derive(Debug, Clone)]
pub struct Beliefs {
    pub marginals: Vec<Vec<f64>>,
    pub diagnostics: BeliefPropagationDiagnostics,
}

/// Both message directions, indexed by factor graph edge id.
#[derive(Debug, Clone)]
struct Messages {
    var_to_factor: Vec<Vec<f64>>,
    factor_to_var: Vec<Vec<f64>>,
}

/// A single inference run. Owns its message state, so independent runs never share buffers.
pub struct BeliefPropagation<'a> {
    graph: &'a FactorGraph,
    tables: Vec<&'a [f64]>,
    clamped: Vec<Option<usize>>,
    config: BeliefPropagationConfig,
    messages: Messages,
    next: Messages,
    state: PropagationState,
    iterations: usize,
    max_delta: f64,
    degenerate: bool,
}

impl<'a> BeliefPropagation<'a> {
    /// `tables[f]` is the live table of factor `f`; `clamped[v]` the observed value index of variable `v`.
    pub fn new(
        graph: &'a FactorGraph,
        tables: Vec<&'a [f64]>,
        clamped: Vec<Option<usize>>,
        config: BeliefPropagationConfig,
    ) -> Result<Self> {
        if tables.len() != graph.factors.len() {
            return Err(BeliefError::InvalidParameter(format!(
                "{} tables given for {} factors",
                tables.len(),
                graph.factors.len()
            )));
        }
        for (f, table) in tables.iter().enumerate() {
            let size: usize = graph.factor_domains(f).iter().product();
            if table.len() != size {
                return Err(BeliefError::InvalidParameter(format!(
                    "table of factor {} has {} cells, expected {}",
                    f,
                    table.len(),
                    size
                )));
            }
        }
        if clamped.len() != graph.variables.len() {
            return Err(BeliefError::InvalidParameter(format!(
                "{} clamp entries given for {} variables",
                clamped.len(),
                graph.variables.len()
            )));
        }
        for (var, obs) in graph.variables.iter().zip(clamped.iter()) {
            if let Some(obs) = *obs {
                if obs >= var.cardinality {
                    return Err(BeliefError::InvalidParameter(format!(
                        "variable {} clamped to index {} but has {} values",
                        var.id, obs, var.cardinality
                    )));
                }
            }
        }

        let card = |eid: usize| graph.variables[graph.edges[eid].variable].cardinality;

        // NB clamped variables emit a point mass from the start and are never updated.
        let var_to_factor = (0..graph.num_edges())
            .map(|eid| match clamped[graph.edges[eid].variable] {
                Some(obs) => point_mass(card(eid), obs),
                None => uniform(card(eid)),
            })
            .collect();
        let factor_to_var = (0..graph.num_edges()).map(|eid| uniform(card(eid))).collect();

        let messages = Messages {
            var_to_factor,
            factor_to_var,
        };

        Ok(Self {
            graph,
            tables,
            clamped,
            config,
            next: messages.clone(),
            messages,
            state: PropagationState::Initialized,
            iterations: 0,
            max_delta: 0.0,
            degenerate: false,
        })
    }

    pub fn state(&self) -> PropagationState {
        self.state
    }

    /// Factor -> variable message along `slot`, unnormalized.
    fn factor_to_var(&self, factor: &FactorNode, slot: usize) -> Vec<f64> {
        let table = self.tables[factor.id];

        match factor.factor_type {
            // NB a prior touches only its own variable, so its message is the table itself.
            FactorType::Prior => table.to_vec(),
            // NB weight the table by incoming messages from all other variables and sum them out,
            //    see eqn. (14.15) of Information, Physics & Computation, Mezard.
            FactorType::Conditional => {
                let domains = self.graph.factor_domains(factor.id);
                let incoming: Vec<&[f64]> = factor
                    .edges
                    .iter()
                    .map(|&eid| self.messages.var_to_factor[eid].as_slice())
                    .collect();

                factor_message(table, &domains, &incoming, slot)
            }
        }
    }

    /// Variable -> factor message along `eid`, unnormalized: product of messages from the other
    /// incident factors, see eqn. (14.14) of Information, Physics & Computation, Mezard.
    fn var_to_factor(&self, var: &VariableNode, eid: usize) -> Vec<f64> {
        let mut msg = vec![1.0; var.cardinality];

        for &other in &var.edges {
            if other != eid {
                for (m, x) in msg.iter_mut().zip(&self.messages.factor_to_var[other]) {
                    *m *= x;
                }
            }
        }
        msg
    }

    /// One synchronous round over every edge in both directions. Returns the max message change.
    pub fn step(&mut self) -> f64 {
        self.state = PropagationState::Propagating;
        let graph = self.graph;
        let damping = self.config.damping;
        let mut max_delta: f64 = 0.0;

        for factor in &graph.factors {
            for (slot, &eid) in factor.edges.iter().enumerate() {
                let mut msg = self.factor_to_var(factor, slot);
                self.degenerate |= !normalize(&mut msg);

                let prev = &self.messages.factor_to_var[eid];
                if damping > 0.0 {
                    damp(&mut msg, prev, damping);
                }

                max_delta = max_delta.max(max_abs_diff(&msg, prev));
                self.next.factor_to_var[eid] = msg;
            }
        }

        for var in &graph.variables {
            if self.clamped[var.id].is_some() {
                continue;
            }

            for &eid in &var.edges {
                let mut msg = self.var_to_factor(var, eid);
                self.degenerate |= !normalize(&mut msg);

                let prev = &self.messages.var_to_factor[eid];
                if damping > 0.0 {
                    damp(&mut msg, prev, damping);
                }

                max_delta = max_delta.max(max_abs_diff(&msg, prev));
                self.next.var_to_factor[eid] = msg;
            }
        }

        std::mem::swap(&mut self.messages, &mut self.next);
        self.iterations += 1;
        self.max_delta = max_delta;

        debug!(
            "Belief propagation iteration {}: max_diff={:.3e}",
            self.iterations, max_delta
        );

        max_delta
    }

    /// Computes every message once, in place, in an order where its inputs are already final.
    /// Exact on a tree regardless of depth.
    fn sweep(&mut self, schedule: &[Message]) {
        self.state = PropagationState::Propagating;
        let graph = self.graph;

        for &message in schedule {
            match message {
                Message::FactorToVariable(eid) => {
                    let edge = graph.edges[eid];
                    let mut msg = self.factor_to_var(&graph.factors[edge.factor], edge.slot);
                    self.degenerate |= !normalize(&mut msg);
                    self.messages.factor_to_var[eid] = msg;
                }
                Message::VariableToFactor(eid) => {
                    let var = &graph.variables[graph.edges[eid].variable];
                    if self.clamped[var.id].is_some() {
                        continue;
                    }
                    let mut msg = self.var_to_factor(var, eid);
                    self.degenerate |= !normalize(&mut msg);
                    self.messages.var_to_factor[eid] = msg;
                }
            }
        }

        debug!("Two-pass sweep over {} messages", schedule.len());
    }

    /// Runs to convergence or the round cap; both outcomes yield usable marginals.
    pub fn run(mut self) -> Beliefs {
        let graph = self.graph;
        if let Some(schedule) = graph.schedule() {
            self.sweep(schedule);
        }

        while self.iterations < self.config.max_iterations {
            if self.step() < self.config.tolerance {
                self.state = PropagationState::Converged;
                break;
            }
        }

        if self.state != PropagationState::Converged {
            self.state = PropagationState::IterationLimitReached;
            warn!(
                "Belief propagation terminated at max iterations ({}) with max_diff={:.3e}",
                self.iterations, self.max_delta
            );
        } else {
            debug!(
                "Converged at iteration {} with tolerance {:.3e}",
                self.iterations, self.max_delta
            );
        }

        let marginals = self.marginals();

        if self.degenerate {
            warn!("Zero-mass messages were replaced by uniform ones; the evidence may be contradictory");
        }

        Beliefs {
            marginals,
            diagnostics: BeliefPropagationDiagnostics {
                state: self.state,
                iterations: self.iterations,
                max_delta: self.max_delta,
            },
        }
    }

    /// Current marginals: point masses for clamped variables, else the normalized product of
    /// incoming factor messages.
    pub fn marginals(&mut self) -> Vec<Vec<f64>> {
        let mut marginals = Vec::with_capacity(self.graph.variables.len());

        for var in &self.graph.variables {
            if let Some(obs) = self.clamped[var.id] {
                marginals.push(point_mass(var.cardinality, obs));
                continue;
            }

            let mut marginal = vec![1.0; var.cardinality];
            for &eid in &var.edges {
                for (m, x) in marginal.iter_mut().zip(&self.messages.factor_to_var[eid]) {
                    *m *= x;
                }
            }
            self.degenerate |= !normalize(&mut marginal);

            marginals.push(marginal);
        }

        marginals
    }
}

fn damp(msg: &mut [f64], prev: &[f64], damping: f64) {
    for (m, p) in msg.iter_mut().zip(prev.iter()) {
        *m = (1.0 - damping) * *m + damping * p;
    }
    normalize(msg);
}

/// Sums the factor table, weighted by the incoming messages of every variable except `target`,
/// onto the target variable's domain. The table is row-major over `domains`.
fn factor_message(table: &[f64], domains: &[usize], incoming: &[&[f64]], target: usize) -> Vec<f64> {
    let mut out = vec![0.0; domains[target]];
    let mut assignment = vec![0; domains.len()];

    for &p in table {
        if p > 0.0 {
            let mut prod = p;

            for (j, msg) in incoming.iter().enumerate() {
                if j != target {
                    prod *= msg[assignment[j]];
                }
            }
            out[assignment[target]] += prod;
        }

        next_assignment(&mut assignment, domains);
    }

    out
}

#[cfg(test)]
mod tests {
    //  NB  cargo test test_chain -- --nocapture
    use super::*;

    fn chain_graph() -> FactorGraph {
        // NB x0 -> x1 -> x2, binary.
        FactorGraph::build(&[2, 2, 2], &[vec![], vec![0], vec![1]], vec![0, 1, 2])
    }

    const PRIOR: [f64; 2] = [0.6, 0.4];
    const TRANS: [f64; 4] = [0.7, 0.3, 0.2, 0.8];

    fn exact_chain(clamped: &[Option<usize>]) -> Vec<Vec<f64>> {
        let mut marginals = vec![vec![0.0; 2]; 3];

        for x0 in 0..2 {
            for x1 in 0..2 {
                for x2 in 0..2 {
                    let config = [x0, x1, x2];
                    if clamped
                        .iter()
                        .zip(config.iter())
                        .any(|(c, x)| c.is_some_and(|c| c != *x))
                    {
                        continue;
                    }
                    let p = PRIOR[x0] * TRANS[x0 * 2 + x1] * TRANS[x1 * 2 + x2];
                    for (v, &x) in config.iter().enumerate() {
                        marginals[v][x] += p;
                    }
                }
            }
        }
        for m in &mut marginals {
            normalize(m);
        }
        marginals
    }

    #[test]
    fn test_factor_message_sums_out_other_variables() {
        // NB P(x1 | x0) with x0 ~ [0.6, 0.4] gives x1 ~ [0.5, 0.5].
        let incoming: Vec<&[f64]> = vec![&PRIOR, &[0.5, 0.5]];
        let mut msg = factor_message(&TRANS, &[2, 2], &incoming, 1);
        normalize(&mut msg);
        assert!((msg[0] - 0.5).abs() < 1e-12);

        // NB upward message with x1 observed = 1 is the column P(x1 = 1 | x0).
        let incoming: Vec<&[f64]> = vec![&[0.5, 0.5], &[0.0, 1.0]];
        let msg = factor_message(&TRANS, &[2, 2], &incoming, 0);
        assert_eq!(msg, vec![0.3, 0.8]);
    }

    #[test]
    fn test_chain_marginals() {
        let fg = chain_graph();
        let tables: Vec<&[f64]> = vec![&PRIOR, &TRANS, &TRANS];

        for clamped in [
            vec![None, None, None],
            vec![None, None, Some(1)],
            vec![Some(0), None, Some(1)],
        ] {
            let beliefs = BeliefPropagation::new(
                &fg,
                tables.clone(),
                clamped.clone(),
                BeliefPropagationConfig::default(),
            )
            .unwrap()
            .run();
            let exact = exact_chain(&clamped);

            assert!(beliefs.diagnostics.converged());
            for v in 0..3 {
                for s in 0..2 {
                    let diff = (beliefs.marginals[v][s] - exact[v][s]).abs();
                    assert!(diff < 1e-6, "Mismatch var={} state={} clamped={:?}", v, s, clamped);
                }
            }
        }
    }

    #[test]
    fn test_state_machine() {
        let fg = chain_graph();
        let tables: Vec<&[f64]> = vec![&PRIOR, &TRANS, &TRANS];
        let mut bp = BeliefPropagation::new(
            &fg,
            tables,
            vec![None, None, Some(0)],
            BeliefPropagationConfig::default(),
        )
        .unwrap();

        assert_eq!(bp.state(), PropagationState::Initialized);
        bp.step();
        assert_eq!(bp.state(), PropagationState::Propagating);
        assert_eq!(bp.run().diagnostics.state, PropagationState::Converged);
    }

    #[test]
    fn test_iteration_limit_is_best_effort() {
        // NB x0 -> x1, x0 -> x2, (x1, x2) -> x3 closes a loop, so there is no exact sweep.
        let fg = FactorGraph::build(
            &[2, 2, 2, 2],
            &[vec![], vec![0], vec![0], vec![1, 2]],
            vec![0, 1, 2, 3],
        );
        let joint: [f64; 8] = [0.9, 0.1, 0.5, 0.5, 0.5, 0.5, 0.1, 0.9];
        let tables: Vec<&[f64]> = vec![&PRIOR, &TRANS, &TRANS, &joint];
        let config = BeliefPropagationConfig {
            max_iterations: 1,
            ..Default::default()
        };

        let beliefs = BeliefPropagation::new(&fg, tables, vec![None, None, None, Some(1)], config)
            .unwrap()
            .run();

        assert_eq!(beliefs.diagnostics.state, PropagationState::IterationLimitReached);
        assert_eq!(beliefs.diagnostics.iterations, 1);
        for m in &beliefs.marginals {
            assert!((m.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_damping_reaches_same_fixed_point() {
        let fg = chain_graph();
        let tables: Vec<&[f64]> = vec![&PRIOR, &TRANS, &TRANS];
        let config = BeliefPropagationConfig {
            damping: 0.5,
            tolerance: 1e-10,
            ..Default::default()
        };
        let clamped = vec![None, None, Some(1)];

        let beliefs = BeliefPropagation::new(&fg, tables, clamped.clone(), config)
            .unwrap()
            .run();
        let exact = exact_chain(&clamped);

        for v in 0..3 {
            for s in 0..2 {
                assert!((beliefs.marginals[v][s] - exact[v][s]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_deep_chain_is_exact() {
        // NB x0 -> ... -> x149 copying its parent; evidence at the far end has to reach x0.
        let n = 150;
        let parents: Vec<Vec<usize>> = (0..n)
            .map(|i| if i == 0 { vec![] } else { vec![i - 1] })
            .collect();
        let fg = FactorGraph::build(&vec![2; n], &parents, (0..n).collect());
        assert!(fg.is_tree());

        let prior = [0.5, 0.5];
        let copy = [1.0, 0.0, 0.0, 1.0];
        let mut tables: Vec<&[f64]> = vec![&copy[..]; n];
        tables[0] = &prior[..];

        let mut clamped = vec![None; n];
        clamped[n - 1] = Some(1);

        let beliefs = BeliefPropagation::new(&fg, tables, clamped, BeliefPropagationConfig::default())
            .unwrap()
            .run();

        println!("{:?}", beliefs.diagnostics);
        assert!(beliefs.diagnostics.converged());
        assert!(beliefs.diagnostics.iterations < 5);
        for m in &beliefs.marginals {
            assert!((m[1] - 1.0).abs() < 1e-12, "{:?}", m);
        }
    }

    #[test]
    fn test_new_rejects_mismatched_inputs() {
        let fg = chain_graph();
        let config = BeliefPropagationConfig::default();

        let short: Vec<&[f64]> = vec![&PRIOR, &TRANS];
        assert!(matches!(
            BeliefPropagation::new(&fg, short, vec![None; 3], config),
            Err(BeliefError::InvalidParameter(_))
        ));

        let wrong_size: Vec<&[f64]> = vec![&PRIOR, &PRIOR, &TRANS];
        assert!(matches!(
            BeliefPropagation::new(&fg, wrong_size, vec![None; 3], config),
            Err(BeliefError::InvalidParameter(_))
        ));

        let tables: Vec<&[f64]> = vec![&PRIOR, &TRANS, &TRANS];
        assert!(matches!(
            BeliefPropagation::new(&fg, tables.clone(), vec![None; 2], config),
            Err(BeliefError::InvalidParameter(_))
        ));
        assert!(matches!(
            BeliefPropagation::new(&fg, tables, vec![None, None, Some(2)], config),
            Err(BeliefError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(BeliefPropagationConfig::default().validate().is_ok());

        let bad = [
            BeliefPropagationConfig {
                max_iterations: 0,
                ..Default::default()
            },
            BeliefPropagationConfig {
                tolerance: 0.0,
                ..Default::default()
            },
            BeliefPropagationConfig {
                damping: 1.0,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(BeliefError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = BeliefPropagationConfig::from_json(r#"{ "max_iterations": 7 }"#).unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.tolerance, 1e-4);
        assert_eq!(config.damping, 0.0);

        assert!(matches!(
            BeliefPropagationConfig::from_json(r#"{ "damping": 2.0 }"#),
            Err(BeliefError::InvalidParameter(_))
        ));
        assert!(matches!(
            BeliefPropagationConfig::from_json("not json"),
            Err(BeliefError::Serialization(_))
        ));
    }
}
