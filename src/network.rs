//! Network construction, validation and compilation (`bake`).

use log::info;
use petgraph::algo::{kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::belief::BeliefPropagationConfig;
use crate::distribution::{Distribution, DistributionRecord};
use crate::error::{BeliefError, Result};
use crate::factor_graph::FactorGraph;
use crate::variable::Variable;

/// A named slot in the network bound to exactly one distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub name: String,
    pub variable: Variable,
    pub distribution: Distribution,
}

/// A directed acyclic graph of states. Insertion order is the canonical order of every query.
#[derive(Debug, Clone)]
pub struct Network {
    pub name: String,
    pub(crate) states: Vec<State>,
    pub(crate) edges: Vec<(usize, usize)>, // (parent, child), insertion order.
    pub(crate) config: BeliefPropagationConfig,
    pub(crate) graph: Option<FactorGraph>,
}

impl Network {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            states: Vec::new(),
            edges: Vec::new(),
            config: BeliefPropagationConfig::default(),
            graph: None,
        }
    }

    pub fn with_config(mut self, config: BeliefPropagationConfig) -> Result<Self> {
        self.set_config(config)?;
        Ok(self)
    }

    pub fn set_config(&mut self, config: BeliefPropagationConfig) -> Result<()> {
        self.config = config.validate()?;
        Ok(())
    }

    pub fn config(&self) -> &BeliefPropagationConfig {
        &self.config
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, name: &str) -> Result<&State> {
        Ok(&self.states[self.state_index(name)?])
    }

    pub fn state_index(&self, name: &str) -> Result<usize> {
        self.states
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| BeliefError::UnknownVariable {
                name: name.to_string(),
            })
    }

    /// Edges as `(parent, child)` state names, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.edges.iter().map(|&(p, c)| {
            (
                self.states[p].name.as_str(),
                self.states[c].name.as_str(),
            )
        })
    }

    pub fn is_baked(&self) -> bool {
        self.graph.is_some()
    }

    pub fn factor_graph(&self) -> Result<&FactorGraph> {
        self.graph.as_ref().ok_or(BeliefError::UnbakedNetwork)
    }

    pub fn add_state(
        &mut self,
        variable: Variable,
        distribution: impl Into<Distribution>,
        name: &str,
    ) -> Result<usize> {
        let distribution = distribution.into();

        if self.states.iter().any(|s| s.name == name) {
            return Err(BeliefError::structure(format!(
                "a state named '{name}' already exists"
            )));
        }
        if self.states.iter().any(|s| s.variable.name() == variable.name()) {
            return Err(BeliefError::structure(format!(
                "variable '{}' is already bound to a state",
                variable.name()
            )));
        }
        if distribution.variable() != &variable {
            return Err(BeliefError::structure(format!(
                "state '{name}' binds variable '{}' to a distribution over '{}'",
                variable.name(),
                distribution.variable().name()
            )));
        }

        self.states.push(State {
            name: name.to_string(),
            variable,
            distribution,
        });
        self.graph = None;

        Ok(self.states.len() - 1)
    }

    pub fn add_edge(&mut self, parent: &str, child: &str) -> Result<()> {
        let p = self.state_index(parent)?;
        let c = self.state_index(child)?;

        if p == c {
            return Err(BeliefError::structure(format!(
                "self-loop on '{parent}'"
            )));
        }
        if self.edges.contains(&(p, c)) {
            return Err(BeliefError::structure(format!(
                "duplicate edge {parent} -> {child}"
            )));
        }

        let parent_var = &self.states[p].variable;
        let declared = self.states[c].distribution.parents();
        if !self.states[c].distribution.is_conditional() {
            return Err(BeliefError::structure(format!(
                "'{child}' has an unconditional distribution and cannot have parents"
            )));
        }
        if !declared.contains(parent_var) {
            return Err(BeliefError::structure(format!(
                "the table of '{child}' is not conditioned on '{}'",
                parent_var.name()
            )));
        }

        self.edges.push((p, c));
        self.graph = None;
        Ok(())
    }

    /// Parent state indices of every state, in the order its table declares them.
    pub(crate) fn parent_indices(&self) -> Result<Vec<Vec<usize>>> {
        self.states
            .iter()
            .map(|state| {
                state
                    .distribution
                    .parents()
                    .iter()
                    .map(|var| {
                        self.states
                            .iter()
                            .position(|s| &s.variable == var)
                            .ok_or_else(|| {
                                BeliefError::structure(format!(
                                    "'{}' is conditioned on '{}', which is not in the network",
                                    state.name, var.name()
                                ))
                            })
                    })
                    .collect()
            })
            .collect()
    }

    /// NB explicit topological sort over an adjacency structure; a cycle reports every edge of
    ///    the first strongly connected component found.
    fn topological_order(&self) -> Result<Vec<usize>> {
        let mut dag: DiGraph<usize, ()> = DiGraph::with_capacity(self.states.len(), self.edges.len());
        let nodes: Vec<NodeIndex> = (0..self.states.len()).map(|i| dag.add_node(i)).collect();

        for &(p, c) in &self.edges {
            dag.add_edge(nodes[p], nodes[c], ());
        }

        match toposort(&dag, None) {
            Ok(order) => Ok(order.into_iter().map(|n| dag[n]).collect()),
            Err(cycle) => {
                let members = kosaraju_scc(&dag)
                    .into_iter()
                    .find(|scc| scc.contains(&cycle.node_id()))
                    .unwrap_or_else(|| vec![cycle.node_id()]);

                let edges: Vec<String> = self
                    .edges
                    .iter()
                    .filter(|&&(p, c)| members.contains(&nodes[p]) && members.contains(&nodes[c]))
                    .map(|&(p, c)| format!("{} -> {}", self.states[p].name, self.states[c].name))
                    .collect();

                Err(BeliefError::structure(format!(
                    "cycle detected among edges: {}",
                    edges.join(", ")
                )))
            }
        }
    }

    /// Validates the graph and compiles the factor graph. Safe to call repeatedly.
    pub fn bake(&mut self) -> Result<()> {
        let order = self.topological_order()?;

        for (c, state) in self.states.iter().enumerate() {
            let incoming: Vec<&Variable> = self
                .edges
                .iter()
                .filter(|&&(_, child)| child == c)
                .map(|&(p, _)| &self.states[p].variable)
                .collect();
            let declared: Vec<&Variable> = state.distribution.parents().iter().collect();

            if incoming != declared {
                let names = |vars: &[&Variable]| {
                    vars.iter()
                        .map(|v| v.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                return Err(BeliefError::structure(format!(
                    "'{}' declares parents [{}] but its incoming edges are [{}]",
                    state.name,
                    names(&declared),
                    names(&incoming)
                )));
            }
        }

        let parents = self.parent_indices()?;
        let cardinalities: Vec<usize> = self.states.iter().map(|s| s.variable.cardinality()).collect();

        self.graph = Some(FactorGraph::build(&cardinalities, &parents, order));

        info!(
            "Baked network '{}': {} states, {} edges",
            self.name,
            self.states.len(),
            self.edges.len()
        );
        Ok(())
    }

    pub fn freeze(&mut self, name: &str) -> Result<()> {
        let i = self.state_index(name)?;
        self.states[i].distribution.freeze();
        Ok(())
    }

    pub fn thaw(&mut self, name: &str) -> Result<()> {
        let i = self.state_index(name)?;
        self.states[i].distribution.thaw();
        Ok(())
    }

    pub fn to_record(&self) -> NetworkRecord {
        NetworkRecord {
            name: self.name.clone(),
            states: self
                .states
                .iter()
                .map(|s| StateRecord {
                    name: s.name.clone(),
                    distribution: s.distribution.to_record(),
                })
                .collect(),
            edges: self
                .edges()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
        }
    }

    /// Rebuilds the structure from a record. The result is unbaked.
    pub fn from_record(record: &NetworkRecord) -> Result<Self> {
        let mut network = Network::new(&record.name);

        for state in &record.states {
            let distribution = Distribution::from_record(&state.distribution)?;
            let variable = distribution.variable().clone();
            network.add_state(variable, distribution, &state.name)?;
        }
        for (parent, child) in &record.edges {
            network.add_edge(parent, child)?;
        }

        Ok(network)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_record())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let record: NetworkRecord = serde_json::from_str(json)?;
        Self::from_record(&record)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub name: String,
    pub distribution: DistributionRecord,
}

/// Serialized form of a `Network`: states in canonical order plus `(parent, child)` edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub name: String,
    pub states: Vec<StateRecord>,
    pub edges: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{ConditionalProbabilityTable, DiscreteDistribution};
    use crate::models::{monty_hall, monty_hall_distributions};

    fn unbaked_monty() -> Network {
        let (guest, prize, monty) = monty_hall_distributions().unwrap();
        let mut net = Network::new("monty-hall");
        net.add_state(guest.variable().clone(), guest, "guest").unwrap();
        net.add_state(prize.variable().clone(), prize, "prize").unwrap();
        net.add_state(monty.variable().clone(), monty, "monty").unwrap();
        net
    }

    fn coin_pair() -> (Variable, Variable, ConditionalProbabilityTable, ConditionalProbabilityTable) {
        let a = Variable::new("a", ["0", "1"]).unwrap();
        let b = Variable::new("b", ["0", "1"]).unwrap();
        let table = vec![0.5, 0.5, 0.5, 0.5];
        let a_given_b = ConditionalProbabilityTable::from_table(&a, vec![b.clone()], table.clone()).unwrap();
        let b_given_a = ConditionalProbabilityTable::from_table(&b, vec![a.clone()], table).unwrap();
        (a, b, a_given_b, b_given_a)
    }

    #[test]
    fn test_add_state_rejects_duplicates() {
        let mut net = unbaked_monty();
        let (guest, _, _) = monty_hall_distributions().unwrap();

        let err = net.add_state(guest.variable().clone(), guest, "guest").unwrap_err();
        assert!(matches!(err, BeliefError::Structure(_)));
        assert_eq!(net.len(), 3);
    }

    #[test]
    fn test_add_state_rejects_mismatched_variable() {
        let mut net = Network::new("n");
        let coin = Variable::new("coin", ["H", "T"]).unwrap();
        let die = Variable::new("die", ["1", "2"]).unwrap();

        let err = net
            .add_state(die, DiscreteDistribution::uniform(&coin), "die")
            .unwrap_err();
        assert!(matches!(err, BeliefError::Structure(_)));
    }

    #[test]
    fn test_add_edge_validation() {
        let mut net = unbaked_monty();

        assert!(matches!(net.add_edge("monty", "monty"), Err(BeliefError::Structure(_))));
        assert!(matches!(net.add_edge("monty", "guest"), Err(BeliefError::Structure(_))));
        assert!(matches!(
            net.add_edge("host", "monty"),
            Err(BeliefError::UnknownVariable { .. })
        ));

        net.add_edge("guest", "monty").unwrap();
        assert!(matches!(net.add_edge("guest", "monty"), Err(BeliefError::Structure(_))));
    }

    #[test]
    fn test_bake_requires_declared_parents() {
        let mut net = unbaked_monty();
        net.add_edge("guest", "monty").unwrap();

        let err = net.bake().unwrap_err();
        assert!(matches!(err, BeliefError::Structure(_)));
        assert!(!net.is_baked());

        net.add_edge("prize", "monty").unwrap();
        net.bake().unwrap();
        assert!(net.is_baked());
    }

    #[test]
    fn test_bake_requires_parent_order() {
        let mut net = unbaked_monty();
        net.add_edge("prize", "monty").unwrap();
        net.add_edge("guest", "monty").unwrap();

        let err = net.bake().unwrap_err();
        assert!(matches!(err, BeliefError::Structure(msg) if msg.contains("[guest, prize]")));
    }

    #[test]
    fn test_bake_reports_cycle_edges() {
        let (a, b, a_given_b, b_given_a) = coin_pair();
        let mut net = Network::new("loop");
        net.add_state(a, a_given_b, "a").unwrap();
        net.add_state(b, b_given_a, "b").unwrap();
        net.add_edge("a", "b").unwrap();
        net.add_edge("b", "a").unwrap();

        match net.bake() {
            Err(BeliefError::Structure(msg)) => {
                assert!(msg.contains("cycle"));
                assert!(msg.contains("a -> b"));
                assert!(msg.contains("b -> a"));
            }
            other => panic!("expected a cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_bake_is_idempotent() {
        let mut net = monty_hall().unwrap();
        let first = net.factor_graph().unwrap().clone();

        net.bake().unwrap();
        let second = net.factor_graph().unwrap();

        assert_eq!(first.order, second.order);
        assert_eq!(first.edges, second.edges);
        assert_eq!(first.factors.len(), second.factors.len());
    }

    #[test]
    fn test_structure_change_unbakes() {
        let mut net = monty_hall().unwrap();
        assert!(net.is_baked());

        let extra = Variable::new("coin", ["H", "T"]).unwrap();
        net.add_state(extra.clone(), DiscreteDistribution::uniform(&extra), "coin")
            .unwrap();
        assert!(matches!(net.factor_graph(), Err(BeliefError::UnbakedNetwork)));
    }

    #[test]
    fn test_topological_order() {
        let net = monty_hall().unwrap();
        let order = &net.factor_graph().unwrap().order;
        let pos = |i: usize| order.iter().position(|&s| s == i).unwrap();

        assert_eq!(order.len(), 3);
        assert!(pos(0) < pos(2));
        assert!(pos(1) < pos(2));
    }

    #[test]
    fn test_record_round_trip() {
        let mut net = monty_hall().unwrap();
        net.freeze("guest").unwrap();

        let json = net.to_json().unwrap();
        let mut rebuilt = Network::from_json(&json).unwrap();

        assert!(!rebuilt.is_baked());
        assert_eq!(rebuilt.to_record(), net.to_record());
        assert!(rebuilt.state("guest").unwrap().distribution.is_frozen());
        rebuilt.bake().unwrap();
    }
}
