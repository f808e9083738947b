use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorType {
    Prior,
    Conditional,
}

#[derive(Debug, Clone)]
pub struct VariableNode {
    pub id: usize,
    pub cardinality: usize,
    pub edges: Vec<usize>, // incident edge ids, one per factor touching this variable.
}

/// NB a factor does not own its table; `state` indexes the network state whose distribution it wraps,
///    so fitted parameters are read live on every query.
#[derive(Debug, Clone)]
pub struct FactorNode {
    pub id: usize,
    pub state: usize,
    pub factor_type: FactorType,
    pub variables: Vec<usize>, // [parents..., own variable], the row-major order of the table.
    pub edges: Vec<usize>,     // edge id for each entry of `variables`.
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub factor: usize,
    pub variable: usize,
    pub slot: usize, // position of `variable` within the factor.
}

/// One directed message, named by the edge it travels along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    VariableToFactor(usize),
    FactorToVariable(usize),
}

#[derive(Debug, Clone, Copy)]
enum Node {
    Variable(usize),
    Factor(usize),
}

/// NB Forney factor graph is with variables and factors connected by edges.
#[derive(Debug, Clone)]
pub struct FactorGraph {
    pub(crate) variables: Vec<VariableNode>,
    pub(crate) factors: Vec<FactorNode>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) order: Vec<usize>, // topological order of the states.
    pub(crate) schedule: Option<Vec<Message>>, // two-pass order when the skeleton is a forest.
}

impl FactorGraph {
    /// One variable node and one factor node per state. `parents[i]` lists the parent states of
    /// state `i` in the order its table declares them.
    pub(crate) fn build(cardinalities: &[usize], parents: &[Vec<usize>], order: Vec<usize>) -> Self {
        let mut variables: Vec<VariableNode> = cardinalities
            .iter()
            .enumerate()
            .map(|(id, &cardinality)| VariableNode {
                id,
                cardinality,
                edges: Vec::new(),
            })
            .collect();

        let mut factors = Vec::with_capacity(cardinalities.len());
        let mut edges = Vec::new();

        for (state, parent_ids) in parents.iter().enumerate() {
            let mut vars = parent_ids.clone();
            vars.push(state);

            let mut factor_edges = Vec::with_capacity(vars.len());
            for (slot, &vid) in vars.iter().enumerate() {
                let eid = edges.len();
                edges.push(Edge {
                    factor: state,
                    variable: vid,
                    slot,
                });
                variables[vid].edges.push(eid);
                factor_edges.push(eid);
            }

            factors.push(FactorNode {
                id: state,
                state,
                factor_type: if parent_ids.is_empty() {
                    FactorType::Prior
                } else {
                    FactorType::Conditional
                },
                variables: vars,
                edges: factor_edges,
            });
        }

        let schedule = tree_schedule(&variables, &factors, &edges, &order);

        debug!(
            "Built factor graph with {} variables, {} factors and {} edges ({})",
            variables.len(),
            factors.len(),
            edges.len(),
            if schedule.is_some() { "tree" } else { "loopy" }
        );

        Self {
            variables,
            factors,
            edges,
            order,
            schedule,
        }
    }

    pub fn variables(&self) -> &[VariableNode] {
        &self.variables
    }

    pub fn factors(&self) -> &[FactorNode] {
        &self.factors
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Topological order of the states.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// True when the undirected skeleton has no cycle, so two passes give exact marginals.
    pub fn is_tree(&self) -> bool {
        self.schedule.is_some()
    }

    /// Leaves-to-root then root-to-leaves message order; `None` on a loopy graph.
    pub fn schedule(&self) -> Option<&[Message]> {
        self.schedule.as_deref()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Cardinalities of the variables a factor touches, in table order.
    pub fn factor_domains(&self, factor: usize) -> Vec<usize> {
        self.factors[factor]
            .variables
            .iter()
            .map(|&v| self.variables[v].cardinality)
            .collect()
    }

    /// Parent states of `state`.
    pub fn parents(&self, state: usize) -> &[usize] {
        let vars = &self.factors[state].variables;
        &vars[..vars.len() - 1]
    }
}

fn incident<'g>(node: Node, variables: &'g [VariableNode], factors: &'g [FactorNode]) -> &'g [usize] {
    match node {
        Node::Variable(v) => &variables[v].edges,
        Node::Factor(f) => &factors[f].edges,
    }
}

fn send(node: Node, eid: usize) -> Message {
    match node {
        Node::Variable(_) => Message::VariableToFactor(eid),
        Node::Factor(_) => Message::FactorToVariable(eid),
    }
}

/// Breadth-first search over the bipartite graph from each root in `order`. Reaching a node twice
/// means the skeleton has a cycle and there is no exact schedule.
fn tree_schedule(
    variables: &[VariableNode],
    factors: &[FactorNode],
    edges: &[Edge],
    order: &[usize],
) -> Option<Vec<Message>> {
    let mut seen_variable = vec![false; variables.len()];
    let mut seen_factor = vec![false; factors.len()];
    let mut bfs: Vec<(Node, Option<usize>)> = Vec::with_capacity(variables.len() + factors.len());

    for &root in order {
        if seen_variable[root] {
            continue;
        }
        seen_variable[root] = true;

        let mut head = bfs.len();
        bfs.push((Node::Variable(root), None));

        while head < bfs.len() {
            let (node, up) = bfs[head];
            head += 1;

            for &eid in incident(node, variables, factors) {
                if Some(eid) == up {
                    continue;
                }
                let next = match node {
                    Node::Variable(_) => Node::Factor(edges[eid].factor),
                    Node::Factor(_) => Node::Variable(edges[eid].variable),
                };
                let seen = match next {
                    Node::Variable(v) => &mut seen_variable[v],
                    Node::Factor(f) => &mut seen_factor[f],
                };
                if *seen {
                    return None;
                }
                *seen = true;
                bfs.push((next, Some(eid)));
            }
        }
    }

    let mut schedule = Vec::with_capacity(2 * edges.len());

    // NB leaves to root: a node reports to its parent once every child has reported.
    for &(node, up) in bfs.iter().rev() {
        if let Some(eid) = up {
            schedule.push(send(node, eid));
        }
    }

    // NB root to leaves: a node answers its children once its parent has answered it.
    for &(node, up) in &bfs {
        for &eid in incident(node, variables, factors) {
            if Some(eid) != up {
                schedule.push(send(node, eid));
            }
        }
    }

    Some(schedule)
}
