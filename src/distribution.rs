//! Categorical distributions and conditional probability tables.
//!
//! Both kinds store a flattened, row-major table: for a CPT the parents vary slowest (in parent
//! order) and the child value fastest, which is exactly the layout the factor graph reads during
//! message passing. A prior is the degenerate case with no parents and a single row.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{BeliefError, Result};
use crate::utils::next_assignment;
use crate::variable::Variable;

/// Tolerance for the sum-to-one check on constructed tables.
pub const PROB_TOLERANCE: f64 = 1e-6;

/// One weighted observation for `update`: parent values (empty for a prior), own value and weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedObservation {
    pub parents: Vec<String>,
    pub value: String,
    pub weight: f64,
}

impl WeightedObservation {
    pub fn new<S: AsRef<str>>(parents: &[S], value: &str, weight: f64) -> Self {
        Self {
            parents: parents.iter().map(|p| p.as_ref().to_string()).collect(),
            value: value.to_string(),
            weight,
        }
    }
}

fn check_row(context: &str, row: &[f64]) -> Result<()> {
    let sum: f64 = row.iter().sum();

    if row.iter().any(|p| !p.is_finite() || *p < 0.0) || (sum - 1.0).abs() > PROB_TOLERANCE {
        return Err(BeliefError::DistributionMismatch {
            context: context.to_string(),
            sum,
        });
    }
    Ok(())
}

/// NB normalizes `counts + pseudocount` row by row; rows with no mass fall back to uniform.
fn normalize_counts(table: &mut [f64], counts: &[f64], pseudocount: f64, row_len: usize) {
    for (row, counts) in table.chunks_mut(row_len).zip(counts.chunks(row_len)) {
        let total: f64 = counts.iter().map(|c| c + pseudocount).sum();

        for (p, c) in row.iter_mut().zip(counts.iter()) {
            *p = if total > 0.0 {
                (c + pseudocount) / total
            } else {
                1.0 / row_len as f64
            };
        }
    }
}

fn check_pseudocount(pseudocount: f64) -> Result<()> {
    if !pseudocount.is_finite() || pseudocount < 0.0 {
        return Err(BeliefError::InvalidParameter(format!(
            "pseudocount must be finite and >= 0, got {pseudocount}"
        )));
    }
    Ok(())
}

fn sample_row<R: Rng + ?Sized>(row: &[f64], rng: &mut R) -> usize {
    let mut r = rng.random::<f64>();

    for (i, &p) in row.iter().enumerate() {
        if r < p {
            return i;
        }
        r -= p;
    }

    // NB rounding can leave a sliver of mass; fall back to the last supported value.
    row.iter().rposition(|&p| p > 0.0).unwrap_or(row.len() - 1)
}

/// Unconditional categorical distribution (a prior).
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteDistribution {
    variable: Variable,
    probs: Vec<f64>,
    frozen: bool,
}

impl DiscreteDistribution {
    /// Builds from a value -> probability mapping covering the whole domain, in any order.
    pub fn new<S: AsRef<str>>(
        variable: &Variable,
        probabilities: impl IntoIterator<Item = (S, f64)>,
    ) -> Result<Self> {
        let mut probs = vec![None; variable.cardinality()];

        for (value, p) in probabilities {
            let idx = variable.index_of(value.as_ref())?;
            if probs[idx].replace(p).is_some() {
                return Err(BeliefError::structure(format!(
                    "value '{}' of '{}' given twice",
                    value.as_ref(),
                    variable.name()
                )));
            }
        }

        let probs = probs
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                p.ok_or_else(|| {
                    BeliefError::structure(format!(
                        "no probability given for '{}' = '{}'",
                        variable.name(),
                        variable.value(i)
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        Self::from_probabilities(variable, probs)
    }

    /// Builds from probabilities listed in domain order.
    pub fn from_probabilities(variable: &Variable, probs: Vec<f64>) -> Result<Self> {
        if probs.len() != variable.cardinality() {
            return Err(BeliefError::structure(format!(
                "'{}' has {} values but {} probabilities were given",
                variable.name(),
                variable.cardinality(),
                probs.len()
            )));
        }
        check_row(variable.name(), &probs)?;

        Ok(Self {
            variable: variable.clone(),
            probs,
            frozen: false,
        })
    }

    pub fn uniform(variable: &Variable) -> Self {
        Self {
            variable: variable.clone(),
            probs: vec![1.0 / variable.cardinality() as f64; variable.cardinality()],
            frozen: false,
        }
    }

    /// Wraps an already-normalized marginal produced by inference.
    pub(crate) fn from_marginal(variable: &Variable, probs: Vec<f64>) -> Self {
        Self {
            variable: variable.clone(),
            probs,
            frozen: false,
        }
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probs
    }

    pub fn probability(&self, value: &str) -> Result<f64> {
        Ok(self.probs[self.variable.index_of(value)?])
    }

    /// Most probable value; ties go to the first value in domain order.
    pub fn mode(&self) -> &str {
        self.variable.value(crate::utils::argmax_first(&self.probs))
    }

    /// Iterates `(value, probability)` in domain order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.variable
            .domain()
            .iter()
            .map(String::as_str)
            .zip(self.probs.iter().copied())
    }

    pub fn update(&mut self, observations: &[WeightedObservation], pseudocount: f64) -> Result<()> {
        let mut counts = vec![0.0; self.probs.len()];

        for obs in observations {
            if !obs.parents.is_empty() {
                return Err(BeliefError::structure(format!(
                    "'{}' has no parents but an observation carries {}",
                    self.variable.name(),
                    obs.parents.len()
                )));
            }
            counts[self.variable.index_of(&obs.value)?] += checked_weight(obs.weight)?;
        }

        self.update_from_counts(&counts, pseudocount)
    }

    pub(crate) fn update_from_counts(&mut self, counts: &[f64], pseudocount: f64) -> Result<()> {
        check_pseudocount(pseudocount)?;
        if self.frozen {
            return Ok(());
        }
        let n = self.probs.len();
        normalize_counts(&mut self.probs, counts, pseudocount, n);
        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.variable.value(sample_row(&self.probs, rng))
    }
}

fn checked_weight(weight: f64) -> Result<f64> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(BeliefError::InvalidParameter(format!(
            "observation weight must be finite and >= 0, got {weight}"
        )));
    }
    Ok(weight)
}

/// Conditional probability table P(variable | parents).
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalProbabilityTable {
    variable: Variable,
    parents: Vec<Variable>,
    table: Vec<f64>, // flattened, row-major over [parents..., variable].
    frozen: bool,
}

impl ConditionalProbabilityTable {
    /// Builds from rows of `([parent values..., value], probability)` covering the full
    /// Cartesian product of parent domains and the child domain exactly once.
    pub fn new<S: AsRef<str>>(
        variable: &Variable,
        parents: Vec<Variable>,
        rows: impl IntoIterator<Item = (Vec<S>, f64)>,
    ) -> Result<Self> {
        let mut domains: Vec<&Variable> = parents.iter().collect();
        domains.push(variable);

        let size: usize = domains.iter().map(|v| v.cardinality()).product();
        let mut table = vec![None; size];
        let mut n_rows = 0;

        for (values, p) in rows {
            if values.len() != domains.len() {
                return Err(BeliefError::structure(format!(
                    "row for '{}' has {} values, expected {}",
                    variable.name(),
                    values.len(),
                    domains.len()
                )));
            }

            let mut idx = 0;
            for (var, value) in domains.iter().zip(values.iter()) {
                idx = idx * var.cardinality() + var.index_of(value.as_ref())?;
            }

            if table[idx].replace(p).is_some() {
                let combo: Vec<&str> = values.iter().map(|v| v.as_ref()).collect();
                return Err(BeliefError::structure(format!(
                    "row {:?} of '{}' appears more than once",
                    combo, variable.name()
                )));
            }
            n_rows += 1;
        }

        if n_rows != size {
            return Err(BeliefError::structure(format!(
                "table for '{}' has {} rows, expected {} (full parent cross-product)",
                variable.name(), n_rows, size
            )));
        }

        let table = table.into_iter().map(|p| p.unwrap_or(0.0)).collect();
        Self::from_table(variable, parents, table)
    }

    /// Builds from a flattened table in canonical row-major order.
    pub fn from_table(variable: &Variable, parents: Vec<Variable>, table: Vec<f64>) -> Result<Self> {
        let expected: usize = parents.iter().map(|v| v.cardinality()).product::<usize>()
            * variable.cardinality();

        if table.len() != expected {
            return Err(BeliefError::structure(format!(
                "table for '{}' has {} cells, expected {}",
                variable.name(),
                table.len(),
                expected
            )));
        }

        let cpt = Self {
            variable: variable.clone(),
            parents,
            table,
            frozen: false,
        };

        for (row_idx, row) in cpt.table.chunks(cpt.variable.cardinality()).enumerate() {
            check_row(&cpt.describe_row(row_idx), row)?;
        }

        Ok(cpt)
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    pub fn parents(&self) -> &[Variable] {
        &self.parents
    }

    pub fn table(&self) -> &[f64] {
        &self.table
    }

    pub fn n_parent_configs(&self) -> usize {
        self.table.len() / self.variable.cardinality()
    }

    /// Encode parent value indices into a row index (row-major, first parent slowest).
    pub fn encode_parents(&self, parent_indices: &[usize]) -> usize {
        parent_indices
            .iter()
            .zip(self.parents.iter())
            .fold(0, |idx, (&val, var)| idx * var.cardinality() + val)
    }

    /// Decode a row index into parent value indices.
    pub fn decode_parents(&self, mut row: usize) -> Vec<usize> {
        let mut values = vec![0; self.parents.len()];
        for i in (0..self.parents.len()).rev() {
            let card = self.parents[i].cardinality();
            values[i] = row % card;
            row /= card;
        }
        values
    }

    fn describe_row(&self, row: usize) -> String {
        let given: Vec<String> = self
            .decode_parents(row)
            .iter()
            .zip(self.parents.iter())
            .map(|(&i, var)| format!("{}={}", var.name(), var.value(i)))
            .collect();
        format!("{} | {}", self.variable.name(), given.join(", "))
    }

    pub fn row(&self, parent_row: usize) -> &[f64] {
        let k = self.variable.cardinality();
        &self.table[parent_row * k..(parent_row + 1) * k]
    }

    /// P(variable = value | parents = parent_values).
    pub fn probability<S: AsRef<str>>(&self, parent_values: &[S], value: &str) -> Result<f64> {
        if parent_values.len() != self.parents.len() {
            return Err(BeliefError::structure(format!(
                "'{}' has {} parents but {} parent values were given",
                self.variable.name(),
                self.parents.len(),
                parent_values.len()
            )));
        }

        let parent_indices = self
            .parents
            .iter()
            .zip(parent_values.iter())
            .map(|(var, v)| var.index_of(v.as_ref()))
            .collect::<Result<Vec<usize>>>()?;
        let child = self.variable.index_of(value)?;

        Ok(self.row(self.encode_parents(&parent_indices))[child])
    }

    pub fn update(&mut self, observations: &[WeightedObservation], pseudocount: f64) -> Result<()> {
        let mut counts = vec![0.0; self.table.len()];
        let k = self.variable.cardinality();

        for obs in observations {
            if obs.parents.len() != self.parents.len() {
                return Err(BeliefError::structure(format!(
                    "'{}' has {} parents but an observation carries {}",
                    self.variable.name(),
                    self.parents.len(),
                    obs.parents.len()
                )));
            }
            let parent_indices = self
                .parents
                .iter()
                .zip(obs.parents.iter())
                .map(|(var, v)| var.index_of(v))
                .collect::<Result<Vec<usize>>>()?;
            let idx = self.encode_parents(&parent_indices) * k + self.variable.index_of(&obs.value)?;
            counts[idx] += checked_weight(obs.weight)?;
        }

        self.update_from_counts(&counts, pseudocount)
    }

    pub(crate) fn update_from_counts(&mut self, counts: &[f64], pseudocount: f64) -> Result<()> {
        check_pseudocount(pseudocount)?;
        if self.frozen {
            return Ok(());
        }
        let k = self.variable.cardinality();
        normalize_counts(&mut self.table, counts, pseudocount, k);
        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(&self, parent_indices: &[usize], rng: &mut R) -> &str {
        let row = self.row(self.encode_parents(parent_indices));
        self.variable.value(sample_row(row, rng))
    }
}

/// A state's distribution: a prior or a conditional table.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Discrete(DiscreteDistribution),
    Conditional(ConditionalProbabilityTable),
}

impl From<DiscreteDistribution> for Distribution {
    fn from(d: DiscreteDistribution) -> Self {
        Distribution::Discrete(d)
    }
}

impl From<ConditionalProbabilityTable> for Distribution {
    fn from(cpt: ConditionalProbabilityTable) -> Self {
        Distribution::Conditional(cpt)
    }
}

impl Distribution {
    pub fn variable(&self) -> &Variable {
        match self {
            Distribution::Discrete(d) => &d.variable,
            Distribution::Conditional(c) => &c.variable,
        }
    }

    /// Parent variables; empty for a prior.
    pub fn parents(&self) -> &[Variable] {
        match self {
            Distribution::Discrete(_) => &[],
            Distribution::Conditional(c) => &c.parents,
        }
    }

    /// Flattened factor table over `[parents..., variable]`.
    pub fn table(&self) -> &[f64] {
        match self {
            Distribution::Discrete(d) => &d.probs,
            Distribution::Conditional(c) => &c.table,
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Distribution::Conditional(_))
    }

    pub fn is_frozen(&self) -> bool {
        match self {
            Distribution::Discrete(d) => d.frozen,
            Distribution::Conditional(c) => c.frozen,
        }
    }

    /// Excludes this distribution from `update` and `fit`.
    pub fn freeze(&mut self) {
        self.set_frozen(true);
    }

    pub fn thaw(&mut self) {
        self.set_frozen(false);
    }

    fn set_frozen(&mut self, frozen: bool) {
        match self {
            Distribution::Discrete(d) => d.frozen = frozen,
            Distribution::Conditional(c) => c.frozen = frozen,
        }
    }

    pub fn probability<S: AsRef<str>>(&self, parent_values: &[S], value: &str) -> Result<f64> {
        match self {
            Distribution::Discrete(d) if parent_values.is_empty() => d.probability(value),
            Distribution::Discrete(d) => Err(BeliefError::structure(format!(
                "'{}' has no parents but {} parent values were given",
                d.variable.name(),
                parent_values.len()
            ))),
            Distribution::Conditional(c) => c.probability(parent_values, value),
        }
    }

    pub fn update(&mut self, observations: &[WeightedObservation], pseudocount: f64) -> Result<()> {
        match self {
            Distribution::Discrete(d) => d.update(observations, pseudocount),
            Distribution::Conditional(c) => c.update(observations, pseudocount),
        }
    }

    pub(crate) fn update_from_counts(&mut self, counts: &[f64], pseudocount: f64) -> Result<()> {
        match self {
            Distribution::Discrete(d) => d.update_from_counts(counts, pseudocount),
            Distribution::Conditional(c) => c.update_from_counts(counts, pseudocount),
        }
    }

    pub fn to_record(&self) -> DistributionRecord {
        let variable = self.variable();
        let mut domains: Vec<&Variable> = self.parents().iter().collect();
        domains.push(variable);
        let cards: Vec<usize> = domains.iter().map(|v| v.cardinality()).collect();

        let mut assignment = vec![0; domains.len()];
        let mut table = Vec::with_capacity(self.table().len());

        for &probability in self.table() {
            let values = domains
                .iter()
                .zip(assignment.iter())
                .map(|(var, &i)| var.value(i).to_string())
                .collect();
            table.push(TableEntry {
                values,
                probability,
            });
            next_assignment(&mut assignment, &cards);
        }

        DistributionRecord {
            kind: match self {
                Distribution::Discrete(_) => DistributionKind::Discrete,
                Distribution::Conditional(_) => DistributionKind::Conditional,
            },
            name: variable.name().to_string(),
            parents: self.parents().iter().map(|p| p.name().to_string()).collect(),
            table,
            frozen: self.is_frozen(),
        }
    }

    /// Rebuilds a distribution; domains follow the first-appearance order of each table column.
    pub fn from_record(record: &DistributionRecord) -> Result<Self> {
        let n_cols = record.parents.len() + 1;

        if record.kind == DistributionKind::Discrete && !record.parents.is_empty() {
            return Err(BeliefError::structure(format!(
                "discrete record '{}' declares parents",
                record.name
            )));
        }

        let mut columns: Vec<Vec<&str>> = vec![Vec::new(); n_cols];
        for entry in &record.table {
            if entry.values.len() != n_cols {
                return Err(BeliefError::structure(format!(
                    "record '{}' has a row with {} values, expected {}",
                    record.name,
                    entry.values.len(),
                    n_cols
                )));
            }
            for (col, value) in columns.iter_mut().zip(entry.values.iter()) {
                if !col.contains(&value.as_str()) {
                    col.push(value);
                }
            }
        }

        let variable = Variable::new(&record.name, columns[n_cols - 1].iter())?;
        let rows = record
            .table
            .iter()
            .map(|e| (e.values.clone(), e.probability));

        let mut dist: Distribution = match record.kind {
            DistributionKind::Discrete => DiscreteDistribution::new(
                &variable,
                record.table.iter().map(|e| (e.values[0].as_str(), e.probability)),
            )?
            .into(),
            DistributionKind::Conditional => {
                let parents = record
                    .parents
                    .iter()
                    .zip(columns.iter())
                    .map(|(name, col)| Variable::new(name, col.iter()))
                    .collect::<Result<Vec<Variable>>>()?;
                ConditionalProbabilityTable::new(&variable, parents, rows)?.into()
            }
        };

        dist.set_frozen(record.frozen);
        Ok(dist)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    Discrete,
    Conditional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Parent values in parent order, then the variable's own value.
    pub values: Vec<String>,
    pub probability: f64,
}

/// Serialized form of a `Distribution`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionRecord {
    #[serde(rename = "type")]
    pub kind: DistributionKind,
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
    pub table: Vec<TableEntry>,
    #[serde(default)]
    pub frozen: bool,
}
