//! Maximum-likelihood parameter learning from complete rows.
//!
//! Learning is split in two: `summarize` reduces rows to weighted count tables, and
//! `from_summaries` turns counts into normalized tables. Summaries merge by addition, so rows may
//! be partitioned, summarized separately and merged before the final normalization.

use log::info;

use crate::error::{BeliefError, Result};
use crate::network::Network;

/// Smoothing added to every count cell before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Pseudocount {
    Uniform(f64),
    PerState(Vec<f64>),
}

impl Default for Pseudocount {
    fn default() -> Self {
        Pseudocount::Uniform(0.0)
    }
}

impl Pseudocount {
    fn for_state(&self, state: usize) -> f64 {
        match self {
            Pseudocount::Uniform(p) => *p,
            Pseudocount::PerState(ps) => ps[state],
        }
    }

    fn validate(&self, n_states: usize) -> Result<()> {
        let values: &[f64] = match self {
            Pseudocount::Uniform(p) => std::slice::from_ref(p),
            Pseudocount::PerState(ps) => {
                if ps.len() != n_states {
                    return Err(BeliefError::InvalidParameter(format!(
                        "{} per-state pseudocounts given for {} states",
                        ps.len(),
                        n_states
                    )));
                }
                ps
            }
        };

        if let Some(p) = values.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(BeliefError::InvalidParameter(format!(
                "pseudocount must be finite and >= 0, got {p}"
            )));
        }
        Ok(())
    }
}

/// Weighted count tables, one per state, laid out like the state's distribution table.
#[derive(Debug, Clone, PartialEq)]
pub struct SufficientStatistics {
    counts: Vec<Vec<f64>>,
}

impl SufficientStatistics {
    pub fn counts(&self, state: usize) -> &[f64] {
        &self.counts[state]
    }

    pub fn total_weight(&self) -> f64 {
        // NB every row adds its weight once to every state's table.
        self.counts.first().map_or(0.0, |c| c.iter().sum())
    }

    /// Adds another summary of the same network into this one.
    pub fn merge(&mut self, other: &SufficientStatistics) -> Result<()> {
        let same_shape = self.counts.len() == other.counts.len()
            && self
                .counts
                .iter()
                .zip(other.counts.iter())
                .all(|(a, b)| a.len() == b.len());

        if !same_shape {
            return Err(BeliefError::structure(
                "cannot merge summaries of differently shaped networks",
            ));
        }

        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            for (a, b) in mine.iter_mut().zip(theirs.iter()) {
                *a += b;
            }
        }
        Ok(())
    }
}

impl Network {
    /// Accumulates weighted `(parent values, value)` counts for every state.
    pub fn summarize<S: AsRef<str>>(
        &self,
        rows: &[Vec<S>],
        weights: Option<&[f64]>,
    ) -> Result<SufficientStatistics> {
        if let Some(w) = weights {
            if w.len() != rows.len() {
                return Err(BeliefError::InvalidParameter(format!(
                    "{} weights given for {} rows",
                    w.len(),
                    rows.len()
                )));
            }
            if let Some(bad) = w.iter().find(|w| !w.is_finite() || **w < 0.0) {
                return Err(BeliefError::InvalidParameter(format!(
                    "row weights must be finite and >= 0, got {bad}"
                )));
            }
        }

        let parents = self.parent_indices()?;
        let mut counts: Vec<Vec<f64>> = self
            .states
            .iter()
            .map(|s| vec![0.0; s.distribution.table().len()])
            .collect();

        for (r, row) in rows.iter().enumerate() {
            let values = self.encode_row(row)?;
            let weight = weights.map_or(1.0, |w| w[r]);

            for (i, state) in self.states.iter().enumerate() {
                let row_idx = parents[i]
                    .iter()
                    .fold(0, |idx, &p| idx * self.states[p].variable.cardinality() + values[p]);
                counts[i][row_idx * state.variable.cardinality() + values[i]] += weight;
            }
        }

        Ok(SufficientStatistics { counts })
    }

    /// Replaces every unfrozen distribution with its normalized, smoothed counts.
    pub fn from_summaries(
        &mut self,
        stats: &SufficientStatistics,
        pseudocount: &Pseudocount,
    ) -> Result<()> {
        pseudocount.validate(self.states.len())?;

        let same_shape = stats.counts.len() == self.states.len()
            && self
                .states
                .iter()
                .zip(stats.counts.iter())
                .all(|(s, c)| s.distribution.table().len() == c.len());
        if !same_shape {
            return Err(BeliefError::structure(
                "summary does not match the shape of this network",
            ));
        }

        for (i, state) in self.states.iter_mut().enumerate() {
            state
                .distribution
                .update_from_counts(&stats.counts[i], pseudocount.for_state(i))?;
        }

        info!(
            "Updated network '{}' from {:.1} weighted observations",
            self.name,
            stats.total_weight()
        );
        Ok(())
    }

    /// Maximum-likelihood fit from complete rows aligned to state order.
    pub fn fit<S: AsRef<str>>(&mut self, rows: &[Vec<S>], pseudocount: f64) -> Result<()> {
        self.fit_weighted(rows, None, &Pseudocount::Uniform(pseudocount))
    }

    pub fn fit_weighted<S: AsRef<str>>(
        &mut self,
        rows: &[Vec<S>],
        weights: Option<&[f64]>,
        pseudocount: &Pseudocount,
    ) -> Result<()> {
        let stats = self.summarize(rows, weights)?;
        self.from_summaries(&stats, pseudocount)
    }
}
