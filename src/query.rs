//! Posterior queries on a baked network: marginals, imputation and joint probabilities.

use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;

use crate::belief::{BeliefPropagation, BeliefPropagationDiagnostics, Beliefs};
use crate::distribution::DiscreteDistribution;
use crate::error::{BeliefError, Result};
use crate::network::Network;
use crate::utils::argmax_first;

/// Observed values keyed by state name.
pub type Evidence<'a> = HashMap<&'a str, &'a str>;

impl Network {
    /// Clamp index per state, validated against names and domains.
    pub(crate) fn resolve_evidence(&self, evidence: &Evidence) -> Result<Vec<Option<usize>>> {
        let mut clamped = vec![None; self.states.len()];

        for (&name, &value) in evidence {
            let i = self.state_index(name)?;
            clamped[i] = Some(self.states[i].variable.index_of(value)?);
        }
        Ok(clamped)
    }

    fn infer(&self, clamped: Vec<Option<usize>>) -> Result<Beliefs> {
        let graph = self.factor_graph()?;
        let tables = self.states.iter().map(|s| s.distribution.table()).collect();

        Ok(BeliefPropagation::new(graph, tables, clamped, self.config)?.run())
    }

    fn to_distributions(&self, marginals: Vec<Vec<f64>>) -> Vec<DiscreteDistribution> {
        self.states
            .iter()
            .zip(marginals)
            .map(|(s, m)| DiscreteDistribution::from_marginal(&s.variable, m))
            .collect()
    }

    /// Posterior marginal of every state given `evidence`, in state order.
    pub fn predict_proba(&self, evidence: &Evidence) -> Result<Vec<DiscreteDistribution>> {
        self.predict_proba_with_diagnostics(evidence).map(|(marginals, _)| marginals)
    }

    /// As `predict_proba`, also reporting whether belief propagation converged.
    pub fn predict_proba_with_diagnostics(
        &self,
        evidence: &Evidence,
    ) -> Result<(Vec<DiscreteDistribution>, BeliefPropagationDiagnostics)> {
        self.factor_graph()?;
        let clamped = self.resolve_evidence(evidence)?;
        let beliefs = self.infer(clamped)?;

        Ok((self.to_distributions(beliefs.marginals), beliefs.diagnostics))
    }

    /// Fills `None` entries with their most probable value given the observed entries of the
    /// same row. Ties resolve to the first value in domain order. Rows run in parallel.
    pub fn impute<S: AsRef<str> + Sync>(&self, rows: &[Vec<Option<S>>]) -> Result<Vec<Vec<String>>> {
        self.factor_graph()?;

        rows.par_iter()
            .map(|row| self.impute_row(row))
            .collect()
    }

    fn impute_row<S: AsRef<str>>(&self, row: &[Option<S>]) -> Result<Vec<String>> {
        self.check_row_len(row.len())?;

        let mut clamped = vec![None; self.states.len()];
        for (i, value) in row.iter().enumerate() {
            if let Some(v) = value {
                clamped[i] = Some(self.states[i].variable.index_of(v.as_ref())?);
            }
        }

        let filled: Vec<usize> = if clamped.iter().all(Option::is_some) {
            clamped.into_iter().flatten().collect()
        } else {
            let beliefs = self.infer(clamped.clone())?;
            debug!(
                "Imputed row after {} iterations ({:?})",
                beliefs.diagnostics.iterations, beliefs.diagnostics.state
            );
            clamped
                .iter()
                .zip(beliefs.marginals.iter())
                .map(|(c, m)| c.unwrap_or_else(|| argmax_first(m)))
                .collect()
        };

        Ok(filled
            .iter()
            .zip(self.states.iter())
            .map(|(&i, s)| s.variable.value(i).to_string())
            .collect())
    }

    pub(crate) fn check_row_len(&self, len: usize) -> Result<()> {
        if len != self.states.len() {
            return Err(BeliefError::structure(format!(
                "row has {} entries but the network has {} states",
                len,
                self.states.len()
            )));
        }
        Ok(())
    }

    /// Value indices of a complete row.
    pub(crate) fn encode_row<S: AsRef<str>>(&self, row: &[S]) -> Result<Vec<usize>> {
        self.check_row_len(row.len())?;
        row.iter()
            .zip(self.states.iter())
            .map(|(v, s)| s.variable.index_of(v.as_ref()))
            .collect()
    }

    /// Joint probability of a complete row by the chain rule.
    pub fn probability<S: AsRef<str>>(&self, row: &[S]) -> Result<f64> {
        Ok(self.log_probability_row(row)?.exp())
    }

    /// Log joint probability of each complete row.
    pub fn log_probability<S: AsRef<str>>(&self, rows: &[Vec<S>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.log_probability_row(row)).collect()
    }

    fn log_probability_row<S: AsRef<str>>(&self, row: &[S]) -> Result<f64> {
        let graph = self.factor_graph()?;
        let values = self.encode_row(row)?;

        let mut logp = 0.0;
        for factor in &graph.factors {
            let table = self.states[factor.state].distribution.table();
            let idx = factor
                .variables
                .iter()
                .fold(0, |idx, &v| idx * graph.variables[v].cardinality + values[v]);
            logp += table[idx].ln();
        }
        Ok(logp)
    }
}
