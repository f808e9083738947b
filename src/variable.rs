use crate::error::{BeliefError, Result};

/// A named categorical variable. Domain order is fixed at creation and defines canonical indexing.
///
/// NB fields are private so every `Variable` has passed the domain checks in `new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    name: String,
    domain: Vec<String>,
}

impl Variable {
    pub fn new<S: AsRef<str>>(name: &str, domain: impl IntoIterator<Item = S>) -> Result<Self> {
        let domain: Vec<String> = domain.into_iter().map(|v| v.as_ref().to_string()).collect();

        if domain.is_empty() {
            return Err(BeliefError::structure(format!(
                "variable '{name}' has an empty domain"
            )));
        }

        for (i, value) in domain.iter().enumerate() {
            if domain[..i].contains(value) {
                return Err(BeliefError::structure(format!(
                    "variable '{name}' lists '{value}' twice in its domain"
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            domain,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &[String] {
        &self.domain
    }

    pub fn cardinality(&self) -> usize {
        self.domain.len()
    }

    /// Position of `value` in the domain.
    pub fn index_of(&self, value: &str) -> Result<usize> {
        self.domain
            .iter()
            .position(|v| v == value)
            .ok_or_else(|| BeliefError::invalid_value(&self.name, value))
    }

    pub fn value(&self, idx: usize) -> &str {
        &self.domain[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_of() {
        let door = Variable::new("door", ["A", "B", "C"]).unwrap();
        assert_eq!(door.cardinality(), 3);
        assert_eq!(door.index_of("B").unwrap(), 1);
        assert_eq!(door.value(2), "C");
        assert_eq!(
            door.index_of("D"),
            Err(BeliefError::InvalidValue {
                variable: "door".into(),
                value: "D".into()
            })
        );
    }

    #[test]
    fn test_rejects_bad_domains() {
        assert!(matches!(
            Variable::new::<&str>("empty", []),
            Err(BeliefError::Structure(_))
        ));
        assert!(matches!(
            Variable::new("dup", ["x", "y", "x"]),
            Err(BeliefError::Structure(_))
        ));
    }

    #[test]
    fn test_record_with_empty_domain_is_rejected() {
        use crate::distribution::{Distribution, DistributionKind, DistributionRecord};

        // NB domains only come back through `Variable::new`, so an empty table is rejected.
        let record = DistributionRecord {
            kind: DistributionKind::Discrete,
            name: "x".into(),
            parents: Vec::new(),
            table: Vec::new(),
            frozen: false,
        };
        assert!(matches!(
            Distribution::from_record(&record),
            Err(BeliefError::Structure(_))
        ));
    }
}
