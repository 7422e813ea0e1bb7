use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::meta::ColumnId;

/// Describes how rows produced by an operator are placed across workers.
#[derive(Debug, Eq, PartialEq, Hash, Clone)]
pub enum Distribution {
    /// Rows are placed in some unknown way.
    /// As a requirement it means that any placement is acceptable.
    Any,
    /// All rows are located at a single node.
    Singleton,
    /// Every worker has a full copy of the rows.
    Replicated,
    /// Rows are partitioned by the hash of the given columns.
    Hash(Vec<ColumnId>),
    /// Rows are spread evenly across workers.
    RoundRobin,
}

impl Distribution {
    /// Checks whether rows placed according to this distribution can be consumed by an operator
    /// that requires the `required` distribution.
    ///
    /// * Replicated rows satisfy every requirement: each worker already has all the rows.
    /// * Hash distribution on `X` satisfies only hash distribution on `X`.
    /// * A singleton distribution satisfies only a singleton requirement.
    pub fn satisfies(&self, required: &Distribution) -> bool {
        use Distribution::*;
        match (self, required) {
            (_, Any) => true,
            (Replicated, _) => true,
            (Singleton, Singleton) => true,
            (Hash(this), Hash(other)) => this == other,
            (RoundRobin, RoundRobin) => true,
            _ => false,
        }
    }

    /// Creates a new distribution in which columns from the `source_columns` are replaced with
    /// the corresponding columns from `output_columns`.
    /// When one of the hash columns has no mapping the resulting distribution is [Distribution::Any].
    pub fn with_mapping(&self, source_columns: &[ColumnId], output_columns: &[ColumnId]) -> Distribution {
        match self {
            Distribution::Hash(cols) => {
                let columns: Option<Vec<_>> = cols
                    .iter()
                    .map(|col| source_columns.iter().position(|s| s == col).and_then(|p| output_columns.get(p).copied()))
                    .collect();
                columns.map(Distribution::Hash).unwrap_or(Distribution::Any)
            }
            _ => self.clone(),
        }
    }
}

impl Display for Distribution {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Distribution::Any => write!(f, "any"),
            Distribution::Singleton => write!(f, "singleton"),
            Distribution::Replicated => write!(f, "replicated"),
            Distribution::Hash(columns) => write!(f, "hash[{}]", columns.iter().join(", ")),
            Distribution::RoundRobin => write!(f, "round-robin"),
        }
    }
}
