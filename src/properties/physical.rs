//! Physical properties. See [RequiredProperties] and [PropertySet].

use std::fmt::{Display, Formatter};

use crate::properties::distribution::Distribution;
use crate::properties::OrderingChoice;

/// Physical properties required by an operator from its input.
/// `None` means that the operator accepts any value of the property.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct RequiredProperties {
    ordering: Option<OrderingChoice>,
    distribution: Option<Distribution>,
}

impl RequiredProperties {
    /// Creates properties that require nothing.
    pub fn none() -> Self {
        RequiredProperties::default()
    }

    /// Creates properties that require the given ordering and distribution.
    pub fn new(ordering: Option<OrderingChoice>, distribution: Option<Distribution>) -> Self {
        let distribution = distribution.filter(|d| *d != Distribution::Any);
        RequiredProperties { ordering, distribution }
    }

    /// Creates properties that require the given ordering.
    pub fn new_with_ordering(ordering: OrderingChoice) -> Self {
        RequiredProperties::new(Some(ordering), None)
    }

    /// Creates properties that require the given distribution.
    pub fn new_with_distribution(distribution: Distribution) -> Self {
        RequiredProperties::new(None, Some(distribution))
    }

    /// Returns `true` if there are any required properties.
    pub fn has_any(&self) -> bool {
        self.ordering.is_some() || self.distribution.is_some()
    }

    /// The required ordering.
    pub fn ordering(&self) -> Option<&OrderingChoice> {
        self.ordering.as_ref()
    }

    /// The required distribution.
    pub fn distribution(&self) -> Option<&Distribution> {
        self.distribution.as_ref()
    }

    /// Returns a copy of these properties with the given ordering requirement.
    pub fn with_ordering(&self, ordering: Option<OrderingChoice>) -> Self {
        RequiredProperties::new(ordering, self.distribution.clone())
    }

    /// Returns a copy of these properties with the given distribution requirement.
    pub fn with_distribution(&self, distribution: Option<Distribution>) -> Self {
        RequiredProperties::new(self.ordering.clone(), distribution)
    }
}

impl Display for RequiredProperties {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        if let Some(ordering) = self.ordering.as_ref() {
            write!(f, " ordering: {}", ordering)?;
        }
        if let Some(distribution) = self.distribution.as_ref() {
            write!(f, " distribution: {}", distribution)?;
        }
        write!(f, " }}")
    }
}

/// Physical properties delivered by an operator.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct PropertySet {
    ordering: Option<OrderingChoice>,
    distribution: Distribution,
}

impl PropertySet {
    /// Creates a new property set.
    pub fn new(ordering: Option<OrderingChoice>, distribution: Distribution) -> Self {
        PropertySet { ordering, distribution }
    }

    /// Properties of unordered rows located at a single node.
    pub fn singleton() -> Self {
        PropertySet::new(None, Distribution::Singleton)
    }

    /// The ordering of rows. `None` if rows are not sorted.
    pub fn ordering(&self) -> Option<&OrderingChoice> {
        self.ordering.as_ref()
    }

    /// The distribution of rows.
    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Returns a copy of this property set with the given ordering.
    pub fn with_ordering(&self, ordering: Option<OrderingChoice>) -> Self {
        PropertySet::new(ordering, self.distribution.clone())
    }

    /// Returns a copy of this property set with the given distribution.
    pub fn with_distribution(&self, distribution: Distribution) -> Self {
        PropertySet::new(self.ordering.clone(), distribution)
    }

    /// Checks whether these properties satisfy the given requirements.
    pub fn satisfies(&self, required: &RequiredProperties) -> bool {
        self.ordering_satisfies(required) && self.distribution_satisfies(required)
    }

    /// Checks whether the ordering of these properties satisfies the required ordering.
    pub fn ordering_satisfies(&self, required: &RequiredProperties) -> bool {
        match (required.ordering(), self.ordering.as_ref()) {
            (None, _) => true,
            (Some(required), Some(provided)) => required.prefix_of(provided),
            (Some(_), None) => false,
        }
    }

    /// Checks whether the distribution of these properties satisfies the required distribution.
    pub fn distribution_satisfies(&self, required: &RequiredProperties) -> bool {
        match required.distribution() {
            None => true,
            Some(required) => self.distribution.satisfies(required),
        }
    }
}

impl Display for PropertySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        if let Some(ordering) = self.ordering.as_ref() {
            write!(f, " ordering: {}", ordering)?;
        }
        write!(f, " distribution: {} }}", self.distribution)
    }
}
