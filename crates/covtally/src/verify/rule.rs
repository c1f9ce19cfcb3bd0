//! Rule vocabulary: targets, counters, value types and bounds.

use super::decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Granularity at which a rule is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Target {
    /// One scope named `all`
    All,
    /// One scope per package (dotted prefix before the last `.`)
    Package,
    /// One scope per class
    Class,
}

impl Target {
    /// Scope name of `class` under this target
    #[must_use]
    pub fn scope_of<'a>(&self, class: &'a str) -> &'a str {
        match self {
            Self::All => ALL_SCOPE,
            Self::Package => package_of(class),
            Self::Class => class,
        }
    }
}

/// Scope name used by [`Target::All`]
pub const ALL_SCOPE: &str = "all";

/// Package of a fully-qualified class name, empty for the default package
#[must_use]
pub fn package_of(class: &str) -> &str {
    class.rfind('.').map_or("", |idx| &class[..idx])
}

/// What is counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Counter {
    /// Source lines
    Line,
    /// Branch and switch arms
    Branch,
    /// Instructions, weighted by instruction counts
    Instruction,
    /// Methods
    Method,
}

/// Which quantity of a counter a bound constrains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    /// Covered items
    Covered,
    /// Missed items
    Missed,
    /// Covered / total, six decimals
    CoveredRate,
    /// 1 - covered rate, six decimals
    MissedRate,
}

/// Threshold on one counter value; an absent side is unconstrained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bound {
    /// Counter kind
    pub counter: Counter,
    /// Quantity
    pub value_type: ValueType,
    /// Smallest allowed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    /// Largest allowed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
}

impl Bound {
    /// Unconstrained bound
    #[must_use]
    pub const fn new(counter: Counter, value_type: ValueType) -> Self {
        Self {
            counter,
            value_type,
            min: None,
            max: None,
        }
    }

    /// Set the minimum
    #[must_use]
    pub fn with_min(mut self, min: impl Into<Decimal>) -> Self {
        self.min = Some(min.into());
        self
    }

    /// Set the maximum
    #[must_use]
    pub fn with_max(mut self, max: impl Into<Decimal>) -> Self {
        self.max = Some(max.into());
        self
    }

    /// True if `value` is below the minimum
    #[must_use]
    pub fn below_min(&self, value: Decimal) -> bool {
        self.min.is_some_and(|min| value < min)
    }

    /// True if `value` is above the maximum
    #[must_use]
    pub fn above_max(&self, value: Decimal) -> bool {
        self.max.is_some_and(|max| value > max)
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?}", self.counter, self.value_type)?;
        if let Some(min) = self.min {
            write!(f, " min={min}")?;
        }
        if let Some(max) = self.max {
            write!(f, " max={max}")?;
        }
        Ok(())
    }
}

/// Ordered bounds evaluated at one target granularity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Scope granularity
    pub target: Target,
    /// Bounds in evaluation order
    #[serde(default)]
    pub bounds: Vec<Bound>,
}

impl Rule {
    /// Rule without bounds
    #[must_use]
    pub const fn new(target: Target) -> Self {
        Self {
            target,
            bounds: Vec::new(),
        }
    }

    /// Append a bound
    #[must_use]
    pub fn with_bound(mut self, bound: Bound) -> Self {
        self.bounds.push(bound);
        self
    }
}
