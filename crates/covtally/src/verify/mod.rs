//! Verifier: checks coverage rules against a merged snapshot.
//!
//! Each rule groups classes into scopes (everything, per package or per
//! class), sums the bound's counter per scope and compares the requested
//! value against `min`/`max`. Violations keep the order in which their scope
//! was first reached while walking classes in name order, so reports are
//! stable across runs.

mod counters;
mod decimal;
mod rule;

pub use counters::{totals, value};
pub use decimal::{Decimal, MAX_SCALE};
pub use rule::{package_of, Bound, Counter, Rule, Target, ValueType, ALL_SCOPE};

use crate::config::VerifierConfig;
use crate::model::{CoverageSummary, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A scope whose value breached a bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Scope name (`all`, a package or a class)
    pub scope: String,
    /// Computed value
    pub value: Decimal,
}

/// Violations of one bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundResult {
    /// The bound checked
    pub bound: Bound,
    /// Scopes whose value is below `min`, in discovery order
    pub min_violations: Vec<Violation>,
    /// Scopes whose value is above `max`, in discovery order
    pub max_violations: Vec<Violation>,
}

impl BoundResult {
    /// True if no scope breached the bound
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.min_violations.is_empty() && self.max_violations.is_empty()
    }

    /// Human-readable lines, one per violation
    #[must_use]
    pub fn describe(&self) -> Vec<String> {
        let min = self.min_violations.iter().map(|v| {
            format!(
                "{}: {:?} {:?} is {}, below minimum {}",
                v.scope,
                self.bound.counter,
                self.bound.value_type,
                v.value,
                self.bound.min.unwrap_or(Decimal::ZERO)
            )
        });
        let max = self.max_violations.iter().map(|v| {
            format!(
                "{}: {:?} {:?} is {}, above maximum {}",
                v.scope,
                self.bound.counter,
                self.bound.value_type,
                v.value,
                self.bound.max.unwrap_or(Decimal::ZERO)
            )
        });
        min.chain(max).collect()
    }
}

/// Results of one rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    /// Scope granularity of the rule
    pub target: Target,
    /// One result per bound, in rule order
    pub bounds: Vec<BoundResult>,
}

impl RuleResult {
    /// True if every bound is satisfied
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.bounds.iter().all(BoundResult::is_satisfied)
    }

    /// Total violations across bounds
    #[must_use]
    pub fn violation_count(&self) -> usize {
        self.bounds
            .iter()
            .map(|b| b.min_violations.len() + b.max_violations.len())
            .sum()
    }
}

/// Rule evaluator
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    rules: Vec<Rule>,
}

impl Verifier {
    /// Verifier for `rules`, evaluated in order
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Verifier for the rules of `config`
    #[must_use]
    pub fn from_config(config: &VerifierConfig) -> Self {
        Self::new(config.rules.clone())
    }

    /// Rules in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Evaluate every rule against `snapshot`
    #[must_use]
    pub fn verify(&self, snapshot: &Snapshot) -> Vec<RuleResult> {
        self.rules
            .iter()
            .map(|rule| evaluate(rule, snapshot))
            .collect()
    }

    /// True if every rule holds for `snapshot`
    #[must_use]
    pub fn passes(&self, snapshot: &Snapshot) -> bool {
        self.verify(snapshot).iter().all(RuleResult::is_satisfied)
    }
}

/// Per-scope summaries in first-discovery order
fn scopes(target: Target, snapshot: &Snapshot) -> Vec<(String, CoverageSummary)> {
    let mut scopes: Vec<(String, CoverageSummary)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for class in snapshot.classes() {
        let summary = CoverageSummary::of_class(class, snapshot.weights().class(class.name()));
        let scope = target.scope_of(class.name());
        match index.get(scope) {
            Some(&idx) => scopes[idx].1 += summary,
            None => {
                let _ = index.insert(scope.to_string(), scopes.len());
                scopes.push((scope.to_string(), summary));
            }
        }
    }
    if target == Target::All && scopes.is_empty() {
        scopes.push((ALL_SCOPE.to_string(), CoverageSummary::default()));
    }
    scopes
}

fn evaluate(rule: &Rule, snapshot: &Snapshot) -> RuleResult {
    let scopes = scopes(rule.target, snapshot);
    let bounds = rule
        .bounds
        .iter()
        .map(|bound| {
            let mut result = BoundResult {
                bound: bound.clone(),
                min_violations: Vec::new(),
                max_violations: Vec::new(),
            };
            for (scope, summary) in &scopes {
                let actual = value(totals(summary, bound.counter), bound.value_type);
                if bound.below_min(actual) {
                    result.min_violations.push(Violation {
                        scope: scope.clone(),
                        value: actual,
                    });
                }
                if bound.above_max(actual) {
                    result.max_violations.push(Violation {
                        scope: scope.clone(),
                        value: actual,
                    });
                }
            }
            debug!(
                bound = %bound,
                scopes = scopes.len(),
                below = result.min_violations.len(),
                above = result.max_violations.len(),
                "bound evaluated"
            );
            result
        })
        .collect();
    RuleResult {
        target: rule.target,
        bounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BranchRecord, ClassRecord, LineRecord};

    fn class(name: &str, covered: u32, missed: u32) -> ClassRecord {
        let mut record = ClassRecord::new(name);
        for line in 1..=covered {
            record.insert_line(LineRecord::new(line, "m()V").with_hits(1));
        }
        for line in covered + 1..=covered + missed {
            record.insert_line(LineRecord::new(line, "n()V"));
        }
        record
    }

    #[test]
    fn test_all_scope_min_violation() {
        let snapshot = Snapshot::new().with_class(class("a.Foo", 8, 4));
        let rule = Rule::new(Target::All).with_bound(
            Bound::new(Counter::Line, ValueType::Covered)
                .with_min(10u32)
                .with_max(15u32),
        );
        let results = Verifier::new(vec![rule]).verify(&snapshot);
        let bound = &results[0].bounds[0];
        assert_eq!(
            bound.min_violations,
            vec![Violation {
                scope: "all".into(),
                value: Decimal::from_count(8),
            }]
        );
        assert!(bound.max_violations.is_empty());
        assert_eq!(bound.min_violations[0].value.to_string(), "8");
    }

    #[test]
    fn test_package_missed_rate() {
        let snapshot = Snapshot::new()
            .with_class(class("p.A", 7, 1))
            .with_class(class("p.B", 5, 0))
            .with_class(class("q.C", 1, 0));
        let rule = Rule::new(Target::Package).with_bound(
            Bound::new(Counter::Line, ValueType::MissedRate)
                .with_max("0.05".parse::<Decimal>().unwrap()),
        );
        let results = Verifier::new(vec![rule]).verify(&snapshot);
        let violations = &results[0].bounds[0].max_violations;
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].scope, "p");
        assert_eq!(violations[0].value.to_string(), "0.076923");
    }

    #[test]
    fn test_scopes_in_discovery_order() {
        let snapshot = Snapshot::new()
            .with_class(class("z.A", 0, 1))
            .with_class(class("Default", 0, 1))
            .with_class(class("a.B", 0, 1))
            .with_class(class("z.C", 0, 1));
        let rule = Rule::new(Target::Package)
            .with_bound(Bound::new(Counter::Line, ValueType::Covered).with_min(1u32));
        let results = Verifier::new(vec![rule]).verify(&snapshot);
        let scopes: Vec<&str> = results[0].bounds[0]
            .min_violations
            .iter()
            .map(|v| v.scope.as_str())
            .collect();
        assert_eq!(scopes, vec!["", "a", "z"]);
    }

    #[test]
    fn test_class_scope_branch_rate() {
        let snapshot = Snapshot::new().with_class(
            ClassRecord::new("a.Foo").with_line(
                LineRecord::new(1, "m()V")
                    .with_hits(1)
                    .with_branch(BranchRecord::new(1, 0)),
            ),
        );
        let rule = Rule::new(Target::Class).with_bound(
            Bound::new(Counter::Branch, ValueType::CoveredRate)
                .with_min("0.75".parse::<Decimal>().unwrap()),
        );
        let results = Verifier::new(vec![rule]).verify(&snapshot);
        let violation = &results[0].bounds[0].min_violations[0];
        assert_eq!(violation.scope, "a.Foo");
        assert_eq!(violation.value.to_string(), "0.500000");
        assert_eq!(results[0].violation_count(), 1);
        assert!(!results[0].is_satisfied());
    }

    #[test]
    fn test_method_counter() {
        let snapshot = Snapshot::new().with_class(class("a.Foo", 2, 2));
        let rule = Rule::new(Target::All)
            .with_bound(Bound::new(Counter::Method, ValueType::Missed).with_max(0u32));
        let results = Verifier::new(vec![rule]).verify(&snapshot);
        assert_eq!(
            results[0].bounds[0].max_violations[0].value,
            Decimal::from_count(1)
        );
    }

    #[test]
    fn test_empty_snapshot_all_scope_still_evaluated() {
        let rule = Rule::new(Target::All).with_bound(
            Bound::new(Counter::Line, ValueType::CoveredRate).with_min(Decimal::ratio(1, 2)),
        );
        let results = Verifier::new(vec![rule]).verify(&Snapshot::new());
        assert_eq!(results[0].bounds[0].min_violations[0].value, Decimal::ZERO);
    }

    #[test]
    fn test_passing_rules() {
        let snapshot = Snapshot::new().with_class(class("a.Foo", 3, 0));
        let verifier = Verifier::new(vec![Rule::new(Target::Class)
            .with_bound(Bound::new(Counter::Line, ValueType::CoveredRate).with_min(1u32))]);
        assert!(verifier.passes(&snapshot));
    }

    #[test]
    fn test_describe() {
        let result = BoundResult {
            bound: Bound::new(Counter::Line, ValueType::Covered).with_min(10u32),
            min_violations: vec![Violation {
                scope: "all".into(),
                value: Decimal::from_count(8),
            }],
            max_violations: vec![],
        };
        assert_eq!(result.describe(), vec!["all: Line Covered is 8, below minimum 10"]);
    }
}
