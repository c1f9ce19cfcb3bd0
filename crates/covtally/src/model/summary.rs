//! Covered/missed totals per counter kind.

use super::class::ClassRecord;
use super::line::{LineRecord, LineStatus};
use super::weights::{ClassWeights, LineWeight};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Covered and missed totals of one counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    /// Covered items
    pub covered: u64,
    /// Missed items
    pub missed: u64,
}

impl Totals {
    /// Create totals
    #[must_use]
    pub const fn new(covered: u64, missed: u64) -> Self {
        Self { covered, missed }
    }

    /// Covered + missed
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.covered + self.missed
    }

    /// Count one item
    pub fn count(&mut self, covered: bool) {
        self.add_weighted(covered, 1);
    }

    /// Count `weight` items that are all covered or all missed
    pub fn add_weighted(&mut self, covered: bool, weight: u64) {
        if covered {
            self.covered += weight;
        } else {
            self.missed += weight;
        }
    }

    /// Coverage percentage, 100 when there is nothing to cover
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total() == 0 {
            return 100.0;
        }
        self.covered as f64 / self.total() as f64 * 100.0
    }
}

impl AddAssign for Totals {
    fn add_assign(&mut self, rhs: Self) {
        self.covered += rhs.covered;
        self.missed += rhs.missed;
    }
}

/// Totals for every counter kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageSummary {
    /// Lines with at least one hit vs. none
    pub lines: Totals,
    /// Branch and switch arms
    pub branches: Totals,
    /// Methods with at least one executed line
    pub methods: Totals,
    /// Instruction-weighted coverage
    pub instructions: Totals,
}

impl AddAssign for CoverageSummary {
    fn add_assign(&mut self, rhs: Self) {
        self.lines += rhs.lines;
        self.branches += rhs.branches;
        self.methods += rhs.methods;
        self.instructions += rhs.instructions;
    }
}

impl CoverageSummary {
    /// Summarize one class, using `weights` for the instruction counter
    #[must_use]
    pub fn of_class(class: &ClassRecord, weights: Option<&ClassWeights>) -> Self {
        let mut summary = Self::default();
        for line in class.lines() {
            summary.lines.count(line.status() != LineStatus::None);
            let (covered, total) = line.arm_totals();
            summary.branches += Totals::new(u64::from(covered), u64::from(total - covered));
            if let Some(weight) = weights.and_then(|w| w.get(line.line)) {
                summary.instructions += instruction_totals(line, weight);
            }
        }
        for (_, lines) in class.methods() {
            summary.methods.count(lines.iter().any(|l| l.hits > 0));
        }
        summary
    }
}

fn instruction_totals(line: &LineRecord, weight: &LineWeight) -> Totals {
    let mut totals = Totals::default();
    totals.add_weighted(line.hits > 0, u64::from(weight.instructions));
    for (idx, arm) in weight.branches.iter().enumerate() {
        let branch = line.branches.get(idx);
        totals.add_weighted(
            branch.is_some_and(|b| b.true_hits > 0),
            u64::from(arm.true_arm),
        );
        totals.add_weighted(
            branch.is_some_and(|b| b.false_hits > 0),
            u64::from(arm.false_arm),
        );
    }
    for (idx, arms) in weight.switches.iter().enumerate() {
        let switch = line.switches.get(idx);
        for (slot, &instructions) in arms.keys.iter().enumerate() {
            let hit = switch
                .and_then(|s| s.hits().get(slot))
                .is_some_and(|&h| h > 0);
            totals.add_weighted(hit, u64::from(instructions));
        }
        totals.add_weighted(
            switch.is_some_and(|s| s.default_hits() > 0),
            u64::from(arms.default_arm),
        );
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::line::{BranchRecord, SwitchRecord};
    use crate::model::weights::{BranchWeight, SwitchWeight};

    fn class() -> ClassRecord {
        ClassRecord::new("a.Foo")
            .with_line(
                LineRecord::new(1, "a()V")
                    .with_hits(2)
                    .with_branch(BranchRecord::new(2, 0)),
            )
            .with_line(LineRecord::new(2, "a()V").with_hits(1))
            .with_line(
                LineRecord::new(5, "b()V").with_switch(SwitchRecord::new(vec![1, 2])),
            )
    }

    #[test]
    fn test_line_and_method_totals() {
        let summary = CoverageSummary::of_class(&class(), None);
        assert_eq!(summary.lines, Totals::new(2, 1));
        assert_eq!(summary.methods, Totals::new(1, 1));
        assert_eq!(summary.branches, Totals::new(1, 4));
        assert_eq!(summary.instructions, Totals::default());
    }

    #[test]
    fn test_instruction_totals_use_weights() {
        let weights = ClassWeights::new()
            .with(
                1,
                LineWeight {
                    instructions: 3,
                    branches: vec![BranchWeight {
                        true_arm: 2,
                        false_arm: 4,
                    }],
                    switches: Vec::new(),
                },
            )
            .with(2, LineWeight::new(1))
            .with(
                5,
                LineWeight {
                    instructions: 2,
                    branches: Vec::new(),
                    switches: vec![SwitchWeight {
                        default_arm: 1,
                        keys: vec![1, 1],
                    }],
                },
            );
        let summary = CoverageSummary::of_class(&class(), Some(&weights));
        assert_eq!(summary.instructions, Totals::new(6, 9));
    }

    #[test]
    fn test_percent() {
        assert_eq!(Totals::new(1, 3).percent(), 25.0);
        assert_eq!(Totals::default().percent(), 100.0);
    }

    #[test]
    fn test_add_assign() {
        let mut a = CoverageSummary::default();
        a.lines = Totals::new(1, 1);
        let mut b = CoverageSummary::default();
        b.lines = Totals::new(2, 0);
        a += b;
        assert_eq!(a.lines, Totals::new(3, 1));
    }
}
