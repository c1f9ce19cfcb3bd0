//! Per-line coverage records.

use super::counter::saturating_hits;
use serde::{Deserialize, Serialize};

/// Coverage classification of one source line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    /// Never executed
    None,
    /// Executed, but some branch or switch arm was not
    Partial,
    /// Executed with every arm covered
    Full,
}

/// Hit counts of a binary decision ("jump")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BranchRecord {
    /// Times the condition evaluated true
    pub true_hits: u32,
    /// Times the condition evaluated false
    pub false_hits: u32,
}

impl BranchRecord {
    /// Create a branch record with explicit counts
    #[must_use]
    pub const fn new(true_hits: u32, false_hits: u32) -> Self {
        Self {
            true_hits,
            false_hits,
        }
    }

    /// Count one outcome
    pub fn record(&mut self, taken: bool) {
        if taken {
            self.true_hits = saturating_hits(self.true_hits, 1);
        } else {
            self.false_hits = saturating_hits(self.false_hits, 1);
        }
    }

    /// Number of arms (0..=2) that were executed
    #[must_use]
    pub const fn covered_arms(&self) -> u32 {
        (self.true_hits > 0) as u32 + (self.false_hits > 0) as u32
    }

    /// True if both arms were executed
    #[must_use]
    pub const fn is_fully_covered(&self) -> bool {
        self.true_hits > 0 && self.false_hits > 0
    }
}

/// Hit counts of a multi-way branch
///
/// `keys` and `hits` are parallel; the default arm is counted separately.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwitchRecord {
    keys: Vec<i32>,
    hits: Vec<u32>,
    default_hits: u32,
}

impl SwitchRecord {
    /// Create a switch with the given case keys and zero counts
    #[must_use]
    pub fn new(keys: Vec<i32>) -> Self {
        let hits = vec![0; keys.len()];
        Self {
            keys,
            hits,
            default_hits: 0,
        }
    }

    /// Build a switch from `(key, hits)` pairs
    #[must_use]
    pub fn from_pairs(default_hits: u32, pairs: impl IntoIterator<Item = (i32, u32)>) -> Self {
        let (keys, hits) = pairs.into_iter().unzip();
        Self {
            keys,
            hits,
            default_hits,
        }
    }

    /// Case keys in declaration order
    #[must_use]
    pub fn keys(&self) -> &[i32] {
        &self.keys
    }

    /// Per-key hit counts, parallel to [`Self::keys`]
    #[must_use]
    pub fn hits(&self) -> &[u32] {
        &self.hits
    }

    /// Hits on the default arm
    #[must_use]
    pub const fn default_hits(&self) -> u32 {
        self.default_hits
    }

    /// Iterate `(key, hits)` pairs
    pub fn pairs(&self) -> impl Iterator<Item = (i32, u32)> + '_ {
        self.keys.iter().copied().zip(self.hits.iter().copied())
    }

    /// Count one dispatch on `key`; unknown keys go to the default arm
    pub fn record(&mut self, key: i32) {
        match self.keys.iter().position(|&k| k == key) {
            Some(idx) => self.hits[idx] = saturating_hits(self.hits[idx], 1),
            None => self.default_hits = saturating_hits(self.default_hits, 1),
        }
    }

    /// Add hits to the arm at `idx`, or the default arm when `idx` is `None`
    pub fn add_arm_hits(&mut self, idx: Option<usize>, n: u32) {
        match idx {
            Some(i) if i < self.hits.len() => self.hits[i] = saturating_hits(self.hits[i], n),
            Some(_) => {}
            None => self.default_hits = saturating_hits(self.default_hits, n),
        }
    }

    /// Number of arms including the default
    #[must_use]
    pub fn arm_count(&self) -> u32 {
        self.keys.len() as u32 + 1
    }

    /// Number of executed arms including the default
    #[must_use]
    pub fn covered_arms(&self) -> u32 {
        self.hits.iter().filter(|&&h| h > 0).count() as u32 + u32::from(self.default_hits > 0)
    }

    /// True if every arm including the default was executed
    #[must_use]
    pub fn is_fully_covered(&self) -> bool {
        self.covered_arms() == self.arm_count()
    }

    /// Grow to `keys` if it is a longer key set.
    ///
    /// Counts stay attached to their slot index.
    pub(crate) fn widen_keys(&mut self, keys: &[i32]) {
        if keys.len() > self.keys.len() {
            self.keys = keys.to_vec();
            self.hits.resize(self.keys.len(), 0);
        }
    }

    pub(crate) fn add_slot_hits(&mut self, slot: usize, n: u32) {
        if let Some(h) = self.hits.get_mut(slot) {
            *h = saturating_hits(*h, n);
        }
    }

    pub(crate) fn add_default_hits(&mut self, n: u32) {
        self.default_hits = saturating_hits(self.default_hits, n);
    }
}

/// Coverage of one source line
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineRecord {
    /// 1-based line number
    pub line: u32,
    /// Owning method signature (name + descriptor)
    pub method: String,
    /// Executions of the line
    pub hits: u32,
    /// Binary decisions on this line
    pub branches: Vec<BranchRecord>,
    /// Multi-way decisions on this line
    pub switches: Vec<SwitchRecord>,
    /// Test that covered this line, when recorded per test
    pub test_tag: Option<String>,
}

impl LineRecord {
    /// Create a zero-hit line
    #[must_use]
    pub fn new(line: u32, method: impl Into<String>) -> Self {
        Self {
            line,
            method: method.into(),
            ..Self::default()
        }
    }

    /// Set the hit count
    #[must_use]
    pub fn with_hits(mut self, hits: u32) -> Self {
        self.hits = hits;
        self
    }

    /// Append a branch
    #[must_use]
    pub fn with_branch(mut self, branch: BranchRecord) -> Self {
        self.branches.push(branch);
        self
    }

    /// Append a switch
    #[must_use]
    pub fn with_switch(mut self, switch: SwitchRecord) -> Self {
        self.switches.push(switch);
        self
    }

    /// Count one execution of the line
    pub fn record_hit(&mut self) {
        self.hits = saturating_hits(self.hits, 1);
    }

    /// Zero-hit copy that keeps method, branch and switch shape
    #[must_use]
    pub fn zeroed(&self) -> Self {
        Self {
            line: self.line,
            method: self.method.clone(),
            hits: 0,
            branches: vec![BranchRecord::default(); self.branches.len()],
            switches: self
                .switches
                .iter()
                .map(|s| SwitchRecord::new(s.keys.clone()))
                .collect(),
            test_tag: None,
        }
    }

    /// True if the line carries any branch or switch
    #[must_use]
    pub fn has_decisions(&self) -> bool {
        !self.branches.is_empty() || !self.switches.is_empty()
    }

    /// `(covered, total)` decision arms on this line
    #[must_use]
    pub fn arm_totals(&self) -> (u32, u32) {
        let mut covered = 0;
        let mut total = 0;
        for branch in &self.branches {
            covered += branch.covered_arms();
            total += 2;
        }
        for switch in &self.switches {
            covered += switch.covered_arms();
            total += switch.arm_count();
        }
        (covered, total)
    }

    /// Derived coverage status
    #[must_use]
    pub fn status(&self) -> LineStatus {
        if self.hits == 0 {
            return LineStatus::None;
        }
        let all_covered = self.branches.iter().all(BranchRecord::is_fully_covered)
            && self.switches.iter().all(SwitchRecord::is_fully_covered);
        if all_covered {
            LineStatus::Full
        } else {
            LineStatus::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_hits_is_none() {
        let line = LineRecord::new(5, "run()V");
        assert_eq!(line.status(), LineStatus::None);
    }

    #[test]
    fn test_zero_hits_is_none_even_with_covered_branch() {
        let line = LineRecord::new(5, "run()V").with_branch(BranchRecord::new(1, 1));
        assert_eq!(line.status(), LineStatus::None);
    }

    #[test]
    fn test_all_arms_covered_is_full() {
        let line = LineRecord::new(5, "run()V")
            .with_hits(3)
            .with_branch(BranchRecord::new(2, 1))
            .with_switch(SwitchRecord::from_pairs(1, [(1, 1), (2, 4)]));
        assert_eq!(line.status(), LineStatus::Full);
    }

    #[test]
    fn test_one_missing_arm_is_partial() {
        let line = LineRecord::new(5, "run()V")
            .with_hits(3)
            .with_branch(BranchRecord::new(3, 0));
        assert_eq!(line.status(), LineStatus::Partial);
    }

    #[test]
    fn test_uncovered_default_arm_is_partial() {
        let line = LineRecord::new(5, "run()V")
            .with_hits(3)
            .with_switch(SwitchRecord::from_pairs(0, [(1, 1)]));
        assert_eq!(line.status(), LineStatus::Partial);
    }

    #[test]
    fn test_plain_line_with_hits_is_full() {
        let line = LineRecord::new(1, "m()V").with_hits(1);
        assert_eq!(line.status(), LineStatus::Full);
    }

    #[test]
    fn test_switch_record_routes_unknown_key_to_default() {
        let mut switch = SwitchRecord::new(vec![10, 20]);
        switch.record(10);
        switch.record(99);
        assert_eq!(switch.hits(), &[1, 0]);
        assert_eq!(switch.default_hits(), 1);
        assert_eq!(switch.covered_arms(), 2);
        assert_eq!(switch.arm_count(), 3);
    }

    #[test]
    fn test_branch_record_arms() {
        let mut branch = BranchRecord::default();
        branch.record(true);
        assert_eq!(branch.covered_arms(), 1);
        branch.record(false);
        assert!(branch.is_fully_covered());
    }

    #[test]
    fn test_arm_totals() {
        let line = LineRecord::new(1, "m()V")
            .with_hits(1)
            .with_branch(BranchRecord::new(1, 0))
            .with_switch(SwitchRecord::from_pairs(0, [(1, 2), (2, 0)]));
        assert_eq!(line.arm_totals(), (2, 5));
    }

    #[test]
    fn test_zeroed_keeps_shape() {
        let line = LineRecord::new(4, "m()V")
            .with_hits(9)
            .with_branch(BranchRecord::new(1, 2))
            .with_switch(SwitchRecord::from_pairs(3, [(7, 1)]));
        let zero = line.zeroed();
        assert_eq!(zero.hits, 0);
        assert_eq!(zero.branches, vec![BranchRecord::default()]);
        assert_eq!(zero.switches[0].keys(), &[7]);
        assert_eq!(zero.switches[0].hits(), &[0]);
    }

    #[test]
    fn test_widen_keys_keeps_counts() {
        let mut switch = SwitchRecord::from_pairs(0, [(1, 5)]);
        switch.widen_keys(&[1, 2, 3]);
        assert_eq!(switch.keys(), &[1, 2, 3]);
        assert_eq!(switch.hits(), &[5, 0, 0]);

        switch.widen_keys(&[9]);
        assert_eq!(switch.keys(), &[1, 2, 3]);
    }
}
