use crate::mem::org::BankIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// A weight operation hit a bank with live KV occupancy.
    WeightBlockedByKv,
    /// A KV operation hit a bank with live weight occupancy.
    KvBlockedByWeight,
}

impl ConflictKind {
    pub fn label(self) -> &'static str {
        match self {
            ConflictKind::WeightBlockedByKv => "weight_kv",
            ConflictKind::KvBlockedByWeight => "kv_weight",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConflictEvent {
    pub bank: BankIndex,
    pub cycle: u64,
    pub kind: ConflictKind,
}

/// Observes the issued address stream and attributes cross-class bank
/// overlap.  Bank occupancy is sticky: completing an operation removes it
/// from the active vector but keeps its address in the usage set, so even
/// temporally separated accesses to the same bank count toward the
/// attribution metric.
pub struct BankConflictTracker {
    num_banks: usize,
    weight_usage: Vec<std::collections::HashSet<u64>>,
    kv_usage: Vec<std::collections::HashSet<u64>>,
    active_weight: Vec<Vec<u64>>,
    active_kv: Vec<Vec<u64>>,
    total_conflicts: i64,
    weight_kv_conflicts: i64,
    kv_weight_conflicts: i64,
    history: Vec<ConflictEvent>,
}

impl BankConflictTracker {
    pub fn new(num_banks: usize) -> Self {
        Self {
            num_banks,
            weight_usage: vec![Default::default(); num_banks],
            kv_usage: vec![Default::default(); num_banks],
            active_weight: vec![Vec::new(); num_banks],
            active_kv: vec![Vec::new(); num_banks],
            total_conflicts: 0,
            weight_kv_conflicts: 0,
            kv_weight_conflicts: 0,
            history: Vec::new(),
        }
    }

    pub fn register_weight_operation(&mut self, bank: BankIndex, addr: u64, cycle: u64) {
        if bank >= self.num_banks {
            return;
        }
        self.weight_usage[bank].insert(addr);
        self.active_weight[bank].push(addr);

        if !self.kv_usage[bank].is_empty() {
            self.total_conflicts += 1;
            self.weight_kv_conflicts += 1;
            self.history.push(ConflictEvent {
                bank,
                cycle,
                kind: ConflictKind::WeightBlockedByKv,
            });
        }
    }

    pub fn register_kv_cache_operation(&mut self, bank: BankIndex, addr: u64, cycle: u64) {
        if bank >= self.num_banks {
            return;
        }
        self.kv_usage[bank].insert(addr);
        self.active_kv[bank].push(addr);

        if !self.weight_usage[bank].is_empty() {
            self.total_conflicts += 1;
            self.kv_weight_conflicts += 1;
            self.history.push(ConflictEvent {
                bank,
                cycle,
                kind: ConflictKind::KvBlockedByWeight,
            });
        }
    }

    /// Retire a weight operation.  The usage set deliberately keeps the
    /// address so occupancy stays sticky for conflict attribution.
    pub fn complete_weight_operation(&mut self, bank: BankIndex, addr: u64) {
        if bank >= self.num_banks {
            return;
        }
        self.active_weight[bank].retain(|&a| a != addr);
    }

    pub fn complete_kv_cache_operation(&mut self, bank: BankIndex, addr: u64) {
        if bank >= self.num_banks {
            return;
        }
        self.active_kv[bank].retain(|&a| a != addr);
    }

    pub fn has_potential_conflict(&self, bank: BankIndex) -> bool {
        if bank >= self.num_banks {
            return false;
        }
        !self.weight_usage[bank].is_empty() && !self.kv_usage[bank].is_empty()
    }

    pub fn stats(&self) -> Vec<(&'static str, i64)> {
        vec![
            ("total_conflicts", self.total_conflicts),
            ("weight_kv_conflicts", self.weight_kv_conflicts),
            ("kv_weight_conflicts", self.kv_weight_conflicts),
        ]
    }

    pub fn history(&self) -> &[ConflictEvent] {
        &self.history
    }

    pub fn reset_stats(&mut self) {
        self.total_conflicts = 0;
        self.weight_kv_conflicts = 0;
        self.kv_weight_conflicts = 0;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(tracker: &BankConflictTracker, name: &str) -> i64 {
        tracker
            .stats()
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .unwrap()
    }

    #[test]
    fn cross_class_overlap_counts_both_directions() {
        let mut tracker = BankConflictTracker::new(8);
        tracker.register_weight_operation(3, 0x10, 1);
        assert_eq!(stat(&tracker, "total_conflicts"), 0, "no KV side yet");

        tracker.register_kv_cache_operation(3, 0x20, 2);
        assert_eq!(stat(&tracker, "kv_weight_conflicts"), 1);

        tracker.register_weight_operation(3, 0x11, 3);
        assert_eq!(stat(&tracker, "weight_kv_conflicts"), 1);
        assert_eq!(stat(&tracker, "total_conflicts"), 2);

        let kinds: Vec<_> = tracker.history().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ConflictKind::KvBlockedByWeight,
                ConflictKind::WeightBlockedByKv,
            ]
        );
        assert_eq!(tracker.history()[0].bank, 3);
        assert_eq!(tracker.history()[0].cycle, 2);
    }

    #[test]
    fn disjoint_banks_never_conflict() {
        let mut tracker = BankConflictTracker::new(8);
        tracker.register_weight_operation(0, 0x10, 1);
        tracker.register_kv_cache_operation(1, 0x20, 2);
        assert_eq!(stat(&tracker, "total_conflicts"), 0);
        assert!(!tracker.has_potential_conflict(0));
        assert!(!tracker.has_potential_conflict(1));
    }

    #[test]
    fn occupancy_is_sticky_across_completion() {
        let mut tracker = BankConflictTracker::new(8);
        tracker.register_weight_operation(2, 0x10, 1);
        tracker.complete_weight_operation(2, 0x10);

        // The weight retired, but the bank still attributes a conflict.
        tracker.register_kv_cache_operation(2, 0x20, 5);
        assert_eq!(stat(&tracker, "kv_weight_conflicts"), 1);
        assert!(tracker.has_potential_conflict(2));
    }

    #[test]
    fn out_of_range_banks_are_ignored() {
        let mut tracker = BankConflictTracker::new(4);
        tracker.register_weight_operation(9, 0x10, 1);
        tracker.register_kv_cache_operation(9, 0x20, 2);
        tracker.complete_weight_operation(9, 0x10);
        assert_eq!(stat(&tracker, "total_conflicts"), 0);
        assert!(!tracker.has_potential_conflict(9));
    }

    #[test]
    fn reset_clears_counters_and_history() {
        let mut tracker = BankConflictTracker::new(4);
        tracker.register_weight_operation(1, 0x10, 1);
        tracker.register_kv_cache_operation(1, 0x20, 2);
        tracker.reset_stats();
        assert_eq!(stat(&tracker, "total_conflicts"), 0);
        assert!(tracker.history().is_empty());
        // Usage sets survive the reset: occupancy attribution continues.
        tracker.register_kv_cache_operation(1, 0x30, 3);
        assert_eq!(stat(&tracker, "kv_weight_conflicts"), 1);
    }
}
