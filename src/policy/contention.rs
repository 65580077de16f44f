use crate::frontend::weights::StaticWeightMap;
use crate::mem::org::BankIndex;
use crate::policy::{AllocationTable, BankOccupancy, KvCachePolicy, PolicyConfig};
use log::warn;
use std::sync::Arc;

pub const NAME: &str = "ContentionAware";

/// Steers KV entries toward weight-free banks, capped per bank so the
/// placement does not collapse onto a single cold bank.
///
/// Allocation rule: scan banks round-robin from one past the last placement
/// and take the first weight-free bank still under the cap; failing that,
/// spread by minimum dynamic load (weight-free banks first).
pub struct ContentionAwarePolicy {
    config: Arc<PolicyConfig>,
    num_banks: usize,
    last_bank: Option<BankIndex>,
    avg_weight_density: i64,
    occupancy: BankOccupancy,
    table: AllocationTable,
}

impl ContentionAwarePolicy {
    pub fn new(config: Arc<PolicyConfig>) -> Self {
        Self {
            config,
            num_banks: 0,
            last_bank: None,
            avg_weight_density: 0,
            occupancy: BankOccupancy::default(),
            table: AllocationTable::default(),
        }
    }

    fn refresh_density(&mut self) {
        self.avg_weight_density = if self.num_banks > 0 {
            self.occupancy.total_weight_count() / self.num_banks as i64
        } else {
            0
        };
    }

    /// Minimum dynamic load over `candidates`, ties broken by lowest index.
    fn least_loaded(&self, candidates: impl Iterator<Item = BankIndex>) -> Option<BankIndex> {
        let mut best = None;
        let mut best_count = i64::MAX;
        for bank in candidates {
            let count = self.occupancy.dynamic_alloc_count[bank];
            if count < best_count {
                best_count = count;
                best = Some(bank);
            }
        }
        best
    }

    fn choose_bank(&self) -> Option<BankIndex> {
        let n = self.num_banks;
        let cap = self.config.max_kv_per_bank;
        let start = self.last_bank.map_or(0, |b| (b + 1) % n);

        // Weight-free bank under the cap, round-robin from the last placement.
        for i in 0..n {
            let bank = (start + i) % n;
            if self.occupancy.static_weight_count[bank] == 0
                && self.occupancy.dynamic_alloc_count[bank] < cap
            {
                return Some(bank);
            }
        }

        // All weight-free banks are at the cap: spread across them by load.
        let weight_free = (0..n).filter(|&b| self.occupancy.static_weight_count[b] == 0);
        if let Some(bank) = self.least_loaded(weight_free) {
            return Some(bank);
        }

        // Every bank holds weights; conflicts are unavoidable, balance load.
        self.least_loaded(0..n)
    }
}

impl KvCachePolicy for ContentionAwarePolicy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, num_banks: usize, static_weight_map: &StaticWeightMap) {
        self.num_banks = num_banks;
        self.last_bank = None;
        self.occupancy = BankOccupancy::new(num_banks);
        self.occupancy.rebuild_weights(static_weight_map);
        self.table = AllocationTable::default();
        self.refresh_density();
    }

    fn set_static_weight_mapping(&mut self, static_weight_map: &StaticWeightMap) {
        self.occupancy.rebuild_weights(static_weight_map);
        self.refresh_density();
    }

    fn allocate_kv_cache_bank(
        &mut self,
        _kv_cache_size: usize,
        token_id: usize,
    ) -> Option<BankIndex> {
        if self.num_banks == 0 {
            warn!("allocate on unconfigured ContentionAware policy");
            return None;
        }
        let bank = self.choose_bank()?;
        self.last_bank = Some(bank);

        let conflict = self.has_bank_conflict(bank);
        self.occupancy.record_alloc(bank);
        self.table.record(token_id, bank, conflict);
        Some(bank)
    }

    fn get_kv_cache_bank(&self, token_id: usize) -> Option<BankIndex> {
        self.table.bank_of(token_id)
    }

    fn has_bank_conflict(&self, bank: BankIndex) -> bool {
        self.occupancy.has_weights(bank)
    }

    fn stats(&self) -> Vec<(&'static str, i64)> {
        vec![
            ("total_allocations", self.table.total_allocations),
            ("total_conflicts", self.table.total_conflicts),
            ("avg_weight_density", self.avg_weight_density),
        ]
    }

    fn reset_stats(&mut self) {
        self.table.reset_stats();
    }
}
