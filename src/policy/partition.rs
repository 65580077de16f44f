use crate::frontend::weights::StaticWeightMap;
use crate::mem::org::BankIndex;
use crate::policy::{AllocationTable, BankOccupancy, KvCachePolicy, PolicyConfig};
use log::warn;
use std::sync::Arc;

pub const NAME: &str = "BankPartitioning";

/// Reserves a contiguous bank range exclusively for KV cache and round-robins
/// inside it.  The offline layout tool is expected to leave that range free
/// of weights; conflicts reported here indicate a mis-configured split.
pub struct BankPartitioningPolicy {
    config: Arc<PolicyConfig>,
    num_banks: usize,
    start: BankIndex,
    count: usize,
    next_kv_bank: BankIndex,
    occupancy: BankOccupancy,
    table: AllocationTable,
}

impl BankPartitioningPolicy {
    pub fn new(config: Arc<PolicyConfig>) -> Self {
        Self {
            config,
            num_banks: 0,
            start: 0,
            count: 0,
            next_kv_bank: 0,
            occupancy: BankOccupancy::default(),
            table: AllocationTable::default(),
        }
    }

    fn in_reserved_range(&self, bank: BankIndex) -> bool {
        bank >= self.start && bank < self.start + self.count
    }
}

impl KvCachePolicy for BankPartitioningPolicy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, num_banks: usize, static_weight_map: &StaticWeightMap) {
        self.num_banks = num_banks;
        self.occupancy = BankOccupancy::new(num_banks);
        self.occupancy.rebuild_weights(static_weight_map);
        self.table = AllocationTable::default();

        // Reserve a quarter of the banks unless configured otherwise, clamped
        // to the bank space and never empty.
        self.start = self
            .config
            .kv_cache_banks_start
            .min(num_banks.saturating_sub(1));
        self.count = self
            .config
            .kv_cache_banks_count
            .unwrap_or(num_banks / 4)
            .max(1);
        if self.start + self.count > num_banks {
            self.count = num_banks - self.start;
        }
        self.next_kv_bank = self.start;
    }

    fn set_static_weight_mapping(&mut self, static_weight_map: &StaticWeightMap) {
        self.occupancy.rebuild_weights(static_weight_map);
    }

    fn allocate_kv_cache_bank(
        &mut self,
        _kv_cache_size: usize,
        token_id: usize,
    ) -> Option<BankIndex> {
        if self.count == 0 {
            warn!("allocate on unconfigured BankPartitioning policy");
            return None;
        }
        let bank = self.next_kv_bank;
        self.next_kv_bank = self.start + (self.next_kv_bank - self.start + 1) % self.count;

        let conflict = self.has_bank_conflict(bank);
        self.occupancy.record_alloc(bank);
        self.table.record(token_id, bank, conflict);
        Some(bank)
    }

    fn get_kv_cache_bank(&self, token_id: usize) -> Option<BankIndex> {
        self.table.bank_of(token_id)
    }

    fn has_bank_conflict(&self, bank: BankIndex) -> bool {
        // Weights outside the reserved range never contend with KV entries.
        self.in_reserved_range(bank) && self.occupancy.has_weights(bank)
    }

    fn stats(&self) -> Vec<(&'static str, i64)> {
        vec![
            ("total_allocations", self.table.total_allocations),
            ("total_conflicts", self.table.total_conflicts),
            ("reserved_banks", self.count as i64),
        ]
    }

    fn reset_stats(&mut self) {
        self.table.reset_stats();
    }
}
