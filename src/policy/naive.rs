use crate::frontend::weights::StaticWeightMap;
use crate::mem::org::BankIndex;
use crate::policy::{AllocationTable, BankOccupancy, KvCachePolicy};
use log::warn;

pub const NAME: &str = "Naive";

/// Round-robin placement, blind to the static weight layout.  Serves as the
/// baseline that makes bank conflicts visible.
#[derive(Default)]
pub struct NaiveKvPolicy {
    num_banks: usize,
    next_bank: BankIndex,
    occupancy: BankOccupancy,
    table: AllocationTable,
}

impl NaiveKvPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvCachePolicy for NaiveKvPolicy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, num_banks: usize, static_weight_map: &StaticWeightMap) {
        self.num_banks = num_banks;
        self.next_bank = 0;
        self.occupancy = BankOccupancy::new(num_banks);
        self.occupancy.rebuild_weights(static_weight_map);
        self.table = AllocationTable::default();
    }

    fn set_static_weight_mapping(&mut self, static_weight_map: &StaticWeightMap) {
        self.occupancy.rebuild_weights(static_weight_map);
    }

    fn allocate_kv_cache_bank(
        &mut self,
        _kv_cache_size: usize,
        token_id: usize,
    ) -> Option<BankIndex> {
        if self.num_banks == 0 {
            warn!("allocate on unconfigured Naive policy");
            return None;
        }
        let bank = self.next_bank;
        self.next_bank = (self.next_bank + 1) % self.num_banks;

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
        ]
    }

    fn reset_stats(&mut self) {
        self.table.reset_stats();
    }
}
