use crate::frontend::weights::StaticWeightMap;
use crate::mem::org::BankIndex;
use crate::policy::{AllocationTable, BankOccupancy, KvCachePolicy, PolicyConfig};
use log::warn;
use std::sync::Arc;

pub const NAME: &str = "SmartLocality";

/// Contention-aware placement refined with a per-bank activity score.
///
/// `activity` normalizes a bank's static weight count against the busiest
/// bank (0..=100).  Banks in the moderate activity band earn a locality
/// bonus: adjacent KV entries keep some row-buffer reuse next to warm weight
/// banks, while too-hot banks would serialize and too-cold banks gain
/// nothing.  Lower score wins.
pub struct SmartLocalityPolicy {
    config: Arc<PolicyConfig>,
    num_banks: usize,
    locality_bonus_hits: i64,
    occupancy: BankOccupancy,
    table: AllocationTable,
}

const BONUS_BAND: std::ops::RangeInclusive<i64> = 20..=80;

impl SmartLocalityPolicy {
    pub fn new(config: Arc<PolicyConfig>) -> Self {
        Self {
            config,
            num_banks: 0,
            locality_bonus_hits: 0,
            occupancy: BankOccupancy::default(),
            table: AllocationTable::default(),
        }
    }

    /// Static weight occupancy of a bank relative to the busiest bank, in
    /// percent.
    fn activity(&self, bank: BankIndex) -> i64 {
        let max = self.occupancy.max_weight_count();
        if max == 0 {
            return 0;
        }
        self.occupancy.static_weight_count[bank] * 100 / max
    }

    /// Placement score; the bool reports whether the locality bonus applied.
    fn score(&self, bank: BankIndex) -> (f64, bool) {
        let weight = self.occupancy.static_weight_count[bank] as f64;
        let dynamic = self.occupancy.dynamic_alloc_count[bank] as f64;
        let mut score = 100.0 * weight + 10.0 * dynamic;
        let bonus = BONUS_BAND.contains(&self.activity(bank));
        if bonus {
            score -= 50.0 * self.config.locality_weight;
        }
        (score, bonus)
    }

    /// Candidate banks, most preferred class first: weight-free banks under
    /// the cap, then cold banks under the cap, then cold banks, then all.
    fn candidates(&self) -> Vec<BankIndex> {
        let n = self.num_banks;
        let cap = self.config.max_kv_per_bank;
        let threshold = self.config.activity_threshold_percent;
        let cold = |b: BankIndex| self.activity(b) < threshold;
        let under_cap = |b: BankIndex| self.occupancy.dynamic_alloc_count[b] < cap;

        let free_under_cap: Vec<_> = (0..n)
            .filter(|&b| self.occupancy.static_weight_count[b] == 0 && under_cap(b))
            .collect();
        if !free_under_cap.is_empty() {
            return free_under_cap;
        }
        let cold_under_cap: Vec<_> = (0..n).filter(|&b| cold(b) && under_cap(b)).collect();
        if !cold_under_cap.is_empty() {
            return cold_under_cap;
        }
        let cold_banks: Vec<_> = (0..n).filter(|&b| cold(b)).collect();
        if !cold_banks.is_empty() {
            return cold_banks;
        }
        (0..n).collect()
    }

    fn choose_bank(&self) -> Option<(BankIndex, bool)> {
        let mut best: Option<(BankIndex, bool)> = None;
        let mut best_score = f64::INFINITY;
        for bank in self.candidates() {
            let (score, bonus) = self.score(bank);
            if score < best_score {
                best_score = score;
                best = Some((bank, bonus));
            }
        }
        best
    }
}

impl KvCachePolicy for SmartLocalityPolicy {
    fn name(&self) -> &'static str {
        NAME
    }

    fn init(&mut self, num_banks: usize, static_weight_map: &StaticWeightMap) {
        self.num_banks = num_banks;
        self.locality_bonus_hits = 0;
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
            warn!("allocate on unconfigured SmartLocality policy");
            return None;
        }
        let (bank, bonus) = self.choose_bank()?;
        if bonus {
            self.locality_bonus_hits += 1;
        }

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
            ("locality_bonus_hits", self.locality_bonus_hits),
        ]
    }

    fn reset_stats(&mut self) {
        self.table.reset_stats();
        self.locality_bonus_hits = 0;
    }
}
