use crate::error::ConfigError;
use crate::frontend::weights::StaticWeightMap;
use crate::mem::org::BankIndex;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod config;
mod contention;
mod locality;
mod naive;
mod partition;

#[cfg(test)]
mod tests;

pub use config::PolicyConfig;
pub use contention::ContentionAwarePolicy;
pub use locality::SmartLocalityPolicy;
pub use naive::NaiveKvPolicy;
pub use partition::BankPartitioningPolicy;

/// Placement policy for dynamic KV cache entries over the flat bank space.
///
/// A policy is constructed unconfigured; `init` binds the bank count and the
/// static weight occupancy, after which the allocation operations are live.
/// `set_static_weight_mapping` rebinds the occupancy alone, for the case
/// where the real weight layout only becomes known after kernel expansion.
pub trait KvCachePolicy {
    fn name(&self) -> &'static str;

    fn init(&mut self, num_banks: usize, static_weight_map: &StaticWeightMap);

    fn set_static_weight_mapping(&mut self, static_weight_map: &StaticWeightMap);

    /// Choose a bank for the token's new KV entry and record the assignment.
    /// Returns `None` only on an unconfigured policy.
    fn allocate_kv_cache_bank(&mut self, kv_cache_size: usize, token_id: usize)
        -> Option<BankIndex>;

    fn get_kv_cache_bank(&self, token_id: usize) -> Option<BankIndex>;

    fn has_bank_conflict(&self, bank: BankIndex) -> bool;

    /// Named counter bag, reported verbatim at finalize.
    fn stats(&self) -> Vec<(&'static str, i64)>;

    /// Zero the counters; placement state is kept.  Callers wanting a clean
    /// run construct a fresh policy.
    fn reset_stats(&mut self);
}

/// Registry of policy variants under their config-facing names.
pub fn build_policy(config: &Arc<PolicyConfig>) -> Result<Box<dyn KvCachePolicy>, ConfigError> {
    match config.policy_impl.as_str() {
        naive::NAME => Ok(Box::new(NaiveKvPolicy::new())),
        partition::NAME => Ok(Box::new(BankPartitioningPolicy::new(Arc::clone(config)))),
        contention::NAME => Ok(Box::new(ContentionAwarePolicy::new(Arc::clone(config)))),
        locality::NAME => Ok(Box::new(SmartLocalityPolicy::new(Arc::clone(config)))),
        other => Err(ConfigError::UnknownPolicy(other.to_string())),
    }
}

/// Per-bank occupancy counters shared by every policy variant: how many
/// weight signatures the static layout pinned to each bank, and how many KV
/// entries the policy has placed there so far.
#[derive(Debug, Default)]
pub struct BankOccupancy {
    pub static_weight_count: Vec<i64>,
    pub dynamic_alloc_count: Vec<i64>,
}

impl BankOccupancy {
    pub fn new(num_banks: usize) -> Self {
        Self {
            static_weight_count: vec![0; num_banks],
            dynamic_alloc_count: vec![0; num_banks],
        }
    }

    /// Re-derive the weight counters from a (possibly late-bound) map.
    /// Dynamic allocation counts are untouched.
    pub fn rebuild_weights(&mut self, map: &StaticWeightMap) {
        self.static_weight_count.fill(0);
        for (&bank, addrs) in map {
            if bank < self.static_weight_count.len() {
                self.static_weight_count[bank] = addrs.len() as i64;
            }
        }
    }

    pub fn record_alloc(&mut self, bank: BankIndex) {
        self.dynamic_alloc_count[bank] += 1;
    }

    pub fn has_weights(&self, bank: BankIndex) -> bool {
        self.static_weight_count.get(bank).is_some_and(|&c| c > 0)
    }

    pub fn max_weight_count(&self) -> i64 {
        self.static_weight_count.iter().copied().max().unwrap_or(0)
    }

    pub fn total_weight_count(&self) -> i64 {
        self.static_weight_count.iter().sum()
    }
}

/// The token -> bank assignment table plus the two counters every variant
/// reports.  The table is append-only: an allocated token keeps its bank for
/// the lifetime of the simulation.
#[derive(Debug, Default)]
pub struct AllocationTable {
    token_to_bank: BTreeMap<usize, BankIndex>,
    pub total_allocations: i64,
    pub total_conflicts: i64,
}

impl AllocationTable {
    pub fn record(&mut self, token_id: usize, bank: BankIndex, conflict: bool) {
        self.token_to_bank.insert(token_id, bank);
        self.total_allocations += 1;
        if conflict {
            self.total_conflicts += 1;
        }
    }

    pub fn bank_of(&self, token_id: usize) -> Option<BankIndex> {
        self.token_to_bank.get(&token_id).copied()
    }

    pub fn reset_stats(&mut self) {
        self.total_allocations = 0;
        self.total_conflicts = 0;
    }
}
