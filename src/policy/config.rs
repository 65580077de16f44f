use crate::sim::config::Config;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PolicyConfig {
    /// Variant name: Naive, BankPartitioning, ContentionAware, SmartLocality.
    #[serde(rename = "impl")]
    pub policy_impl: String,

    /// BankPartitioning: size of the reserved KV range; defaults to a quarter
    /// of the bank space at init.
    pub kv_cache_banks_count: Option<usize>,
    /// BankPartitioning: first bank of the reserved range.
    pub kv_cache_banks_start: usize,

    /// ContentionAware / SmartLocality: KV entries a bank may take before the
    /// scan moves on.
    pub max_kv_per_bank: i64,

    /// SmartLocality: strength of the co-locality bonus, in [0, 1].
    pub locality_weight: f64,
    /// SmartLocality: banks below this activity percentage count as cold.
    pub activity_threshold_percent: i64,
}

impl Config for PolicyConfig {}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            policy_impl: "Naive".to_string(),
            kv_cache_banks_count: None,
            kv_cache_banks_start: 0,
            max_kv_per_bank: 3,
            locality_weight: 0.3,
            activity_threshold_percent: 10,
        }
    }
}
