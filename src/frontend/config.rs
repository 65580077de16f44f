use crate::sim::config::Config;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FrontendConfig {
    /// Path to the high-level load/store trace.  Required.
    pub path: String,
    /// Frontend ticks per memory tick.  Required.
    pub clock_ratio: u64,

    pub enable_kv_cache: bool,
    /// Upstream layout trace with the offline weight placement; empty means
    /// no prior knowledge and the live fallback applies.
    pub static_weight_trace_path: String,
    /// Tokens to decode when KV cache is enabled.
    pub num_tokens: usize,
    /// Kernel ops interleaved after each token's KV traffic; 0 produces a
    /// pure KV stream.
    pub kernel_slice_ops_per_token: usize,

    pub kv_head_dim: usize,
    pub kv_hidden_dim: usize,
    /// Bytes of one token's KV entry read back per attention step.
    pub kv_block_size: usize,
    /// Row granule used to split KV transfers into per-row operations.
    pub row_bytes: usize,

    /// Safety ceiling on the flat kernel-op buffer.
    pub max_expanded_ops: usize,
}

impl Config for FrontendConfig {}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            path: "".to_string(),
            clock_ratio: 0,
            enable_kv_cache: false,
            static_weight_trace_path: "".to_string(),
            num_tokens: 512,
            kernel_slice_ops_per_token: 5000,
            kv_head_dim: 128,
            kv_hidden_dim: 4096,
            kv_block_size: 4096,
            row_bytes: 8192,
            max_expanded_ops: 5_000_000,
        }
    }
}
