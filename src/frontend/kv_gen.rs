use crate::frontend::config::FrontendConfig;
use crate::frontend::trace::{Opcode, Operation};
use crate::mem::org::{BankIndex, DramOrganization};
use crate::policy::KvCachePolicy;
use log::warn;
use std::sync::Arc;

/// Emits the memory operations of one autoregressive decoding step: reads of
/// every prior token's KV entry, then the placement and write-back of the new
/// token's entry.
///
/// The generator is a pure transformer from token id to operation stream; the
/// policy owns the allocation table.
pub struct KvTraceGenerator {
    org: Arc<DramOrganization>,
    head_dim: usize,
    hidden_dim: usize,
    block_size: usize,
    row_bytes: usize,
}

impl KvTraceGenerator {
    pub fn new(org: Arc<DramOrganization>, config: &FrontendConfig) -> Self {
        Self {
            org,
            head_dim: config.kv_head_dim,
            hidden_dim: config.kv_hidden_dim,
            block_size: config.kv_block_size,
            row_bytes: config.row_bytes.max(1),
        }
    }

    /// K and V activations of one token.
    pub fn kv_entry_bytes(&self) -> usize {
        self.head_dim * self.hidden_dim * 2 * std::mem::size_of::<f32>()
    }

    fn rows_for(&self, bytes: usize) -> usize {
        bytes.div_ceil(self.row_bytes)
    }

    /// One operation per row granule against the given bank, rows counted up
    /// from zero, column zero.
    fn bank_ops(&self, bank: BankIndex, op: Opcode, rows: usize) -> Vec<Operation> {
        let Some(base) = self.org.decompose(bank) else {
            warn!("bank {} outside the organization, dropping {} ops", bank, rows);
            return Vec::new();
        };
        let row_level = self.org.row_level();
        (0..rows)
            .map(|row| {
                let mut addr_vec = base.clone();
                addr_vec[row_level] = row as u64;
                Operation::new(op, addr_vec)
            })
            .collect()
    }

    /// Attention reads for step `current_token`: every previously allocated
    /// token's entry, in token order.  Tokens the policy does not know are
    /// skipped.
    pub fn generate_kv_cache_read(
        &self,
        current_token: usize,
        policy: &dyn KvCachePolicy,
    ) -> Vec<Operation> {
        let rows = self.rows_for(self.block_size);
        (0..current_token)
            .filter_map(|token| policy.get_kv_cache_bank(token))
            .flat_map(|bank| self.bank_ops(bank, Opcode::Read, rows))
            .collect()
    }

    /// Place the new token's entry through the policy and emit its writes.
    pub fn generate_kv_cache_write(
        &self,
        token_id: usize,
        policy: &mut dyn KvCachePolicy,
    ) -> Vec<Operation> {
        let bytes = self.kv_entry_bytes();
        let Some(bank) = policy.allocate_kv_cache_bank(bytes, token_id) else {
            warn!("KV allocation failed for token {}", token_id);
            return Vec::new();
        };
        self.bank_ops(bank, Opcode::Write, self.rows_for(bytes))
    }

    /// Full decoding step `token_id`: prior-token reads, then the new entry's
    /// allocation and writes.
    pub fn generate_inference_step(
        &self,
        token_id: usize,
        policy: &mut dyn KvCachePolicy,
    ) -> Vec<Operation> {
        let mut ops = self.generate_kv_cache_read(token_id, policy);
        ops.extend(self.generate_kv_cache_write(token_id, policy));
        ops
    }
}
