use crate::frontend::trace::{KernelDescriptor, Opcode, Operation};
use crate::mem::org::DramOrganization;
use std::sync::Arc;

/// Kernel code generation: lowers one symbolic matmul/convolution descriptor
/// into an ordered sequence of bank operations.  The production generator is
/// an external collaborator; the frontend only depends on this call.
pub trait PimCodeGen {
    fn codegen_kernel(&self, kernel: &KernelDescriptor, out: &mut Vec<Operation>);
}

const TILE: u64 = 16;

/// Reference generator: a deterministic tiled lowering that stages one weight
/// tile per output tile, streams bank-read/compute pairs over the reduction
/// dimension, and drains the accumulator.  Output tiles stripe across banks,
/// spilling to the next row once every bank holds a tile.
pub struct TiledCodeGen {
    org: Arc<DramOrganization>,
}

impl TiledCodeGen {
    pub fn new(org: Arc<DramOrganization>) -> Self {
        Self { org }
    }

    fn emit(&self, bank: usize, row: u64, op: Opcode, out: &mut Vec<Operation>) {
        if let Some(mut addr_vec) = self.org.decompose(bank) {
            addr_vec[self.org.row_level()] = row;
            out.push(Operation::new(op, addr_vec));
        }
    }

    /// Problem dimensions (m, k, n) from the framing line.  Convolutions and
    /// underspecified descriptors fall back to a square default.
    fn problem_dims(kernel: &KernelDescriptor) -> (u64, u64, u64) {
        let dims = kernel.head_dims();
        let m = dims.first().copied().unwrap_or(64).max(1);
        let k = dims.get(1).copied().unwrap_or(m).max(1);
        let n = dims.get(2).copied().unwrap_or(k).max(1);
        (m, k, n)
    }
}

impl PimCodeGen for TiledCodeGen {
    fn codegen_kernel(&self, kernel: &KernelDescriptor, out: &mut Vec<Operation>) {
        let (m, k, n) = Self::problem_dims(kernel);
        let tiles_m = m.div_ceil(TILE);
        let tiles_n = n.div_ceil(TILE);
        let tiles_k = k.div_ceil(TILE);

        let num_banks = self.org.num_banks() as u64;
        let num_rows = self.org.count()[self.org.row_level()];

        for tile in 0..tiles_m * tiles_n {
            let bank = (tile % num_banks) as usize;
            let row = (tile / num_banks) % num_rows;

            // Stage the weight tile, then accumulate over the reduction dim.
            self.emit(bank, row, Opcode::Write, out);
            for _ in 0..tiles_k {
                self.emit(bank, row, Opcode::BankRead, out);
                self.emit(bank, row, Opcode::Compute, out);
            }
            self.emit(bank, row, Opcode::SubarrayWrite, out);
            self.emit(bank, row, Opcode::Read, out);
        }
    }
}
