use crate::error::ConfigError;
use crate::mem::org::AddrVec;
use phf::phf_map;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    #[default]
    Read,
    Write,
    Compute,
    SubarrayRead,
    SubarrayWrite,
    BankRead,
    BankWrite,
    /// Placeholder for an unexpanded kernel block; its single address slot
    /// carries the kernel index.
    Kernel,
}

/// Trace line heads of plain memory operations.  `conv2d`/`gemm`/`end` frame
/// kernel blocks and are handled by the parser itself.
static OPCODES: phf::Map<&'static str, Opcode> = phf_map! {
    "R" => Opcode::Read,
    "W" => Opcode::Write,
    "C" => Opcode::Compute,
    "SR" => Opcode::SubarrayRead,
    "SW" => Opcode::SubarrayWrite,
    "BR" => Opcode::BankRead,
    "BW" => Opcode::BankWrite,
};

impl Opcode {
    pub fn label(self) -> &'static str {
        match self {
            Opcode::Read => "read",
            Opcode::Write => "write",
            Opcode::Compute => "compute",
            Opcode::SubarrayRead => "subarray-read",
            Opcode::SubarrayWrite => "subarray-write",
            Opcode::BankRead => "bank-read",
            Opcode::BankWrite => "bank-write",
            Opcode::Kernel => "kernel",
        }
    }

    pub fn is_store(self) -> bool {
        matches!(self, Opcode::Write | Opcode::SubarrayWrite | Opcode::BankWrite)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Operation {
    pub op: Opcode,
    pub addr_vec: AddrVec,
}

impl Operation {
    pub fn new(op: Opcode, addr_vec: AddrVec) -> Self {
        Self { op, addr_vec }
    }
}

/// Parsed symbolic form of one matmul/convolution: the framing line followed
/// by the free-form body lines, tokenized.  The body is interpreted by the
/// kernel code generator, not by the trace loader.
#[derive(Debug, Default, Clone)]
pub struct KernelDescriptor {
    pub lines: Vec<Vec<String>>,
}

impl KernelDescriptor {
    pub fn kind(&self) -> &str {
        self.lines
            .first()
            .and_then(|line| line.first())
            .map_or("", String::as_str)
    }

    /// The numeric tokens of the framing line, in order.
    pub fn head_dims(&self) -> Vec<u64> {
        self.lines.first().map_or_else(Vec::new, |line| {
            line.iter().filter_map(|t| t.parse().ok()).collect()
        })
    }
}

#[derive(Debug, Default)]
pub struct LoadedTrace {
    pub ops: Vec<Operation>,
    pub kernels: Vec<KernelDescriptor>,
}

/// Parse the high-level input trace.  Plain op lines become `Operation`s;
/// `conv2d`/`gemm` ... `end` blocks accumulate a `KernelDescriptor` and leave
/// a synthetic `kernel` op in their place.  Malformed lines are fatal.
pub fn load_trace(path: &Path) -> Result<LoadedTrace, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::TraceOpen {
        path: path.to_path_buf(),
        source,
    })?;

    let format_err = |line: usize, reason: String| ConfigError::TraceFormat {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut trace = LoadedTrace::default();
    let mut kernel_body: Vec<Vec<String>> = Vec::new();
    let mut in_kernel = false;

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let lineno = idx + 1;
        let line = line.map_err(|source| ConfigError::TraceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }

        let head = tokens[0];
        if let Some(&op) = OPCODES.get(head) {
            let addr_field = tokens
                .get(1)
                .ok_or_else(|| format_err(lineno, "missing address vector".to_string()))?;
            let addr_vec = parse_addr_vec(addr_field)
                .ok_or_else(|| format_err(lineno, format!("bad address vector `{addr_field}`")))?;
            trace.ops.push(Operation::new(op, addr_vec));
        } else if head == "conv2d" || head == "gemm" {
            in_kernel = true;
            kernel_body.clear();
            kernel_body.push(tokens.iter().map(|t| t.to_string()).collect());
        } else if head == "end" {
            if !in_kernel {
                return Err(format_err(lineno, "`end` outside a kernel block".to_string()));
            }
            in_kernel = false;
            trace.kernels.push(KernelDescriptor {
                lines: std::mem::take(&mut kernel_body),
            });
            let kernel_idx = (trace.kernels.len() - 1) as u64;
            trace
                .ops
                .push(Operation::new(Opcode::Kernel, vec![kernel_idx]));
        } else if in_kernel {
            kernel_body.push(tokens.iter().map(|t| t.to_string()).collect());
        } else {
            return Err(format_err(lineno, format!("unrecognized opcode `{head}`")));
        }
    }

    Ok(trace)
}

fn parse_addr_vec(field: &str) -> Option<AddrVec> {
    field
        .split(',')
        .map(|t| t.trim().parse::<u64>().ok())
        .collect()
}
