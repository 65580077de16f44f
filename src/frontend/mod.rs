use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::base::port::{OutputPort, Port};
use crate::error::ConfigError;
use crate::mem::conflict::BankConflictTracker;
use crate::mem::org::DramOrganization;
use crate::policy::KvCachePolicy;
use log::{debug, info, warn};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

pub mod codegen;
pub mod config;
pub mod kv_gen;
pub mod trace;
pub mod weights;


pub use config::FrontendConfig;

use codegen::PimCodeGen;
use kv_gen::KvTraceGenerator;
use trace::{KernelDescriptor, Opcode, Operation};
use weights::StaticWeightMap;

/// Synthetic signatures injected per writing bank when the live weight map
/// substitutes for a missing layout file, so per-bank weight counters are
/// decisively non-zero.
const SYNTHETIC_SIGNATURES: u64 = 100;
const SYNTHETIC_BASE: u64 = 1 << 48;

const PROGRESS_INTERVAL: usize = 10_000_000;

/// Provenance of a stream entry; decides which side of the conflict ledger an
/// operation lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamClass {
    /// Emitted by the KV trace generator.
    KvCache,
    /// Produced by kernel expansion.
    KernelWeight,
    /// Plain op carried over from the input trace.
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub class: StreamClass,
    pub op: Operation,
}

pub struct FrontendState {
    trace: Vec<Operation>,
    kernels: Vec<KernelDescriptor>,
    stream: Vec<StreamEntry>,
    cursor: usize,
    policy: Box<dyn KvCachePolicy>,
    tracker: Option<BankConflictTracker>,
    org: Option<Arc<DramOrganization>>,
    pub mem_req: Port<OutputPort, Operation>,
}

/// Trace frontend with KV cache placement awareness.
///
/// Lifecycle: `new` parses the high-level trace; `connect` binds the DRAM
/// organization, runs the static weight loader, expands kernels through the
/// code generator and synthesizes the interleaved per-token stream; `tick_one`
/// then offers one operation per tick to the memory port, retrying refused
/// sends, until the cursor runs out.
pub struct KvAwareTraceFrontend {
    base: ModuleBase<FrontendState, FrontendConfig>,
}

module!(KvAwareTraceFrontend, FrontendState, FrontendConfig,);

impl KvAwareTraceFrontend {
    pub fn new(
        config: Arc<FrontendConfig>,
        policy: Box<dyn KvCachePolicy>,
    ) -> Result<Self, ConfigError> {
        if config.path.is_empty() {
            return Err(ConfigError::MissingParameter("frontend.path"));
        }
        if config.clock_ratio == 0 {
            return Err(ConfigError::MissingParameter("frontend.clock_ratio"));
        }

        info!("loading trace file {} ...", config.path);
        let loaded = trace::load_trace(Path::new(&config.path))?;
        info!(
            "loaded {} lines, {} kernel blocks",
            loaded.ops.len(),
            loaded.kernels.len()
        );

        let state = FrontendState {
            trace: loaded.ops,
            kernels: loaded.kernels,
            stream: Vec::new(),
            cursor: 0,
            policy,
            tracker: None,
            org: None,
            mem_req: Port::new(),
        };
        let mut me = KvAwareTraceFrontend {
            base: ModuleBase::with_state(state),
        };
        me.init_conf(config);
        Ok(me)
    }

    /// Bind the memory organization and materialize the operation stream.
    pub fn connect(&mut self, org: Arc<DramOrganization>, codegen: &dyn PimCodeGen) {
        let config = Arc::clone(
            self.base
                .config
                .get()
                .expect("config not found, was `init_conf` called in `new`?"),
        );
        let num_banks = org.num_banks();

        let mut weight_map = StaticWeightMap::new();
        if config.enable_kv_cache {
            if !config.static_weight_trace_path.is_empty() {
                weight_map = weights::extract_weight_banks(
                    Path::new(&config.static_weight_trace_path),
                    num_banks,
                );
                info!(
                    "loaded static weight mapping for {} banks from {}",
                    weight_map.len(),
                    config.static_weight_trace_path
                );
            }
            let state = self.state_mut();
            state.policy.init(num_banks, &weight_map);
            state.tracker = Some(BankConflictTracker::new(num_banks));
            info!("KV cache policy initialized with {} banks", num_banks);
        }

        let (flat, ranges) = {
            let state = self.state();
            expand_kernels(
                &state.trace,
                &state.kernels,
                codegen,
                config.max_expanded_ops,
            )
        };

        if config.enable_kv_cache {
            if weight_map.is_empty() {
                // No prior layout knowledge: fall back to the occupancy the
                // kernel expansion itself writes.
                let mut live = derive_live_weight_map(&flat, &org);
                if live.is_empty() {
                    warn!("no weight layout available, policies run blind");
                } else {
                    pad_synthetic_signatures(&mut live);
                    info!("substituted live weight map covering {} banks", live.len());
                    weight_map = live;
                }
            }
            self.state_mut().policy.set_static_weight_mapping(&weight_map);
        }

        self.synthesize_stream(&config, &org, flat, ranges);
        self.state_mut().org = Some(org);
    }

    fn synthesize_stream(
        &mut self,
        config: &FrontendConfig,
        org: &Arc<DramOrganization>,
        flat: Vec<Operation>,
        ranges: Vec<Range<usize>>,
    ) {
        let slice = config.kernel_slice_ops_per_token;
        let mut stream = Vec::new();

        if config.enable_kv_cache && config.num_tokens > 0 {
            // The interleaved stream carries KV ops and kernel slices only;
            // standalone trace ops model the same traffic the slices already
            // replay and stay out of the decode loop.
            let generator = KvTraceGenerator::new(Arc::clone(org), config);
            let state = self.state_mut();
            for token in 0..config.num_tokens {
                for op in generator.generate_inference_step(token, state.policy.as_mut()) {
                    stream.push(StreamEntry {
                        class: StreamClass::KvCache,
                        op,
                    });
                }
                if slice > 0 && !flat.is_empty() {
                    let offset = (token * slice) % flat.len();
                    for i in 0..slice {
                        stream.push(StreamEntry {
                            class: StreamClass::KernelWeight,
                            op: flat[(offset + i) % flat.len()].clone(),
                        });
                    }
                }
            }
        } else {
            // No decode loop: the stream is the input trace with each kernel
            // op expanded in place.
            let state = self.state();
            for op in &state.trace {
                if op.op == Opcode::Kernel {
                    let idx = op.addr_vec[0] as usize;
                    for kernel_op in &flat[ranges[idx].clone()] {
                        stream.push(StreamEntry {
                            class: StreamClass::KernelWeight,
                            op: kernel_op.clone(),
                        });
                    }
                } else {
                    stream.push(StreamEntry {
                        class: StreamClass::Passthrough,
                        op: op.clone(),
                    });
                }
            }
        }

        info!("synthesized stream of {} operations", stream.len());
        let state = self.state_mut();
        state.stream = stream;
        state.cursor = 0;
    }

    /// All stream operations offered to the memory port.
    pub fn finished(&self) -> bool {
        self.state().cursor >= self.state().stream.len()
    }

    pub fn policy(&self) -> &dyn KvCachePolicy {
        self.state().policy.as_ref()
    }

    pub fn tracker(&self) -> Option<&BankConflictTracker> {
        self.state().tracker.as_ref()
    }

    pub fn policy_stat(&self, name: &str) -> i64 {
        self.policy()
            .stats()
            .iter()
            .find(|(k, _)| *k == name)
            .map_or(0, |(_, v)| *v)
    }

    pub fn conflict_rate_percent(&self) -> f64 {
        let allocations = self.policy_stat("total_allocations");
        if allocations == 0 {
            return 0.0;
        }
        self.policy_stat("total_conflicts") as f64 * 100.0 / allocations as f64
    }

    /// Report the accumulated statistics.  Always safe to call; reporting is
    /// only meaningful for KV-enabled runs.
    pub fn finalize(&self) {
        if !self.conf().enable_kv_cache {
            return;
        }
        info!("KV cache policy ({}) statistics:", self.policy().name());
        for (name, value) in self.policy().stats() {
            info!("  {}: {}", name, value);
        }
        if let Some(tracker) = self.tracker() {
            info!("bank conflict statistics:");
            for (name, value) in tracker.stats() {
                info!("  {}: {}", name, value);
            }
            for event in tracker.history().iter().take(8) {
                debug!(
                    "conflict {} at bank {} cycle {}",
                    event.kind.label(),
                    event.bank,
                    event.cycle
                );
            }
        }
        info!("conflict_rate_percent: {:.2}", self.conflict_rate_percent());
    }

    #[cfg(test)]
    pub(crate) fn stream(&self) -> &[StreamEntry] {
        &self.state().stream
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> usize {
        self.state().cursor
    }
}

impl ModuleBehaviors for KvAwareTraceFrontend {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
        let cycle = self.base.cycle;
        let state = &mut self.base.state;

        let Some(entry) = state.stream.get(state.cursor) else {
            return;
        };
        if !state.mem_req.put(&entry.op) {
            // Back-end refused the send; re-offer the same op next tick.
            return;
        }
        if let (Some(tracker), Some(org)) = (state.tracker.as_mut(), state.org.as_ref()) {
            register_entry(tracker, org, entry, cycle);
        }
        state.cursor += 1;
        if state.cursor % PROGRESS_INTERVAL == 0 {
            info!("sent {} / {} operations", state.cursor, state.stream.len());
        }
    }

    fn reset(&mut self) {
        self.base.cycle = 0;
        self.base.state.cursor = 0;
    }
}

/// Expand every kernel op through the code generator into one flat buffer,
/// bounded by the safety ceiling.  Returns the buffer and each kernel's range
/// within it.
fn expand_kernels(
    trace: &[Operation],
    kernels: &[KernelDescriptor],
    codegen: &dyn PimCodeGen,
    max_ops: usize,
) -> (Vec<Operation>, Vec<Range<usize>>) {
    let mut flat = Vec::new();
    let mut ranges = vec![0..0; kernels.len()];
    let mut truncated = false;

    for op in trace.iter().filter(|op| op.op == Opcode::Kernel) {
        let idx = op.addr_vec[0] as usize;
        if truncated {
            ranges[idx] = flat.len()..flat.len();
            continue;
        }
        let start = flat.len();
        codegen.codegen_kernel(&kernels[idx], &mut flat);
        if flat.len() > max_ops {
            warn!(
                "kernel expansion exceeded the {} op ceiling, truncating",
                max_ops
            );
            flat.truncate(max_ops);
            truncated = true;
        }
        ranges[idx] = start..flat.len();
        info!(
            "kernel {} ({}): {} ops",
            idx,
            kernels[idx].kind(),
            flat.len() - start
        );
    }
    (flat, ranges)
}

/// Bank occupancy observed from the expanded kernel stream: every write to a
/// valid bank contributes a signature.
fn derive_live_weight_map(flat: &[Operation], org: &DramOrganization) -> StaticWeightMap {
    let mut map = StaticWeightMap::new();
    for op in flat.iter().filter(|op| op.op == Opcode::Write) {
        if let Some(bank) = org.bank_of(&op.addr_vec) {
            map.entry(bank)
                .or_default()
                .insert(address_signature(&op.addr_vec));
        }
    }
    map
}

fn pad_synthetic_signatures(map: &mut StaticWeightMap) {
    for addrs in map.values_mut() {
        for i in 0..SYNTHETIC_SIGNATURES {
            addrs.insert(SYNTHETIC_BASE | i);
        }
    }
}

/// Compact per-op signature: the leading coordinates packed 16 bits each.
fn address_signature(addr_vec: &[u64]) -> u64 {
    addr_vec
        .iter()
        .take(4)
        .fold(0, |acc, &coord| (acc << 16) | (coord & 0xFFFF))
}

fn register_entry(
    tracker: &mut BankConflictTracker,
    org: &DramOrganization,
    entry: &StreamEntry,
    cycle: u64,
) {
    let Some(bank) = org.bank_of(&entry.op.addr_vec) else {
        return;
    };
    let addr = address_signature(&entry.op.addr_vec);
    match entry.class {
        StreamClass::KvCache => tracker.register_kv_cache_operation(bank, addr, cycle),
        StreamClass::KernelWeight | StreamClass::Passthrough => {
            // Writes and compute ops pin weight state onto a bank; reads are
            // ambiguous without metadata and stay unattributed.
            if matches!(entry.op.op, Opcode::Write | Opcode::Compute) {
                tracker.register_weight_operation(bank, addr, cycle);
            }
        }
    }
}
