use crate::base::behavior::*;
use crate::base::module::IsModule;
use crate::base::port::link;
use crate::error::ConfigError;
use crate::frontend::codegen::TiledCodeGen;
use crate::frontend::{FrontendConfig, KvAwareTraceFrontend};
use crate::mem::org::{DramOrganization, MemConfig};
use crate::mem::system::BankedMemory;
use crate::policy::{build_policy, PolicyConfig};
use crate::sim::config::SimConfig;
use log::{info, warn};
use std::sync::Arc;

/// Simulation top: the frontend driving the banked memory over one linked
/// operation channel.  The frontend runs once every `clock_ratio` memory
/// ticks.
pub struct PimKvTop {
    pub frontend: KvAwareTraceFrontend,
    pub memory: BankedMemory,
    cycle: u64,
    timeout: u64,
    clock_ratio: u64,
    stats_path: String,
}

impl PimKvTop {
    pub fn new(
        sim_config: SimConfig,
        mem_config: MemConfig,
        frontend_config: FrontendConfig,
        policy_config: PolicyConfig,
    ) -> Result<PimKvTop, ConfigError> {
        let org = Arc::new(DramOrganization::new(&mem_config));
        let mut memory = BankedMemory::new(Arc::new(mem_config), Arc::clone(&org));

        let policy = build_policy(&Arc::new(policy_config))?;
        let frontend_config = Arc::new(frontend_config);
        let mut frontend = KvAwareTraceFrontend::new(Arc::clone(&frontend_config), policy)?;

        link(
            &mut memory.state_mut().req_in,
            &mut frontend.state_mut().mem_req,
        );
        let codegen = TiledCodeGen::new(Arc::clone(&org));
        frontend.connect(org, &codegen);

        Ok(PimKvTop {
            frontend,
            memory,
            cycle: 0,
            timeout: sim_config.timeout,
            clock_ratio: frontend_config.clock_ratio.max(1),
            stats_path: sim_config.stats_path,
        })
    }

    /// Stream exhausted and the back-end drained.
    pub fn finished(&self) -> bool {
        self.frontend.finished() && self.memory.finished()
    }

    /// Tick until the run completes or times out, then report.  Returns the
    /// memory cycle count.
    pub fn run(&mut self) -> u64 {
        while !self.finished() && self.cycle < self.timeout {
            self.tick_one();
        }
        if !self.finished() {
            warn!("simulation timed out after {} cycles", self.cycle);
        }
        self.finalize();
        self.memory.cycles()
    }

    /// Always runs, reporting whatever statistics were accumulated.
    pub fn finalize(&self) {
        self.frontend.finalize();
        info!("memory_system_cycles: {}", self.memory.cycles());

        if !self.stats_path.is_empty() {
            if let Err(err) = self.write_stats() {
                warn!("could not write run summary to {}: {}", self.stats_path, err);
            }
        }
    }

    fn write_stats(&self) -> std::io::Result<()> {
        let counters = |stats: Vec<(&'static str, i64)>| -> serde_json::Map<String, serde_json::Value> {
            stats
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.into()))
                .collect()
        };
        let summary = serde_json::json!({
            "policy": {
                "impl": self.frontend.policy().name(),
                "counters": counters(self.frontend.policy().stats()),
            },
            "bank_conflicts": self
                .frontend
                .tracker()
                .map(|tracker| counters(tracker.stats())),
            "conflict_rate_percent": self.frontend.conflict_rate_percent(),
            "memory_system_cycles": self.memory.cycles(),
        });
        std::fs::write(&self.stats_path, serde_json::to_string_pretty(&summary)?)
    }
}

impl ModuleBehaviors for PimKvTop {
    fn tick_one(&mut self) {
        self.cycle += 1;
        if self.cycle % self.clock_ratio == 0 {
            self.frontend.tick_one();
        }
        self.memory.tick_one();
    }

    fn reset(&mut self) {
        self.cycle = 0;
        self.frontend.reset();
        self.memory.reset();
    }
}
