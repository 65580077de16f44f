use crate::error::ConfigError;
use crate::frontend::FrontendConfig;
use crate::mem::org::MemConfig;
use crate::policy::PolicyConfig;
use crate::sim::config::{Config, SimConfig};
use crate::sim::top::PimKvTop;
use clap::Parser;
use std::path::{Path, PathBuf};
use toml::Table;

#[derive(Parser)]
#[command(version, about)]
pub struct PimKvArgs {
    #[arg(help = "Path to config.toml")]
    pub config_path: PathBuf,
    #[arg(long, help = "Override trace path")]
    pub trace: Option<String>,
    #[arg(long, help = "Override KV cache policy variant")]
    pub policy: Option<String>,
    #[arg(long, help = "Override decoded token count")]
    pub num_tokens: Option<usize>,
    #[arg(long, help = "Enable or disable KV cache placement")]
    pub enable_kv_cache: Option<bool>,
    #[arg(long, help = "Override static weight trace path")]
    pub static_weights: Option<String>,
    #[arg(long, help = "Override log level (error|warn|info|debug|trace)")]
    pub log: Option<String>,
}

pub fn read_toml(filepath: &Path) -> String {
    std::fs::read_to_string(filepath).unwrap_or_else(|err| {
        eprintln!("failed to read config file {}: {}", filepath.display(), err);
        std::process::exit(1);
    })
}

pub fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Make a simulation top from the TOML configuration.
/// If `cli_args` is given, override TOML options with CLI arguments.
pub fn make_sim(toml_string: &str, cli_args: Option<PimKvArgs>) -> Result<PimKvTop, ConfigError> {
    let config_table: Table = toml::from_str(toml_string).expect("cannot parse config toml");
    let mut sim_config = SimConfig::from_section(config_table.get("sim"));
    let mem_config = MemConfig::from_section(config_table.get("mem"));
    let mut frontend_config = FrontendConfig::from_section(config_table.get("frontend"));
    let mut policy_config = PolicyConfig::from_section(config_table.get("policy"));

    // override toml configs with CLI args
    if let Some(args) = cli_args {
        frontend_config.path = args.trace.unwrap_or(frontend_config.path);
        frontend_config.num_tokens = args.num_tokens.unwrap_or(frontend_config.num_tokens);
        frontend_config.enable_kv_cache = args
            .enable_kv_cache
            .unwrap_or(frontend_config.enable_kv_cache);
        frontend_config.static_weight_trace_path = args
            .static_weights
            .unwrap_or(frontend_config.static_weight_trace_path);
        policy_config.policy_impl = args.policy.unwrap_or(policy_config.policy_impl);
        sim_config.log_level = args.log.unwrap_or(sim_config.log_level);
    }

    init_logging(&sim_config.log_level);
    PimKvTop::new(sim_config, mem_config, frontend_config, policy_config)
}
