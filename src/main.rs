use clap::Parser;
use pimkv::base::behavior::ModuleBehaviors;
use pimkv::ui::{self, PimKvArgs};

pub fn main() {
    let argv = PimKvArgs::parse();
    let toml_string = ui::read_toml(&argv.config_path);

    let mut top = match ui::make_sim(&toml_string, Some(argv)) {
        Ok(top) => top,
        Err(err) => {
            eprintln!("failed to construct simulator: {}", err);
            std::process::exit(1);
        }
    };

    top.reset();
    top.run();
}
