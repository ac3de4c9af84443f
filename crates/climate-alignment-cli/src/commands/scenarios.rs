use clap::Args;
use serde_json::Value;

use crate::input;

/// Arguments for listing available scenarios
#[derive(Args)]
pub struct ScenariosArgs {
    /// Path to the YAML settings file
    #[arg(long)]
    pub settings: String,
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let settings = input::read_settings(&args.settings)?;
    let bundle = input::load_bundle(&settings)?;
    let scenarios = bundle.available_scenarios();
    Ok(serde_json::to_value(scenarios)?)
}
