//! The `config` command
//!
//! Prints the effective configuration (file plus defaults) as TOML, with the
//! connection password masked.

use anyhow::Result;
use clap::Args;

use crate::config::HarnessConfig;

/// Arguments for the config command
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Check the configuration and exit without printing it
    #[clap(long)]
    pub check: bool,
}

/// Execute the config command
pub fn execute(args: &ConfigArgs, config: &HarnessConfig) -> Result<Option<String>> {
    config.validate()?;
    if args.check {
        return Ok(None);
    }

    let mut shown = config.clone();
    if !shown.connection.password.is_empty() {
        shown.connection.password = "********".to_string();
    }
    shown.to_toml().map(Some)
}
