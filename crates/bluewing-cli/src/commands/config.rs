//! Config command implementation.

use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Path => println!("{}", Config::path().display()),
        ConfigAction::Show => {
            let content =
                toml::to_string_pretty(config).context("Failed to serialize config")?;
            print!("{}", content);
        }
        ConfigAction::Init => {
            let path = Config::path();
            if path.exists() {
                println!("Config already exists: {}", path.display());
            } else {
                Config::default().save()?;
                println!("Wrote default config to {}", path.display());
            }
        }
    }
    Ok(())
}
