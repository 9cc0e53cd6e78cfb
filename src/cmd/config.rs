//! `mrpilot config`: show the tunables a run would use.

use std::path::Path;
use std::process::ExitCode;

use mrpilot::config::{CONFIG_FILE_NAME, Tunables};

pub fn cmd_config(path: Option<&Path>) -> ExitCode {
    let tunables = match Tunables::load(path) {
        Ok(tunables) => tunables,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };
    match toml::to_string_pretty(&tunables) {
        Ok(text) => {
            let source = path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| CONFIG_FILE_NAME.to_string());
            println!("# effective tunables ({})", source);
            print!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: failed to render tunables: {}", e);
            ExitCode::FAILURE
        }
    }
}
