mod commands;
mod config;
mod dism;
mod elevation;
mod error;
mod logging;
mod models;
mod report;
mod sys;

use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

pub use commands::{execute, Cli, Command, Outcome};
pub use config::{AppPaths, Settings};
pub use dism::Dism;
pub use elevation::{relaunch_elevated, Privilege};
pub use error::{AppError, Result};
pub use logging::{init_tracing, OpsLogger};
pub use models::{
    FeatureDetail, FeatureState, FeatureSummary, HealthReport, ImageRecord, PropertyNode,
    PropertyTree, WimImageInfo,
};
pub use report::{
    parse_feature_info, parse_feature_list, parse_image_info, parse_languages, parse_size,
    parse_timestamp, parse_wim_listing,
};
pub use sys::{run_command, CommandOutput, CommandRunner, SystemRunner};

/// Entry point of the `dism-kit` binary.
pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    }
    .with_overrides(cli.dism.clone(), cli.log_dir.clone());
    let _guard = init_tracing(&settings)?;

    let privilege = Privilege::current();
    if !privilege.is_admin() && cli.elevate {
        relaunch_elevated()?;
        info!("elevated instance started, exiting");
        return Ok(ExitCode::SUCCESS);
    }

    let ops = settings
        .paths()
        .map(|paths| OpsLogger::for_paths(&paths))
        .transpose()?;

    let dism = Dism::new(privilege).program(&settings.dism_path);
    let action = cli.command.action();
    let outcome = match execute(&dism, &cli.command) {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(ops) = &ops {
                ops.log_line(action, format!("error={err}"))?;
            }
            return Err(err.into());
        }
    };
    if let Some(ops) = &ops {
        ops.log_line(action, outcome.summary())?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print!("{outcome}");
    }
    if outcome.is_failure() {
        warn!("{action} did not report success");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
