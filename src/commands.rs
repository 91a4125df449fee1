use std::fmt;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::{
    dism::Dism,
    error::Result,
    models::{
        FeatureDetail, FeatureSummary, HealthReport, ImageRecord, PropertyNode, PropertyTree,
        WimImageInfo,
    },
    sys::{CommandOutput, CommandRunner},
};

#[derive(Debug, Parser)]
#[command(name = "dism-kit", version, about = "Run DISM and print its reports as text or JSON")]
pub struct Cli {
    /// JSON settings file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// DISM executable to run.
    #[arg(long, global = true)]
    pub dism: Option<PathBuf>,
    /// Directory for ops.log and diagnostic logs.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
    /// Relaunch elevated when not running as administrator.
    #[arg(long, global = true)]
    pub elevate: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check whether the component store is flagged as corrupted.
    CheckHealth,
    /// Scan the component store for corruption.
    ScanHealth,
    /// Repair the component store.
    RestoreHealth {
        /// Repair source instead of Windows Update.
        #[arg(long)]
        source: Option<String>,
        /// Do not fall back to Windows Update.
        #[arg(long, requires = "source")]
        limit_access: bool,
    },
    /// List the images in a WIM/ESD file.
    ListImages { wim: PathBuf },
    /// Show details for one image.
    ImageInfo {
        wim: PathBuf,
        #[arg(long, default_value_t = 1)]
        index: u32,
    },
    Mount {
        wim: PathBuf,
        dir: PathBuf,
        #[arg(long, default_value_t = 1)]
        index: u32,
        /// Mount writable instead of read-only.
        #[arg(long)]
        read_write: bool,
    },
    Unmount {
        dir: PathBuf,
        /// Save changes instead of discarding them.
        #[arg(long)]
        commit: bool,
    },
    AddPackage { dir: PathBuf, package: PathBuf },
    RemovePackage { dir: PathBuf, name: String },
    AddDriver { dir: PathBuf, driver: PathBuf },
    RemoveDriver { dir: PathBuf, driver: String },
    /// Capture a directory into a WIM file.
    Capture { wim: PathBuf, dir: PathBuf, name: String },
    /// Apply an image to a directory.
    Apply {
        wim: PathBuf,
        dir: PathBuf,
        #[arg(long, default_value_t = 1)]
        index: u32,
    },
    /// List optional features of the running system.
    Features,
    FeatureInfo { name: String },
    EnableFeature {
        name: String,
        /// Enable parent features too.
        #[arg(long)]
        all: bool,
    },
    DisableFeature { name: String },
}

impl Command {
    /// Name written to the operations log.
    pub fn action(&self) -> &'static str {
        match self {
            Command::CheckHealth => "check-health",
            Command::ScanHealth => "scan-health",
            Command::RestoreHealth { .. } => "restore-health",
            Command::ListImages { .. } => "list-images",
            Command::ImageInfo { .. } => "image-info",
            Command::Mount { .. } => "mount",
            Command::Unmount { .. } => "unmount",
            Command::AddPackage { .. } => "add-package",
            Command::RemovePackage { .. } => "remove-package",
            Command::AddDriver { .. } => "add-driver",
            Command::RemoveDriver { .. } => "remove-driver",
            Command::Capture { .. } => "capture",
            Command::Apply { .. } => "apply",
            Command::Features => "features",
            Command::FeatureInfo { .. } => "feature-info",
            Command::EnableFeature { .. } => "enable-feature",
            Command::DisableFeature { .. } => "disable-feature",
        }
    }
}

/// Result of one subcommand, printable as text or JSON.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Success { success: bool },
    Health(HealthReport),
    Images(Vec<WimImageInfo>),
    Image(Box<ImageRecord>),
    Features(Vec<FeatureSummary>),
    Feature(FeatureDetail),
    Command(CommandOutput),
}

impl Outcome {
    /// Whether the binary should exit non-zero for this result.
    pub fn is_failure(&self) -> bool {
        match self {
            Outcome::Success { success } => !success,
            Outcome::Health(h) => !h.completed,
            Outcome::Command(out) => !out.succeeded(),
            _ => false,
        }
    }

    /// Short summary for the operations log.
    pub fn summary(&self) -> String {
        match self {
            Outcome::Success { success } => format!("success={success}"),
            Outcome::Health(h) => format!(
                "corruption_detected={} completed={}",
                h.corruption_detected, h.completed
            ),
            Outcome::Images(images) => format!("images={}", images.len()),
            Outcome::Image(image) => format!("index={}", image.index),
            Outcome::Features(features) => format!("features={}", features.len()),
            Outcome::Feature(f) => format!("feature={}", f.name.as_deref().unwrap_or("?")),
            Outcome::Command(out) => match out.exit_code {
                Some(code) => format!("exit={code}"),
                None => "exit=none".into(),
            },
        }
    }
}

pub fn execute<R: CommandRunner>(dism: &Dism<R>, command: &Command) -> Result<Outcome> {
    let outcome = match command {
        Command::CheckHealth => Outcome::Success {
            success: dism.check_health()?,
        },
        Command::ScanHealth => Outcome::Health(dism.scan_health()?),
        Command::RestoreHealth {
            source,
            limit_access,
        } => {
            let success = match source {
                Some(source) => dism.restore_health_from(source, *limit_access)?,
                None => dism.restore_health()?,
            };
            Outcome::Success { success }
        }
        Command::ListImages { wim } => Outcome::Images(dism.list_images(wim)?),
        Command::ImageInfo { wim, index } => {
            Outcome::Image(Box::new(dism.image_info(wim, *index)?))
        }
        Command::Mount {
            wim,
            dir,
            index,
            read_write,
        } => Outcome::Command(dism.mount_wim(wim, dir, *index, !*read_write)?),
        Command::Unmount { dir, commit } => Outcome::Command(dism.unmount_wim(dir, *commit)?),
        Command::AddPackage { dir, package } => Outcome::Command(dism.add_package(dir, package)?),
        Command::RemovePackage { dir, name } => {
            Outcome::Command(dism.remove_package(dir, name)?)
        }
        Command::AddDriver { dir, driver } => Outcome::Command(dism.add_driver(dir, driver)?),
        Command::RemoveDriver { dir, driver } => {
            Outcome::Command(dism.remove_driver(dir, driver)?)
        }
        Command::Capture { wim, dir, name } => Outcome::Success {
            success: dism.capture_image(wim, dir, name)?,
        },
        Command::Apply { wim, dir, index } => Outcome::Success {
            success: dism.apply_image(wim, *index, dir)?,
        },
        Command::Features => Outcome::Features(dism.features()?),
        Command::FeatureInfo { name } => Outcome::Feature(dism.feature_info(name)?),
        Command::EnableFeature { name, all } => Outcome::Success {
            success: dism.enable_feature(name, *all)?,
        },
        Command::DisableFeature { name } => Outcome::Success {
            success: dism.disable_feature(name)?,
        },
    };
    Ok(outcome)
}

fn opt(value: &Option<impl fmt::Display>) -> String {
    value
        .as_ref()
        .map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn write_properties(f: &mut fmt::Formatter<'_>, tree: &PropertyTree, prefix: &str) -> fmt::Result {
    for (key, node) in tree.iter() {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}\\{key}")
        };
        match node {
            PropertyNode::Value(v) => writeln!(f, "  {path} : {v}")?,
            PropertyNode::Branch(next) => write_properties(f, next, &path)?,
        }
    }
    Ok(())
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success { success } => {
                writeln!(f, "{}", if *success { "succeeded" } else { "failed" })
            }
            Outcome::Health(h) => {
                writeln!(f, "corruption detected : {}", h.corruption_detected)?;
                writeln!(f, "completed           : {}", h.completed)
            }
            Outcome::Images(images) => {
                for image in images {
                    writeln!(
                        f,
                        "{:>3}  {}  {} bytes",
                        image.index,
                        image.name,
                        opt(&image.size)
                    )?;
                }
                Ok(())
            }
            Outcome::Image(r) => {
                writeln!(f, "Index        : {}", r.index)?;
                writeln!(f, "Name         : {}", opt(&r.name))?;
                writeln!(f, "Description  : {}", opt(&r.description))?;
                writeln!(f, "Size         : {}", opt(&r.size))?;
                writeln!(f, "Bootable     : {}", opt(&r.bootable))?;
                writeln!(f, "Architecture : {}", opt(&r.architecture))?;
                writeln!(f, "Version      : {}", opt(&r.version))?;
                writeln!(f, "Edition      : {}", opt(&r.edition))?;
                writeln!(f, "Installation : {}", opt(&r.installation))?;
                writeln!(f, "Directories  : {}", opt(&r.directories))?;
                writeln!(f, "Files        : {}", opt(&r.files))?;
                writeln!(f, "Created      : {}", opt(&r.created))?;
                writeln!(f, "Modified     : {}", opt(&r.modified))?;
                writeln!(f, "Languages    : {}", r.languages.join(", "))?;
                writeln!(f, "Default      : {}", opt(&r.default_language))
            }
            Outcome::Features(features) => {
                for feature in features {
                    let state = if feature.state.is_enabled() {
                        "enabled"
                    } else {
                        "disabled"
                    };
                    writeln!(f, "{:<9} {}", state, feature.name)?;
                }
                Ok(())
            }
            Outcome::Feature(d) => {
                writeln!(f, "Name             : {}", opt(&d.name))?;
                writeln!(f, "Display name     : {}", opt(&d.display_name))?;
                writeln!(f, "Description      : {}", opt(&d.description))?;
                writeln!(f, "Restart required : {}", d.restart_required)?;
                writeln!(f, "State            : {}", opt(&d.state))?;
                if !d.custom_properties.is_empty() {
                    writeln!(f, "Custom properties:")?;
                    write_properties(f, &d.custom_properties, "")?;
                }
                Ok(())
            }
            Outcome::Command(out) => {
                write!(f, "{}", out.stdout)?;
                if !out.stderr.trim().is_empty() {
                    writeln!(f, "{}", out.stderr.trim())?;
                }
                Ok(())
            }
        }
    }
}
