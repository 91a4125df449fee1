use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::elevation::Privilege;
use crate::error::{AppError, Result};
use crate::models::{FeatureDetail, FeatureSummary, HealthReport, ImageRecord, WimImageInfo};
use crate::report::{
    parse_feature_info, parse_feature_list, parse_image_info, parse_wim_listing, NO_CORRUPTION,
    OPERATION_SUCCESS, RESTORE_SUCCESS,
};
use crate::sys::{CommandOutput, CommandRunner, SystemRunner};

/// Client for the DISM command-line tool.
///
/// Every invocation passes `/English` so the status lines match the literals
/// in the report parser. Operations that need administrator rights check the
/// [`Privilege`] captured at construction before anything is run.
#[derive(Debug, Clone)]
pub struct Dism<R = SystemRunner> {
    runner: R,
    program: PathBuf,
    privilege: Privilege,
}

impl Dism<SystemRunner> {
    pub fn new(privilege: Privilege) -> Self {
        Self::with_runner(SystemRunner, privilege)
    }
}

impl<R: CommandRunner> Dism<R> {
    pub fn with_runner(runner: R, privilege: Privilege) -> Self {
        Self {
            runner,
            program: PathBuf::from("dism"),
            privilege,
        }
    }

    /// Use a different DISM executable, e.g. a full path to `Dism.exe`.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    fn invoke(&self, args: Vec<String>) -> Result<CommandOutput> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("/English".to_string());
        full.extend(args);
        self.runner.run(&self.program, &full)
    }

    fn invoke_admin(&self, args: Vec<String>) -> Result<CommandOutput> {
        self.privilege.require_admin()?;
        self.invoke(args)
    }

    /// Like [`Self::invoke_admin`], but anything on stderr is an error.
    fn invoke_report(&self, args: Vec<String>) -> Result<CommandOutput> {
        let output = self.invoke_admin(args)?;
        let stderr = output.stderr.trim();
        if !stderr.is_empty() {
            return Err(AppError::Tool(stderr.to_string()));
        }
        Ok(output)
    }

    /// `true` when the component store has no recorded corruption.
    pub fn check_health(&self) -> Result<bool> {
        let output = self.invoke_admin(online_cleanup("/CheckHealth"))?;
        Ok(output.stdout.contains(NO_CORRUPTION))
    }

    /// Scan the component store. This can take a long time.
    pub fn scan_health(&self) -> Result<HealthReport> {
        let output = self.invoke_admin(online_cleanup("/ScanHealth"))?;
        // A run that never finished says nothing about the store.
        let completed = output.stdout.contains(OPERATION_SUCCESS);
        let report = HealthReport {
            corruption_detected: completed && !output.stdout.contains(NO_CORRUPTION),
            completed,
        };
        if !report.completed {
            warn!("scan health did not report completion");
        }
        Ok(report)
    }

    /// Scan and repair the component store using Windows Update.
    pub fn restore_health(&self) -> Result<bool> {
        let output = self.invoke_admin(online_cleanup("/RestoreHealth"))?;
        Ok(output.stdout.contains(RESTORE_SUCCESS))
    }

    /// Repair the component store from `source`. With `limit_access`, Windows
    /// Update is not consulted. Returns `true` when DISM reports no corruption.
    pub fn restore_health_from(&self, source: &str, limit_access: bool) -> Result<bool> {
        let mut args = online_cleanup("/RestoreHealth");
        args.push(format!("/Source:{source}"));
        if limit_access {
            args.push("/LimitAccess".into());
        }
        let output = self.invoke_admin(args)?;
        Ok(output.stdout.contains(NO_CORRUPTION))
    }

    /// List the images inside a WIM/ESD file.
    pub fn list_images(&self, wim: &Path) -> Result<Vec<WimImageInfo>> {
        let output = self.invoke_report(vec![
            "/Get-WimInfo".into(),
            format!("/WimFile:{}", wim.display()),
        ])?;
        Ok(parse_wim_listing(&output.stdout))
    }

    /// Detailed metadata for one image of a WIM/ESD file.
    pub fn image_info(&self, wim: &Path, index: u32) -> Result<ImageRecord> {
        let output = self.invoke_report(vec![
            "/Get-WimInfo".into(),
            format!("/WimFile:{}", wim.display()),
            format!("/Index:{index}"),
        ])?;
        parse_image_info(&output.stdout, index)
    }

    pub fn mount_wim(
        &self,
        wim: &Path,
        mount_dir: &Path,
        index: u32,
        read_only: bool,
    ) -> Result<CommandOutput> {
        let mut args = vec![
            "/Mount-Wim".to_string(),
            format!("/WimFile:{}", wim.display()),
            format!("/Index:{index}"),
            format!("/MountDir:{}", mount_dir.display()),
        ];
        if read_only {
            args.push("/ReadOnly".into());
        }
        self.invoke_admin(args)
    }

    /// Unmount, either committing or discarding changes made to the image.
    pub fn unmount_wim(&self, mount_dir: &Path, commit: bool) -> Result<CommandOutput> {
        self.invoke_admin(vec![
            "/Unmount-Wim".into(),
            format!("/MountDir:{}", mount_dir.display()),
            if commit { "/Commit" } else { "/Discard" }.into(),
        ])
    }

    pub fn add_package(&self, mount_dir: &Path, package: &Path) -> Result<CommandOutput> {
        self.invoke_admin(vec![
            format!("/Image:{}", mount_dir.display()),
            "/Add-Package".into(),
            format!("/PackagePath:{}", package.display()),
        ])
    }

    pub fn remove_package(&self, mount_dir: &Path, package_name: &str) -> Result<CommandOutput> {
        self.invoke_admin(vec![
            format!("/Image:{}", mount_dir.display()),
            "/Remove-Package".into(),
            format!("/PackageName:{package_name}"),
        ])
    }

    pub fn add_driver(&self, mount_dir: &Path, driver: &Path) -> Result<CommandOutput> {
        self.invoke_admin(vec![
            format!("/Image:{}", mount_dir.display()),
            "/Add-Driver".into(),
            format!("/Driver:{}", driver.display()),
        ])
    }

    pub fn remove_driver(&self, mount_dir: &Path, driver: &str) -> Result<CommandOutput> {
        self.invoke_admin(vec![
            format!("/Image:{}", mount_dir.display()),
            "/Remove-Driver".into(),
            format!("/Driver:{driver}"),
        ])
    }

    /// Capture `capture_dir` into a new image named `name`. Needs no elevation
    /// check; DISM itself fails if the rights are missing.
    pub fn capture_image(&self, wim: &Path, capture_dir: &Path, name: &str) -> Result<bool> {
        let output = self.invoke(vec![
            "/Capture-Image".into(),
            format!("/ImageFile:{}", wim.display()),
            format!("/CaptureDir:{}", capture_dir.display()),
            format!("/Name:{name}"),
        ])?;
        info!("captured {} into {}", capture_dir.display(), wim.display());
        Ok(output.stdout.contains(OPERATION_SUCCESS))
    }

    pub fn apply_image(&self, wim: &Path, index: u32, apply_dir: &Path) -> Result<bool> {
        let output = self.invoke(vec![
            "/Apply-Image".into(),
            format!("/ImageFile:{}", wim.display()),
            format!("/Index:{index}"),
            format!("/ApplyDir:{}", apply_dir.display()),
        ])?;
        Ok(output.stdout.contains(OPERATION_SUCCESS))
    }

    /// Optional features of the running system.
    pub fn features(&self) -> Result<Vec<FeatureSummary>> {
        let output = self.invoke_report(vec!["/Online".into(), "/Get-Features".into()])?;
        Ok(parse_feature_list(&output.stdout))
    }

    pub fn feature_info(&self, name: &str) -> Result<FeatureDetail> {
        let output = self.invoke_report(vec![
            "/Online".into(),
            "/Get-FeatureInfo".into(),
            format!("/FeatureName:{name}"),
        ])?;
        parse_feature_info(&output.stdout)
    }

    /// Enable a feature without rebooting. `all` also enables its parents.
    pub fn enable_feature(&self, name: &str, all: bool) -> Result<bool> {
        let mut args = vec![
            "/Online".to_string(),
            "/Enable-Feature".into(),
            format!("/FeatureName:{name}"),
        ];
        if all {
            args.push("/All".into());
        }
        args.push("/NoRestart".into());
        let output = self.invoke_admin(args)?;
        Ok(output.stdout.contains(OPERATION_SUCCESS))
    }

    pub fn disable_feature(&self, name: &str) -> Result<bool> {
        let output = self.invoke_admin(vec![
            "/Online".into(),
            "/Disable-Feature".into(),
            format!("/FeatureName:{name}"),
            "/NoRestart".into(),
        ])?;
        Ok(output.stdout.contains(OPERATION_SUCCESS))
    }
}

fn online_cleanup(action: &str) -> Vec<String> {
    vec!["/Online".into(), "/Cleanup-Image".into(), action.into()]
}
