//! Phase-ordered execution of a component selection
//!
//! One engine run walks a fixed phase sequence, strictly serially: pre
//! script/procedure payloads (priority ascending), one batched package
//! removal, one batched package install (whose own output drives the
//! download/install sub-phases), one batched image install, then post
//! payloads (priority ascending). No phase starts before the previous
//! phase's subprocess has exited.
//!
//! Batched tools are "best effort": a non-zero exit is logged and the run
//! continues. Script and procedure failures are not caught; they abort
//! the remainder of the run.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::thread::JoinHandle;
use tracing::{info, warn};

use crate::error::{LodestarError, Result};
use crate::parsers::{PackageProgressParser, SilentParser};
use crate::payload::{App, OPTION_ENV};
use crate::planner::{SpecialKind, SpecialPayload, build_plan};
use crate::process_guard::CommandProcessGroup;
use crate::process_runner::{OUTPUT_PREFIX, ToolOutput, run_with_line_parse};
use crate::progress::{Phase, ProgressTracker};

/// External tool command lines. Carried as data so tests and unusual
/// setups can substitute their own commands.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Package-manager invocation prefix, e.g. `sudo dnf5`
    pub package_tool: Vec<String>,
    /// Image installer invocation prefix, e.g. `sudo flatpak`
    pub image_tool: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            package_tool: vec!["sudo".into(), "dnf5".into()],
            image_tool: vec!["sudo".into(), "flatpak".into()],
        }
    }
}

/// Result of one engine run, surfaced for logging only.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Exit code of the last external tool invocation
    pub last_exit: Option<i32>,
}

/// Executes a selection of apps against the configured external tools,
/// reporting through a shared [`ProgressTracker`].
pub struct Engine {
    tools: ToolConfig,
    tracker: ProgressTracker,
    chroot: Option<PathBuf>,
}

impl Engine {
    pub fn new(tools: ToolConfig, tracker: ProgressTracker) -> Self {
        Self { tools, tracker, chroot: None }
    }

    /// Run script payloads inside `dir` instead of on the host.
    pub fn with_chroot(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chroot = Some(dir.into());
        self
    }

    pub fn tracker(&self) -> ProgressTracker {
        self.tracker.clone()
    }

    /// Execute every payload of `apps` in deterministic phase order.
    pub fn run(&self, apps: &[App]) -> Result<RunSummary> {
        let plan = build_plan(apps);
        self.tracker.set_total(plan.total_units());
        info!(
            "starting run: {} removal(s), {} install(s), {} image(s), {} pre, {} post",
            plan.removals.len(),
            plan.installs.len(),
            plan.images.len(),
            plan.pre.len(),
            plan.post.len()
        );

        let mut summary = RunSummary::default();

        self.run_specials(&plan.pre)?;

        self.tracker.set_phase(Phase::RemovingPackages);
        let output = self.run_package_tool("rm", &plan.removals)?;
        summary.last_exit = output.exit_code;

        // The install batch announces its own download/install sub-phases
        // through the line parser, starting from Idle
        self.tracker.set_phase(Phase::Idle);
        let output = self.run_package_tool("in", &plan.installs)?;
        summary.last_exit = output.exit_code;

        self.tracker.set_phase(Phase::InstallingImages);
        let output = self.run_image_tool(&plan.images)?;
        summary.last_exit = output.exit_code;
        // No per-image progress is obtainable; credit the batch as a whole
        self.tracker.add_completed(plan.images.len() as u64);

        self.run_specials(&plan.post)?;

        self.tracker.finish();
        info!("run complete");
        Ok(summary)
    }

    fn run_specials(&self, specials: &[SpecialPayload<'_>]) -> Result<()> {
        for special in specials {
            let option = special.option.as_ref().map(|o| o.get()).unwrap_or(false);
            // One unit per special payload, credited before invocation so
            // the bar moves even if the payload then fails
            match special.kind {
                SpecialKind::Script(body) => {
                    self.tracker.set_phase(Phase::RunningScript);
                    self.tracker.add_completed(1);
                    info!("running script payload for {}", special.app_name);
                    self.run_script(body, option)?;
                }
                SpecialKind::Procedure(run) => {
                    self.tracker.set_phase(Phase::RunningProcedure);
                    self.tracker.add_completed(1);
                    info!("running procedure payload for {}", special.app_name);
                    (run.as_ref())(option)?;
                }
            }
        }
        Ok(())
    }

    fn run_package_tool(&self, action: &str, names: &[&str]) -> Result<ToolOutput> {
        let mut cmd = self.tools.package_tool.clone();
        cmd.push(action.to_string());
        cmd.push("-y".to_string());
        cmd.extend(names.iter().map(|n| n.to_string()));

        let mut parser = PackageProgressParser::new(self.tracker.clone());
        let output = run_with_line_parse(&cmd, OUTPUT_PREFIX, &mut parser)?;
        if !output.success {
            // Tolerated: the next phase still runs
            warn!("package tool ({}) exited with {:?}", action, output.exit_code);
        }
        Ok(output)
    }

    fn run_image_tool(&self, names: &[&str]) -> Result<ToolOutput> {
        let mut cmd = self.tools.image_tool.clone();
        cmd.push("install".to_string());
        cmd.push("--noninteractive".to_string());
        cmd.extend(names.iter().map(|n| n.to_string()));

        let mut parser = SilentParser;
        let output = run_with_line_parse(&cmd, OUTPUT_PREFIX, &mut parser)?;
        if !output.success {
            // Already-installed applications make this tool exit non-zero
            warn!("image tool exited with {:?}", output.exit_code);
        }
        Ok(output)
    }

    fn run_script(&self, body: &str, option: bool) -> Result<()> {
        let status = match &self.chroot {
            Some(root) => self.run_script_in_chroot(root, body, option)?,
            None => Command::new("sh")
                .arg("-c")
                .arg(body)
                .env(OPTION_ENV, option_env_value(option))
                .in_new_process_group()
                .status()?,
        };
        if status.success() {
            Ok(())
        } else {
            Err(LodestarError::script(format!(
                "script exited with status {}",
                status.code().unwrap_or(-1)
            )))
        }
    }

    /// Write the body into the chroot's /tmp, run it through chroot(1),
    /// and clean up the file afterwards.
    fn run_script_in_chroot(&self, root: &Path, body: &str, option: bool) -> Result<ExitStatus> {
        use std::os::unix::fs::PermissionsExt;

        let script = if body.starts_with("#!") {
            body.to_string()
        } else {
            format!("#!/bin/sh\n{}", body)
        };

        let tmp_dir = root.join("tmp");
        std::fs::create_dir_all(&tmp_dir)?;
        let script_path = tmp_dir.join("lodestar-payload.sh");
        std::fs::write(&script_path, script)?;
        let mut perms = std::fs::metadata(&script_path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script_path, perms)?;

        let status = Command::new("chroot")
            .arg(root)
            .arg("/tmp/lodestar-payload.sh")
            .env(OPTION_ENV, option_env_value(option))
            .in_new_process_group()
            .status();

        let _ = std::fs::remove_file(&script_path);
        Ok(status?)
    }
}

fn option_env_value(option: bool) -> &'static str {
    if option { "1" } else { "0" }
}

/// Run the engine on a dedicated worker thread. The caller keeps a tracker
/// clone for observation and joins the handle for the result.
pub fn spawn_run(engine: Engine, apps: Vec<App>) -> JoinHandle<Result<RunSummary>> {
    std::thread::spawn(move || engine.run(&apps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tool_config() {
        let tools = ToolConfig::default();
        assert_eq!(tools.package_tool, vec!["sudo", "dnf5"]);
        assert_eq!(tools.image_tool, vec!["sudo", "flatpak"]);
    }

    #[test]
    fn test_option_env_value() {
        assert_eq!(option_env_value(true), "1");
        assert_eq!(option_env_value(false), "0");
    }
}
