//! Plan execution.
//!
//! Stages run strictly in order; within a stage the step buckets carry no
//! ordering constraints. The default executor is a dry-run printer; the
//! script runner shells out to one `<type>_many.sh` per type bucket with
//! the step items as arguments.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::types::{Plan, Stage};

/// Consumes one stage at a time.
pub trait Executor {
    fn execute(&mut self, stage: &Stage) -> Result<(), String>;
}

/// Run a plan stage by stage. The first failing stage aborts the run.
pub fn execute_plan(plan: &Plan, executor: &mut dyn Executor) -> Result<(), String> {
    for stage in &plan.stages {
        executor.execute(stage)?;
    }
    Ok(())
}

/// Prints what would be executed without running anything.
pub struct DryRun<W: Write> {
    out: W,
}

impl DryRun<std::io::Stdout> {
    pub fn new() -> Self {
        DryRun {
            out: std::io::stdout(),
        }
    }
}

impl Default for DryRun<std::io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> DryRun<W> {
    pub fn with_output(out: W) -> Self {
        DryRun { out }
    }
}

impl<W: Write> Executor for DryRun<W> {
    fn execute(&mut self, stage: &Stage) -> Result<(), String> {
        write!(self.out, "{}", stage).map_err(|e| format!("write failed: {}", e))
    }
}

/// Executes stages through per-type scripts found in a script directory.
/// A type's script is `<type>_many.sh` and receives every item of the
/// type's bucket as arguments.
pub struct ScriptRunner {
    script_dir: PathBuf,
    scripts: HashSet<String>,
}

impl ScriptRunner {
    /// Scan `script_dir` for executable scripts. Hidden entries are
    /// ignored.
    pub fn new(script_dir: &Path) -> Result<Self, String> {
        let entries = std::fs::read_dir(script_dir)
            .map_err(|e| format!("cannot read script dir {}: {}", script_dir.display(), e))?;

        let mut scripts = HashSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| format!("cannot read script dir entry: {}", e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if is_executable(&entry.path()) {
                scripts.insert(name);
            }
        }

        Ok(ScriptRunner {
            script_dir: script_dir.to_path_buf(),
            scripts,
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

impl Executor for ScriptRunner {
    fn execute(&mut self, stage: &Stage) -> Result<(), String> {
        for (step_type, steps) in &stage.steps {
            let script = format!("{}_many.sh", step_type);
            if !self.scripts.contains(&script) {
                return Err(format!(
                    "Found no script for type {}, expected {}",
                    step_type, script
                ));
            }

            let mut cmd = Command::new(self.script_dir.join(&script));
            for step in steps {
                cmd.arg(&step.item);
            }

            let output = cmd
                .output()
                .map_err(|e| format!("failed to run {}: {}", script, e))?;
            if !output.status.success() {
                return Err(format!(
                    "{} failed with {}: {}",
                    script,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ));
            }
        }
        Ok(())
    }
}
