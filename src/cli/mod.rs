//! Command-line front end: walk a manifest directory, compile it, then
//! print or execute the plan.

use clap::Parser;
use std::path::{Path, PathBuf};

use crate::ast::Manifest;
use crate::core::executor::{self, DryRun, ScriptRunner};
use crate::core::types::Plan;
use crate::core::{convert, loader, parser, planner, resolver};

#[derive(Parser, Debug)]
#[command(
    name = "mosa",
    version,
    about = "Declarative configuration management — compiles .ms manifests into an ordered execution plan"
)]
pub struct Args {
    /// Directory searched recursively for .ms manifest files
    #[arg(required_unless_present = "steps")]
    pub dir: Option<PathBuf>,

    /// Plan a YAML step file instead of compiling manifests
    #[arg(long, conflicts_with = "dir")]
    pub steps: Option<PathBuf>,

    /// Execute the plan instead of printing it
    #[arg(long)]
    pub run: bool,

    /// Directory holding the per-type scripts used by --run
    #[arg(long, default_value = "script")]
    pub script_dir: PathBuf,

    /// Print the plan as JSON (dry-run only)
    #[arg(long, conflicts_with = "run")]
    pub json: bool,

    /// Per-phase progress output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Compile and then print or execute, per the flags.
pub fn dispatch(args: &Args) -> Result<(), String> {
    let plan = match (&args.dir, &args.steps) {
        (_, Some(steps_file)) => plan_step_file(steps_file, args.verbose)?,
        (Some(dir), None) => compile_dir(dir, args.verbose)?,
        (None, None) => return Err("a manifest directory or --steps file is required".to_string()),
    };

    if args.run {
        let mut runner = ScriptRunner::new(&args.script_dir)?;
        executor::execute_plan(&plan, &mut runner)
    } else if args.json {
        let json = serde_json::to_string_pretty(&plan)
            .map_err(|e| format!("cannot serialize plan: {}", e))?;
        println!("{}", json);
        Ok(())
    } else {
        let mut dry = DryRun::new();
        executor::execute_plan(&plan, &mut dry)
    }
}

/// Run the whole pipeline over a manifest directory.
pub fn compile_dir(dir: &Path, verbose: bool) -> Result<Plan, String> {
    let files = collect_manifests(dir)?;
    if verbose {
        println!("Parsing {} manifest file(s) from {}", files.len(), dir.display());
    }

    let mut manifest = Manifest::new();
    for file in &files {
        let source = std::fs::read_to_string(file)
            .map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
        parser::parse(&mut manifest, &file.display().to_string(), &source)
            .map_err(|e| e.to_string())?;
    }

    let declarations = resolver::resolve(&manifest).map_err(|e| e.to_string())?;
    let steps = convert::convert(&declarations).map_err(|e| e.to_string())?;
    let plan = planner::plan(&steps).map_err(|e| e.to_string())?;

    if verbose {
        println!(
            "Compiled {} class(es), {} define(s), {} node(s) into {} step(s) across {} stage(s)",
            manifest.classes.len(),
            manifest.defines.len(),
            manifest.nodes.len(),
            steps.len(),
            plan.stages.len()
        );
    }

    Ok(plan)
}

/// Plan a YAML step file, skipping manifest compilation entirely.
pub fn plan_step_file(path: &Path, verbose: bool) -> Result<Plan, String> {
    let steps = loader::load_file(path)?;
    if verbose {
        println!("Loaded {} step(s) from {}", steps.len(), path.display());
    }
    planner::plan(&steps).map_err(|e| e.to_string())
}

/// Collect every `.ms` file under `dir`, recursively. Hidden files and
/// directories are skipped. Entries are visited in sorted order so the
/// compilation is deterministic.
fn collect_manifests(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let mut files = Vec::new();
    collect_into(dir, &mut files)?;
    Ok(files)
}

fn collect_into(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("cannot read directory {}: {}", dir.display(), e))?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| format!("cannot read directory entry: {}", e))?;
        paths.push(entry.path());
    }
    paths.sort();

    for path in paths {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        if name.starts_with('.') {
            continue;
        }

        if path.is_dir() {
            collect_into(&path, files)?;
        } else if name.ends_with(".ms") {
            files.push(path);
        }
    }

    Ok(())
}
