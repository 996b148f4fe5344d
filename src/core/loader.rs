//! YAML step loader — the low-level ingestion path.
//!
//! Instead of compiling manifests, a step file describes the executable
//! steps directly:
//!
//! ```yaml
//! deb[pkg1]:
//!     ensure: latest
//!     depends:
//!       - deb[pkg2]
//!       - file[/etc/pkg1.conf]
//! deb[pkg2]:
//! file[/etc/pkg1.conf]:
//! ```
//!
//! Keys are `type[item]` identifiers; the `depends` entry is split out
//! into the step's dependency buckets and everything else becomes step
//! arguments.

use indexmap::IndexMap;
use regex::Regex;
use std::path::Path;

use crate::ast::Value;
use crate::core::types::Step;

/// Load steps from a YAML step file on disk.
pub fn load_file(path: &Path) -> Result<Vec<Step>, String> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    load(&source)
}

/// Load steps from YAML text. Returns the steps in document order.
pub fn load(source: &str) -> Result<Vec<Step>, String> {
    type RawSteps = IndexMap<String, Option<IndexMap<String, serde_yaml::Value>>>;

    let raw: RawSteps = if source.trim().is_empty() {
        IndexMap::new()
    } else {
        serde_yaml::from_str(source).map_err(|e| format!("YAML parse error: {}", e))?
    };

    let id_rxp = Regex::new(r"^([A-Za-z0-9]+)\[([^\[\]]+)\]$")
        .map_err(|e| format!("identifier pattern: {}", e))?;

    let mut steps = Vec::with_capacity(raw.len());
    for (key, body) in raw {
        let captures = id_rxp
            .captures(&key)
            .ok_or_else(|| format!("Invalid step identifier: {}", key))?;

        let mut step = Step {
            step_type: captures[1].to_string(),
            item: captures[2].to_string(),
            args: IndexMap::new(),
            depends: IndexMap::new(),
        };

        for (name, value) in body.unwrap_or_default() {
            if name == "depends" {
                set_depends(&mut step, &value, &id_rxp)?;
            } else {
                step.args.insert(name, yaml_to_value(&value, &key)?);
            }
        }

        steps.push(step);
    }

    Ok(steps)
}

/// Split a `depends` entry (one identifier or a list of them) into the
/// step's per-type buckets.
fn set_depends(step: &mut Step, value: &serde_yaml::Value, id_rxp: &Regex) -> Result<(), String> {
    let dependencies: Vec<String> = match value {
        serde_yaml::Value::String(s) => vec![s.clone()],
        serde_yaml::Value::Sequence(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    serde_yaml::Value::String(s) => list.push(s.clone()),
                    other => {
                        return Err(format!(
                            "Invalid values for depends in step {}: {:?}",
                            step.id(),
                            other
                        ))
                    }
                }
            }
            list
        }
        other => {
            return Err(format!(
                "Invalid values for depends in step {}: {:?}",
                step.id(),
                other
            ))
        }
    };

    for dependency in dependencies {
        let captures = id_rxp
            .captures(&dependency)
            .ok_or_else(|| format!("Invalid dependency identifier: {}", dependency))?;
        step.depends
            .entry(captures[1].to_string())
            .or_default()
            .push(captures[2].to_string());
    }

    Ok(())
}

/// Convert a YAML scalar or sequence into a step argument value.
fn yaml_to_value(value: &serde_yaml::Value, key: &str) -> Result<Value, String> {
    match value {
        serde_yaml::Value::Null => Ok(Value::Str(String::new())),
        serde_yaml::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| format!("Non-integer number in step {}: {}", key, n)),
        serde_yaml::Value::String(s) => Ok(Value::Str(s.clone())),
        serde_yaml::Value::Sequence(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(yaml_to_value(item, key)?);
            }
            Ok(Value::Array(out))
        }
        other => Err(format!("Unsupported value in step {}: {:?}", key, other)),
    }
}
