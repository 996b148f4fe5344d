//! Groups steps into parallel-safe stages from the dependency graph.
//!
//! Three passes: index every step by `(type, item)` rejecting duplicates,
//! walk the dependency edges from every step to catch cycles and missing
//! targets, then peel off layers — each stage takes every remaining step
//! whose dependencies are all satisfied, and satisfied edges are removed
//! from the rest. Steps inside one stage are mutually independent.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::types::{Plan, Stage, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanErrorKind {
    DuplicateDefinition,
    MissingDependency,
    RecursivePlan,
}

impl fmt::Display for PlanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateDefinition => write!(f, "Duplicate definition"),
            Self::MissingDependency => write!(f, "Missing dependency"),
            Self::RecursivePlan => write!(f, "Recursive plan"),
        }
    }
}

/// A planning failure: the kind, the step it was detected on, and where
/// meaningful the offending target or the full dependency chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanError {
    pub kind: PlanErrorKind,
    pub step: String,
    pub details: Option<String>,
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error processing {}: {}", self.step, self.kind)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for PlanError {}

/// Build an executable plan from steps. The stages are a topological
/// layering of the dependency DAG.
pub fn plan(steps: &[Step]) -> Result<Plan, PlanError> {
    let index = index_steps(steps)?;

    for step in steps {
        let mut path = Vec::new();
        check_step(&index, &mut path, step)?;
    }

    let mut plan = Plan::default();
    let mut remaining: Vec<Step> = steps.to_vec();
    while !remaining.is_empty() {
        let (stage, rest) = extract_next_stage(remaining);
        if stage.is_empty() {
            // Unreachable after the cycle check; fail loudly over looping.
            let step = &rest[0];
            return Err(PlanError {
                kind: PlanErrorKind::RecursivePlan,
                step: step.id(),
                details: None,
            });
        }
        plan.stages.push(stage);
        remaining = rest;
    }

    Ok(plan)
}

/// Index steps by `(type, item)`, rejecting duplicates.
fn index_steps<'a>(
    steps: &'a [Step],
) -> Result<HashMap<(&'a str, &'a str), &'a Step>, PlanError> {
    let mut index = HashMap::new();
    for step in steps {
        if index
            .insert((step.step_type.as_str(), step.item.as_str()), step)
            .is_some()
        {
            return Err(PlanError {
                kind: PlanErrorKind::DuplicateDefinition,
                step: step.id(),
                details: None,
            });
        }
    }
    Ok(index)
}

/// Depth-first walk from `step`. Re-entering a step already on the path
/// is a cycle; a dependency absent from the index is a missing target.
fn check_step<'a>(
    index: &HashMap<(&'a str, &'a str), &'a Step>,
    path: &mut Vec<&'a Step>,
    step: &'a Step,
) -> Result<(), PlanError> {
    let on_path = path
        .iter()
        .any(|seen| seen.step_type == step.step_type && seen.item == step.item);
    if on_path {
        let mut chain: Vec<String> = path.iter().map(|s| s.id()).collect();
        chain.push(step.id());
        return Err(PlanError {
            kind: PlanErrorKind::RecursivePlan,
            step: path[0].id(),
            details: Some(chain.join(" -> ")),
        });
    }

    path.push(step);
    for (dep_type, items) in &step.depends {
        for item in items {
            let next = match index.get(&(dep_type.as_str(), item.as_str())) {
                Some(next) => *next,
                None => {
                    return Err(PlanError {
                        kind: PlanErrorKind::MissingDependency,
                        step: step.id(),
                        details: Some(format!("{}[{}]", dep_type, item)),
                    })
                }
            };
            check_step(index, path, next)?;
        }
    }
    path.pop();

    Ok(())
}

/// Move every step with no outstanding dependencies into a new stage and
/// strip those steps from the `depends` maps of the rest.
fn extract_next_stage(steps: Vec<Step>) -> (Stage, Vec<Step>) {
    let mut stage = Stage::default();
    let mut staged: HashSet<(String, String)> = HashSet::new();
    let mut left = Vec::with_capacity(steps.len());

    for step in steps {
        if step.depends.is_empty() {
            staged.insert((step.step_type.clone(), step.item.clone()));
            stage.steps.entry(step.step_type.clone()).or_default().push(step);
        } else {
            left.push(step);
        }
    }

    for step in &mut left {
        let mut emptied = Vec::new();
        for (dep_type, items) in step.depends.iter_mut() {
            items.retain(|item| !staged.contains(&(dep_type.clone(), item.clone())));
            if items.is_empty() {
                emptied.push(dep_type.clone());
            }
        }
        for dep_type in emptied {
            step.depends.shift_remove(&dep_type);
        }
    }

    (stage, left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn step(step_type: &str, item: &str, depends: &[(&str, &[&str])]) -> Step {
        let mut map = IndexMap::new();
        for (dep_type, items) in depends {
            map.insert(
                dep_type.to_string(),
                items.iter().map(|s| s.to_string()).collect(),
            );
        }
        Step {
            step_type: step_type.to_string(),
            item: item.to_string(),
            args: IndexMap::new(),
            depends: map,
        }
    }

    /// Shorthand: the stages as `type -> [items]` maps.
    fn layout(plan: &Plan) -> Vec<Vec<(String, Vec<String>)>> {
        plan.stages
            .iter()
            .map(|stage| {
                stage
                    .steps
                    .iter()
                    .map(|(t, steps)| {
                        (
                            t.clone(),
                            steps.iter().map(|s| s.item.clone()).collect(),
                        )
                    })
                    .collect()
            })
            .collect()
    }

    fn expect_stage(types: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
        types
            .iter()
            .map(|(t, items)| {
                (
                    t.to_string(),
                    items.iter().map(|s| s.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_plan() {
        let plan = plan(&[]).unwrap();
        assert!(plan.stages.is_empty());
    }

    #[test]
    fn test_single_step() {
        let p = plan(&[step("deb", "pkg1", &[])]).unwrap();
        assert_eq!(layout(&p), vec![expect_stage(&[("deb", &["pkg1"])])]);
    }

    #[test]
    fn test_independent_steps_share_a_stage() {
        let p = plan(&[step("deb", "pkg1", &[]), step("deb", "pkg2", &[])]).unwrap();
        assert_eq!(layout(&p), vec![expect_stage(&[("deb", &["pkg1", "pkg2"])])]);
    }

    #[test]
    fn test_types_grouped_within_stage() {
        let p = plan(&[step("deb", "pkg1", &[]), step("file", "file1", &[])]).unwrap();
        assert_eq!(
            layout(&p),
            vec![expect_stage(&[("deb", &["pkg1"]), ("file", &["file1"])])]
        );
    }

    #[test]
    fn test_two_stages() {
        let p = plan(&[
            step("deb", "pkg1", &[]),
            step("deb", "pkg2", &[("deb", &["pkg1"])]),
        ])
        .unwrap();
        assert_eq!(
            layout(&p),
            vec![
                expect_stage(&[("deb", &["pkg1"])]),
                expect_stage(&[("deb", &["pkg2"])]),
            ]
        );
    }

    #[test]
    fn test_two_stages_with_independent_type() {
        let p = plan(&[
            step("deb", "pkg1", &[]),
            step("deb", "pkg2", &[("deb", &["pkg1"])]),
            step("file", "file1", &[]),
        ])
        .unwrap();
        assert_eq!(
            layout(&p),
            vec![
                expect_stage(&[("deb", &["pkg1"]), ("file", &["file1"])]),
                expect_stage(&[("deb", &["pkg2"])]),
            ]
        );
    }

    #[test]
    fn test_five_stage_chain() {
        // pkg1 ← pkg2, file1; pkg2 ← file1, file2; file1 ← cmd1;
        // file2 ← cmd2; cmd1 ← cmd2; cmd2 ← ∅
        let steps = vec![
            step("deb", "pkg1", &[("deb", &["pkg2"]), ("file", &["file1"])]),
            step("deb", "pkg2", &[("file", &["file1", "file2"])]),
            step("file", "file1", &[("shell", &["cmd1"])]),
            step("file", "file2", &[("shell", &["cmd2"])]),
            step("shell", "cmd1", &[("shell", &["cmd2"])]),
            step("shell", "cmd2", &[]),
        ];
        let p = plan(&steps).unwrap();
        assert_eq!(
            layout(&p),
            vec![
                expect_stage(&[("shell", &["cmd2"])]),
                expect_stage(&[("file", &["file2"]), ("shell", &["cmd1"])]),
                expect_stage(&[("file", &["file1"])]),
                expect_stage(&[("deb", &["pkg2"])]),
                expect_stage(&[("deb", &["pkg1"])]),
            ]
        );
    }

    #[test]
    fn test_plan_covers_all_steps_with_deps_in_earlier_stages() {
        let steps = vec![
            step("deb", "pkg1", &[("deb", &["pkg2"]), ("file", &["file1"])]),
            step("deb", "pkg2", &[("file", &["file1", "file2"])]),
            step("file", "file1", &[("shell", &["cmd1"])]),
            step("file", "file2", &[("shell", &["cmd2"])]),
            step("shell", "cmd1", &[("shell", &["cmd2"])]),
            step("shell", "cmd2", &[]),
        ];
        let p = plan(&steps).unwrap();

        // (a) every input step appears exactly once
        let mut seen = HashSet::new();
        for stage in &p.stages {
            for steps in stage.steps.values() {
                for s in steps {
                    assert!(seen.insert(s.id()), "step staged twice: {}", s.id());
                }
            }
        }
        assert_eq!(seen.len(), steps.len());

        // (b) every dependency lands in an earlier stage
        let mut stage_of: HashMap<String, usize> = HashMap::new();
        for (i, stage) in p.stages.iter().enumerate() {
            for steps in stage.steps.values() {
                for s in steps {
                    stage_of.insert(s.id(), i);
                }
            }
        }
        for s in &steps {
            for (dep_type, items) in &s.depends {
                for item in items {
                    let dep_id = format!("{}[{}]", dep_type, item);
                    assert!(
                        stage_of[&dep_id] < stage_of[&s.id()],
                        "{} must precede {}",
                        dep_id,
                        s.id()
                    );
                }
            }
        }
    }

    #[test]
    fn test_duplicate_definition() {
        let err = plan(&[step("deb", "pkg1", &[]), step("deb", "pkg1", &[])]).unwrap_err();
        assert_eq!(err.kind, PlanErrorKind::DuplicateDefinition);
        assert_eq!(err.step, "deb[pkg1]");
        assert_eq!(err.to_string(), "Error processing deb[pkg1]: Duplicate definition");
    }

    #[test]
    fn test_missing_dependency() {
        let err = plan(&[step("deb", "pkg1", &[("deb", &["pkg2"])])]).unwrap_err();
        assert_eq!(err.kind, PlanErrorKind::MissingDependency);
        assert_eq!(
            err.to_string(),
            "Error processing deb[pkg1]: Missing dependency (deb[pkg2])"
        );
    }

    #[test]
    fn test_direct_cycle() {
        let err = plan(&[
            step("deb", "pkg1", &[("deb", &["pkg2"])]),
            step("deb", "pkg2", &[("deb", &["pkg1"])]),
        ])
        .unwrap_err();
        assert_eq!(err.kind, PlanErrorKind::RecursivePlan);
        // The chain names both participants.
        let details = err.details.unwrap();
        assert!(details.contains("deb[pkg1]"), "chain missing pkg1: {}", details);
        assert!(details.contains("deb[pkg2]"), "chain missing pkg2: {}", details);
    }

    #[test]
    fn test_deep_cycle() {
        let err = plan(&[
            step("deb", "pkg1", &[("deb", &["pkg2"]), ("file", &["file1"])]),
            step("deb", "pkg2", &[("file", &["file1", "file2"])]),
            step("file", "file1", &[("shell", &["cmd1"])]),
            step("file", "file2", &[("shell", &["cmd2"])]),
            step("shell", "cmd1", &[]),
            step("shell", "cmd2", &[("file", &["file2"])]),
        ])
        .unwrap_err();
        assert_eq!(err.kind, PlanErrorKind::RecursivePlan);
        let details = err.details.unwrap();
        assert!(details.contains("file[file2]"));
        assert!(details.contains("shell[cmd2]"));
    }

    #[test]
    fn test_self_cycle() {
        let err = plan(&[step("deb", "pkg1", &[("deb", &["pkg1"])])]).unwrap_err();
        assert_eq!(err.kind, PlanErrorKind::RecursivePlan);
        assert_eq!(
            err.details.unwrap(),
            "deb[pkg1] -> deb[pkg1]"
        );
    }
}
