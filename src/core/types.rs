//! Neutral execution model: steps, stages and the plan.
//!
//! A `Step` is the executor-ready form of one realized declaration. Maps
//! are order-preserving so plans print and serialize deterministically.

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

use crate::ast::Value;

/// One executable unit, e.g. a package to install or a command to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Step type, such as "package", "file" or "exec".
    #[serde(rename = "type")]
    pub step_type: String,

    /// The item the step handles. `(type, item)` is the unique identity
    /// used for dependencies.
    pub item: String,

    /// Additional arguments; for a file this may be mode or ownership.
    pub args: IndexMap<String, Value>,

    /// Dependencies that must be satisfied first, grouped by type:
    /// `{"package": ["apache2", "php"], "file": ["/etc/php.ini"]}`.
    pub depends: IndexMap<String, Vec<String>>,
}

impl Step {
    /// The `type[item]` identity string used in diagnostics.
    pub fn id(&self) -> String {
        format!("{}[{}]", self.step_type, self.item)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]:", self.step_type, self.item)?;
        for (key, value) in &self.args {
            write!(f, "\n\t{}: {}", key, value)?;
        }
        if !self.depends.is_empty() {
            let groups: Vec<String> = self
                .depends
                .iter()
                .map(|(dep_type, items)| format!("{}[{}]", dep_type, items.join(",")))
                .collect();
            write!(f, "\n\tDepends: {}", groups.join(", "))?;
        }
        Ok(())
    }
}

/// A set of steps with no ordering constraints between them; an executor
/// may run everything in one stage concurrently. Steps are grouped by
/// type so per-type executors receive all their items at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub steps: IndexMap<String, Vec<Step>>,
}

impl Stage {
    /// Total number of steps across all type buckets.
    pub fn len(&self) -> usize {
        self.steps.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (step_type, steps) in &self.steps {
            let items: Vec<&str> = steps.iter().map(|s| s.item.as_str()).collect();
            writeln!(f, "{}[{}]", step_type, items.join(","))?;
        }
        Ok(())
    }
}

/// An ordered sequence of stages. Stage `n` completes before stage `n+1`
/// begins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub stages: Vec<Stage>,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plan:")?;
        for (i, stage) in self.stages.iter().enumerate() {
            writeln!(f, "Stage {}:", i)?;
            write!(f, "{}", stage)?;
        }
        Ok(())
    }
}
