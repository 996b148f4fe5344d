//! Lowers resolved declarations into neutral steps.
//!
//! One step per declaration: `type` and `item` copy through, every prop
//! except `depends` becomes an argument, and `depends` references are
//! collected into per-type buckets. Whether the referenced steps exist is
//! the planner's business, not ours.

use indexmap::IndexMap;

use crate::ast::{Declaration, Value};
use crate::core::types::Step;
use crate::error::CompileError;

/// Convert resolved declarations into steps, preserving order.
pub fn convert(declarations: &[Declaration]) -> Result<Vec<Step>, CompileError> {
    let mut steps = Vec::with_capacity(declarations.len());

    for decl in declarations {
        let item = match &decl.scalar {
            Value::Str(name) => name.clone(),
            _ => {
                return Err(CompileError::BadScalar {
                    type_name: decl.type_name.clone(),
                    file: decl.file.clone(),
                    line: decl.line,
                })
            }
        };

        let mut args = IndexMap::new();
        let mut depends = IndexMap::new();

        for prop in &decl.props {
            if prop.name == "depends" {
                depends = reference_buckets(&prop.value, &decl.file, prop.line)?;
            } else {
                args.insert(prop.name.clone(), prop.value.clone());
            }
        }

        steps.push(Step {
            step_type: decl.type_name.clone(),
            item,
            args,
            depends,
        });
    }

    Ok(steps)
}

/// Group a `depends` value into `type -> [items]` buckets, preserving
/// reference order within each type.
fn reference_buckets(
    value: &Value,
    file: &str,
    line: u32,
) -> Result<IndexMap<String, Vec<String>>, CompileError> {
    let bad = || CompileError::BadDepends {
        file: file.to_string(),
        line,
    };

    // A lone reference is treated as a one-element list.
    let references: &[Value] = match value {
        Value::Ref(_) => std::slice::from_ref(value),
        Value::Array(items) => items.as_slice(),
        _ => return Err(bad()),
    };

    let mut buckets: IndexMap<String, Vec<String>> = IndexMap::new();
    for item in references {
        let r = match item {
            Value::Ref(r) => r,
            _ => return Err(bad()),
        };
        let target = match r.scalar.as_ref() {
            Value::Str(s) => s.clone(),
            _ => return Err(bad()),
        };
        buckets.entry(r.type_name.clone()).or_default().push(target);
    }

    Ok(buckets)
}
