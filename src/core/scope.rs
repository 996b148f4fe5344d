//! Local variable scope for one class, define or node realization.
//!
//! Definitions are collected first and resolved lazily on first use, so
//! statement order inside a block does not matter for lookups. A resolved
//! binding moves from `var_defs` to `resolved`; the split doubles as the
//! single-resolution witness. Cycle detection threads one chain and one
//! seen-set through every path a lookup can take: direct reference, array
//! element, interpolated-string segment, expression operand and reference
//! scalar.

use std::collections::{HashMap, HashSet};

use crate::ast::{Prop, Segment, Value, VariableDef, VariableName};
use crate::core::expr;
use crate::error::CompileError;

pub struct Scope {
    /// Definitions not yet resolved, by `$name`.
    var_defs: HashMap<String, VariableDef>,

    /// Final values of resolved definitions, by `$name`.
    resolved: HashMap<String, Value>,

    /// File the class/define being resolved lives in; used in messages.
    defined_in_file: String,

    /// Where this class/define was realized from.
    realized_in_file: String,
    realized_at_line: u32,
}

/// In-flight lookup state for one top-level resolution.
struct ResolveCtx {
    chain: Vec<ChainEntry>,
    seen: HashSet<String>,
}

struct ChainEntry {
    name: String,
    def_line: u32,
}

impl Scope {
    pub fn new(defined_in_file: &str, realized_in_file: &str, realized_at_line: u32) -> Self {
        Scope {
            var_defs: HashMap::new(),
            resolved: HashMap::new(),
            defined_in_file: defined_in_file.to_string(),
            realized_in_file: realized_in_file.to_string(),
            realized_at_line,
        }
    }

    fn multiple_definition(&self, line: u32, name: &str) -> CompileError {
        CompileError::MultipleDefinition {
            file: self.defined_in_file.clone(),
            line,
            name: name.to_string(),
        }
    }

    /// Add one in-body definition. Redefinition in the same scope is fatal.
    pub fn declare(&mut self, def: &VariableDef) -> Result<(), CompileError> {
        let name = &def.name.name;
        if self.var_defs.contains_key(name) || self.resolved.contains_key(name) {
            return Err(self.multiple_definition(def.line, name));
        }
        self.var_defs.insert(name.clone(), def.clone());
        Ok(())
    }

    /// Bind parameters from the props a realization passed. `depends` is
    /// carried on the declaration itself and never binds; `params` order
    /// is the header order. Required parameters (no default) must be
    /// supplied; unknown or reserved argument names are fatal.
    pub fn bind_args(&mut self, passed: &[Prop], params: &[VariableDef]) -> Result<(), CompileError> {
        let mut args_by_name: HashMap<&str, &Prop> = HashMap::new();
        for prop in passed {
            args_by_name.insert(prop.name.as_str(), prop);
        }
        args_by_name.remove("depends");

        for param in params {
            let name = &param.name.name;
            if self.var_defs.contains_key(name) || self.resolved.contains_key(name) {
                return Err(self.multiple_definition(param.line, name));
            }

            let bare = name.strip_prefix('$').unwrap_or(name);
            let value = match args_by_name.remove(bare) {
                Some(prop) => Some(prop.value.clone()),
                None => param.value.clone(),
            };

            let value = match value {
                Some(v) => v,
                None => {
                    return Err(CompileError::RequiredArgument {
                        name: bare.to_string(),
                        file: self.realized_in_file.clone(),
                        line: self.realized_at_line,
                    })
                }
            };

            self.var_defs.insert(
                name.clone(),
                VariableDef {
                    line: param.line,
                    name: param.name.clone(),
                    value: Some(value),
                },
            );
        }

        // Reject the first leftover argument, in source order.
        for prop in passed {
            if args_by_name.contains_key(prop.name.as_str()) {
                return Err(CompileError::UnsupportedArgument {
                    name: prop.name.clone(),
                    file: self.realized_in_file.clone(),
                    line: prop.line,
                });
            }
        }

        Ok(())
    }

    /// Resolve a value to its concrete form. `line` is the source line of
    /// the construct holding the value, used when a lookup fails.
    pub fn resolve_value(&mut self, value: &Value, line: u32) -> Result<Value, CompileError> {
        let mut ctx = ResolveCtx {
            chain: Vec::new(),
            seen: HashSet::new(),
        };
        self.resolve_value_rec(value, line, &mut ctx)
    }

    /// Resolve a variable by name.
    pub fn resolve_variable(&mut self, name: &VariableName, line: u32) -> Result<Value, CompileError> {
        let mut ctx = ResolveCtx {
            chain: Vec::new(),
            seen: HashSet::new(),
        };
        self.resolve_variable_rec(name, line, &mut ctx)
    }

    /// Resolve every prop value of a declaration.
    pub fn resolve_props(&mut self, props: &[Prop]) -> Result<Vec<Prop>, CompileError> {
        let mut out = Vec::with_capacity(props.len());
        for prop in props {
            out.push(Prop {
                line: prop.line,
                name: prop.name.clone(),
                value: self.resolve_value(&prop.value, prop.line)?,
            });
        }
        Ok(out)
    }

    fn resolve_value_rec(
        &mut self,
        value: &Value,
        line: u32,
        ctx: &mut ResolveCtx,
    ) -> Result<Value, CompileError> {
        match value {
            Value::Int(_) | Value::Bool(_) | Value::Str(_) => Ok(value.clone()),

            Value::Var(name) => self.resolve_variable_rec(name, line, ctx),

            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve_value_rec(item, line, ctx)?);
                }
                Ok(Value::Array(out))
            }

            Value::Interpolated(is) => {
                let mut out = String::new();
                for segment in &is.segments {
                    match segment {
                        Segment::Literal(text) => out.push_str(text),
                        Segment::Var(name) => {
                            match self.resolve_variable_rec(name, name.line, ctx)? {
                                Value::Str(s) => out.push_str(&s),
                                _ => {
                                    return Err(CompileError::BadInterpolation {
                                        name: name.name.clone(),
                                        file: self.defined_in_file.clone(),
                                        line: is.line,
                                    })
                                }
                            }
                        }
                    }
                }
                Ok(Value::Str(out))
            }

            Value::Ref(r) => {
                let scalar = self.resolve_value_rec(&r.scalar, r.line, ctx)?;
                if !matches!(scalar, Value::Str(_)) {
                    return Err(CompileError::BadReference {
                        kind: scalar.kind(),
                        file: self.defined_in_file.clone(),
                        line: r.line,
                    });
                }
                let mut resolved = r.clone();
                resolved.scalar = Box::new(scalar);
                Ok(Value::Ref(resolved))
            }

            Value::Expr(e) => {
                let left = self.resolve_value_rec(&e.left, e.line, ctx)?;
                let right = self.resolve_value_rec(&e.right, e.line, ctx)?;
                expr::apply(e.op, &left, &right).map_err(|(lhs, rhs)| {
                    CompileError::BadExpression {
                        op: e.op.symbol(),
                        lhs,
                        rhs,
                        file: self.defined_in_file.clone(),
                        line: e.line,
                    }
                })
            }
        }
    }

    fn resolve_variable_rec(
        &mut self,
        looking_for: &VariableName,
        ref_line: u32,
        ctx: &mut ResolveCtx,
    ) -> Result<Value, CompileError> {
        let name = &looking_for.name;

        if let Some(value) = self.resolved.get(name) {
            return Ok(value.clone());
        }

        let def = match self.var_defs.get(name) {
            Some(def) => def.clone(),
            None => {
                return Err(CompileError::UnresolvableVariable {
                    file: self.defined_in_file.clone(),
                    line: ref_line,
                    name: name.clone(),
                })
            }
        };

        if ctx.seen.contains(name) {
            let mut cycle: Vec<String> = ctx.chain.iter().map(|e| e.name.clone()).collect();
            cycle.push(name.clone());
            let first = &ctx.chain[0];
            return Err(CompileError::CyclicVariable {
                file: self.defined_in_file.clone(),
                line: first.def_line,
                name: first.name.clone(),
                cycle,
            });
        }
        ctx.seen.insert(name.clone());
        ctx.chain.push(ChainEntry {
            name: name.clone(),
            def_line: def.line,
        });

        let raw = match &def.value {
            Some(v) => v.clone(),
            None => {
                return Err(CompileError::UnresolvableVariable {
                    file: self.defined_in_file.clone(),
                    line: ref_line,
                    name: name.clone(),
                })
            }
        };

        let value = self.resolve_value_rec(&raw, def.line, ctx)?;
        self.resolved.insert(name.clone(), value.clone());
        self.var_defs.remove(name);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Expression, InterpolatedString, Reference};

    fn scope() -> Scope {
        Scope::new("c.ms", "site.ms", 4)
    }

    fn vn(line: u32, name: &str) -> VariableName {
        VariableName {
            line,
            name: name.to_string(),
        }
    }

    fn def(line: u32, name: &str, value: Value) -> VariableDef {
        VariableDef {
            line,
            name: vn(line, name),
            value: Some(value),
        }
    }

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    #[test]
    fn test_variable_chain() {
        let mut sc = scope();
        sc.declare(&def(2, "$foo", s("x"))).unwrap();
        sc.declare(&def(3, "$bar", Value::Var(vn(3, "$foo")))).unwrap();
        assert_eq!(sc.resolve_variable(&vn(3, "$bar"), 3).unwrap(), s("x"));
    }

    #[test]
    fn test_forward_reference() {
        let mut sc = scope();
        sc.declare(&def(2, "$bar", Value::Var(vn(2, "$foo")))).unwrap();
        sc.declare(&def(3, "$foo", s("x"))).unwrap();
        assert_eq!(sc.resolve_variable(&vn(2, "$bar"), 2).unwrap(), s("x"));
    }

    #[test]
    fn test_memoization_moves_binding() {
        let mut sc = scope();
        sc.declare(&def(2, "$foo", s("x"))).unwrap();
        sc.resolve_variable(&vn(2, "$foo"), 2).unwrap();
        // Second lookup hits the memo even though the def was consumed.
        assert_eq!(sc.resolve_variable(&vn(2, "$foo"), 2).unwrap(), s("x"));
    }

    #[test]
    fn test_undefined_variable() {
        let mut sc = scope();
        let err = sc.resolve_variable(&vn(1, "$ghost"), 1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error at c.ms:1: Reference to non-defined variable $ghost"
        );
    }

    #[test]
    fn test_undefined_variable_reports_referencing_def_line() {
        // $foo = $bar / $bar = $baz, $baz undefined: the error points at
        // $bar's definition, where the dangling reference sits.
        let mut sc = scope();
        sc.declare(&def(2, "$foo", Value::Var(vn(2, "$bar")))).unwrap();
        sc.declare(&def(3, "$bar", Value::Var(vn(3, "$baz")))).unwrap();
        let err = sc.resolve_variable(&vn(2, "$foo"), 2).unwrap_err();
        match err {
            CompileError::UnresolvableVariable { line, ref name, .. } => {
                assert_eq!(line, 3);
                assert_eq!(name, "$baz");
            }
            other => panic!("expected unresolvable, got {}", other),
        }
    }

    #[test]
    fn test_self_cycle() {
        let mut sc = scope();
        sc.declare(&def(2, "$foo", Value::Var(vn(2, "$foo")))).unwrap();
        let err = sc.resolve_variable(&vn(2, "$foo"), 2).unwrap_err();
        match err {
            CompileError::CyclicVariable {
                line,
                ref name,
                ref cycle,
                ..
            } => {
                assert_eq!(line, 2);
                assert_eq!(name, "$foo");
                assert_eq!(cycle, &vec!["$foo".to_string(), "$foo".to_string()]);
            }
            other => panic!("expected cycle, got {}", other),
        }
    }

    #[test]
    fn test_two_step_cycle() {
        let mut sc = scope();
        sc.declare(&def(2, "$foo", Value::Var(vn(2, "$bar")))).unwrap();
        sc.declare(&def(3, "$bar", Value::Var(vn(3, "$foo")))).unwrap();
        let err = sc.resolve_variable(&vn(2, "$foo"), 2).unwrap_err();
        match err {
            CompileError::CyclicVariable { ref cycle, .. } => {
                assert_eq!(
                    cycle,
                    &vec!["$foo".to_string(), "$bar".to_string(), "$foo".to_string()]
                );
            }
            other => panic!("expected cycle, got {}", other),
        }
    }

    #[test]
    fn test_cycle_through_interpolated_string() {
        let mut sc = scope();
        sc.declare(&def(
            2,
            "$foo",
            Value::Interpolated(InterpolatedString {
                line: 2,
                segments: vec![Segment::Var(vn(2, "$foo"))],
            }),
        ))
        .unwrap();
        let err = sc.resolve_variable(&vn(2, "$foo"), 2).unwrap_err();
        assert!(matches!(err, CompileError::CyclicVariable { line: 2, .. }));
    }

    #[test]
    fn test_cycle_through_array() {
        let mut sc = scope();
        sc.declare(&def(
            2,
            "$a",
            Value::Array(vec![Value::Var(vn(2, "$a"))]),
        ))
        .unwrap();
        let err = sc.resolve_variable(&vn(2, "$a"), 2).unwrap_err();
        assert!(matches!(err, CompileError::CyclicVariable { line: 2, .. }));
    }

    #[test]
    fn test_cycle_through_expression() {
        let mut sc = scope();
        sc.declare(&def(
            2,
            "$n",
            Value::Expr(Box::new(Expression {
                line: 2,
                op: BinOp::Add,
                left: Value::Var(vn(2, "$n")),
                right: Value::Int(1),
            })),
        ))
        .unwrap();
        let err = sc.resolve_variable(&vn(2, "$n"), 2).unwrap_err();
        assert!(matches!(err, CompileError::CyclicVariable { .. }));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        // $a = [$b, $c], both reach $x; memoization makes this legal.
        let mut sc = scope();
        sc.declare(&def(
            2,
            "$a",
            Value::Array(vec![Value::Var(vn(2, "$b")), Value::Var(vn(2, "$c"))]),
        ))
        .unwrap();
        sc.declare(&def(3, "$b", Value::Var(vn(3, "$x")))).unwrap();
        sc.declare(&def(4, "$c", Value::Var(vn(4, "$x")))).unwrap();
        sc.declare(&def(5, "$x", s("deep"))).unwrap();
        assert_eq!(
            sc.resolve_variable(&vn(2, "$a"), 2).unwrap(),
            Value::Array(vec![s("deep"), s("deep")])
        );
    }

    #[test]
    fn test_duplicate_declare() {
        let mut sc = scope();
        sc.declare(&def(2, "$foo", Value::Int(1))).unwrap();
        let err = sc.declare(&def(3, "$foo", s("bar"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error at c.ms:3: Multiple definition for variable $foo"
        );
    }

    #[test]
    fn test_interpolation_concatenates_in_order() {
        let mut sc = scope();
        sc.declare(&def(2, "$foo", s("foostr"))).unwrap();
        sc.declare(&def(3, "$bar", s("barstr"))).unwrap();
        sc.declare(&def(
            4,
            "$baz",
            Value::Interpolated(InterpolatedString {
                line: 4,
                segments: vec![
                    Segment::Var(vn(4, "$foo")),
                    Segment::Literal(" x ".to_string()),
                    Segment::Var(vn(4, "$bar")),
                ],
            }),
        ))
        .unwrap();
        assert_eq!(
            sc.resolve_variable(&vn(4, "$baz"), 4).unwrap(),
            s("foostr x barstr")
        );
    }

    #[test]
    fn test_interpolation_of_non_string_fails() {
        let mut sc = scope();
        sc.declare(&def(2, "$n", Value::Int(8))).unwrap();
        let is = Value::Interpolated(InterpolatedString {
            line: 3,
            segments: vec![Segment::Var(vn(3, "$n"))],
        });
        let err = sc.resolve_value(&is, 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Value of $n can't be interpolated into a string at c.ms:3"
        );
    }

    #[test]
    fn test_reference_scalar_resolution() {
        let mut sc = scope();
        sc.declare(&def(2, "$foo", s("nginx"))).unwrap();
        let r = Value::Ref(Reference {
            line: 3,
            type_name: "package".to_string(),
            scalar: Box::new(Value::Var(vn(3, "$foo"))),
        });
        let resolved = sc.resolve_value(&r, 3).unwrap();
        assert_eq!(
            resolved,
            Value::Ref(Reference {
                line: 3,
                type_name: "package".to_string(),
                scalar: Box::new(s("nginx")),
            })
        );
    }

    #[test]
    fn test_reference_scalar_must_be_string() {
        let mut sc = scope();
        sc.declare(&def(2, "$array", Value::Array(vec![]))).unwrap();
        let r = Value::Ref(Reference {
            line: 9,
            type_name: "file".to_string(),
            scalar: Box::new(Value::Var(vn(9, "$array"))),
        });
        let err = sc.resolve_value(&r, 9).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Reference keys must be strings (got array) at c.ms:9"
        );
    }

    #[test]
    fn test_expression_evaluation_through_variables() {
        let mut sc = scope();
        sc.declare(&def(2, "$number", Value::Int(2))).unwrap();
        // 5 + 6 * $number
        let e = Value::Expr(Box::new(Expression {
            line: 3,
            op: BinOp::Add,
            left: Value::Int(5),
            right: Value::Expr(Box::new(Expression {
                line: 3,
                op: BinOp::Mul,
                left: Value::Int(6),
                right: Value::Var(vn(3, "$number")),
            })),
        }));
        assert_eq!(sc.resolve_value(&e, 3).unwrap(), Value::Int(17));
    }

    #[test]
    fn test_bad_expression_reports_kinds() {
        let mut sc = scope();
        let e = Value::Expr(Box::new(Expression {
            line: 3,
            op: BinOp::Div,
            left: Value::Int(5),
            right: s("notanumber"),
        }));
        let err = sc.resolve_value(&e, 3).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Bad types (int, string) supplied for operation '/' at c.ms:3"
        );
    }

    #[test]
    fn test_bind_args_defaults_and_overrides() {
        let mut sc = scope();
        let params = vec![
            def(1, "$docroot", s("/var/www")),
            def(1, "$workers", Value::Int(8)),
        ];
        let passed = vec![Prop {
            line: 4,
            name: "docroot".to_string(),
            value: s("/home/www"),
        }];
        sc.bind_args(&passed, &params).unwrap();
        assert_eq!(sc.resolve_variable(&vn(1, "$docroot"), 1).unwrap(), s("/home/www"));
        assert_eq!(sc.resolve_variable(&vn(1, "$workers"), 1).unwrap(), Value::Int(8));
    }

    #[test]
    fn test_bind_args_required_missing() {
        let mut sc = scope();
        let params = vec![VariableDef {
            line: 1,
            name: vn(1, "$required"),
            value: None,
        }];
        let err = sc.bind_args(&[], &params).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Required argument 'required' not supplied at site.ms:4"
        );
    }

    #[test]
    fn test_bind_args_unsupported() {
        let mut sc = scope();
        let passed = vec![Prop {
            line: 5,
            name: "undefined".to_string(),
            value: Value::Int(5),
        }];
        let err = sc.bind_args(&passed, &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported argument 'undefined' sent to type at site.ms:5"
        );
    }

    #[test]
    fn test_bind_args_ignores_depends() {
        let mut sc = scope();
        let passed = vec![Prop {
            line: 5,
            name: "depends".to_string(),
            value: Value::Ref(Reference {
                line: 5,
                type_name: "file".to_string(),
                scalar: Box::new(s("x")),
            }),
        }];
        sc.bind_args(&passed, &[]).unwrap();
    }

    #[test]
    fn test_bind_args_duplicate_param() {
        let mut sc = scope();
        let params = vec![def(1, "$foo", Value::Int(4)), def(1, "$foo", Value::Int(5))];
        let err = sc.bind_args(&[], &params).unwrap_err();
        assert!(matches!(err, CompileError::MultipleDefinition { .. }));
    }

    #[test]
    fn test_body_def_clashes_with_param() {
        let mut sc = scope();
        sc.bind_args(&[], &[def(1, "$foo", Value::Int(5))]).unwrap();
        let err = sc.declare(&def(2, "$foo", Value::Int(4))).unwrap_err();
        assert!(matches!(
            err,
            CompileError::MultipleDefinition { line: 2, .. }
        ));
    }

    #[test]
    fn test_literal_string_with_dollar_is_not_resolved() {
        let mut sc = scope();
        sc.declare(&def(2, "$foo", s("x"))).unwrap();
        sc.declare(&def(3, "$bar", s("$foo"))).unwrap();
        assert_eq!(sc.resolve_variable(&vn(3, "$bar"), 3).unwrap(), s("$foo"));
    }

    #[test]
    fn test_nested_array_resolution() {
        let mut sc = scope();
        sc.declare(&def(2, "$foo", s("foo"))).unwrap();
        sc.declare(&def(
            3,
            "$bar",
            Value::Array(vec![Value::Var(vn(3, "$foo")), Value::Int(1), s("z")]),
        ))
        .unwrap();
        sc.declare(&def(
            4,
            "$baz",
            Value::Array(vec![s("baz"), Value::Var(vn(4, "$bar"))]),
        ))
        .unwrap();
        assert_eq!(
            sc.resolve_variable(&vn(4, "$baz"), 4).unwrap(),
            Value::Array(vec![
                s("baz"),
                Value::Array(vec![s("foo"), Value::Int(1), s("z")])
            ])
        );
    }
}
