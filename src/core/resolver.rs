//! Semantic resolver: manifest AST → flat list of concrete declarations.
//!
//! Setup registers every class, define and node by name (the built-in
//! `exec` define included) and rejects duplicates. Each node body is then
//! evaluated like a top-level class: blocks walk their statements in
//! source order, declarations resolve their scalar and props against the
//! local scope, and realizing a class or define recurses with a fresh
//! scope. A global realization table locks every `(type, item)` pair the
//! first time it is realized, so the second attempt fails pointing at
//! both sites. Output order is the depth-first realization order.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::ast::*;
use crate::core::scope::Scope;
use crate::error::CompileError;

/// Resolve the whole manifest into concrete declarations. All values in
/// the returned declarations are concrete; realizing the same `(type,
/// item)` twice, or any unresolved/ill-typed construct, aborts with the
/// first error.
///
/// For example, a `Webserver` class realized with `docroot => '/home/www'`
/// emits its `package`, `file` and `service` declarations with every
/// variable replaced by its value, in the order they were realized.
pub fn resolve(manifest: &Manifest) -> Result<Vec<Declaration>, CompileError> {
    let exec = builtin_exec();
    let registry = Registry::build(manifest, &exec)?;

    let mut realized = Realized::default();
    for node in &manifest.nodes {
        // A node body behaves like a class body realized from nowhere.
        let mut scope = Scope::new(&node.file, "", 0);
        resolve_block(&registry, &mut realized, &mut scope, &node.body, true)?;
    }

    check_declarations(&realized.output)?;
    Ok(realized.output)
}

/// The built-in `exec` type: required `$name`, optional `$stdin` and
/// `$unless`. The late pass holds `unless` to string values.
fn builtin_exec() -> Define {
    let var = |name: &str| VariableName {
        line: 0,
        name: name.to_string(),
    };
    Define {
        file: "<builtin>".to_string(),
        line: 0,
        name: "exec".to_string(),
        kind: DefineKind::Single,
        params: vec![
            VariableDef {
                line: 0,
                name: var("$name"),
                value: None,
            },
            VariableDef {
                line: 0,
                name: var("$stdin"),
                value: Some(Value::Bool(false)),
            },
            VariableDef {
                line: 0,
                name: var("$unless"),
                value: Some(Value::Str(String::new())),
            },
        ],
        body: Block {
            file: "<builtin>".to_string(),
            line: 0,
            statements: Vec::new(),
        },
    }
}

/// Classes and defines by name. Built once per compilation, read-only
/// afterwards.
struct Registry<'a> {
    classes: HashMap<&'a str, &'a Class>,
    defines: HashMap<&'a str, &'a Define>,
}

impl<'a> Registry<'a> {
    fn build(manifest: &'a Manifest, exec: &'a Define) -> Result<Self, CompileError> {
        let mut classes: HashMap<&str, &Class> = HashMap::new();
        for class in &manifest.classes {
            if let Some(existing) = classes.insert(&class.name, class) {
                return Err(CompileError::RedefinedClass {
                    name: class.name.clone(),
                    file: class.file.clone(),
                    line: class.line,
                    prev_file: existing.file.clone(),
                    prev_line: existing.line,
                });
            }
        }

        let mut defines: HashMap<&str, &Define> = HashMap::new();
        defines.insert("exec", exec);
        for define in &manifest.defines {
            if let Some(existing) = defines.get(define.name.as_str()) {
                return Err(CompileError::RedefinedDefine {
                    name: define.name.clone(),
                    file: define.file.clone(),
                    line: define.line,
                    prev_file: existing.file.clone(),
                    prev_line: existing.line,
                });
            }

            let key = match define.kind {
                DefineKind::Single => "$name",
                DefineKind::Multiple => "$names",
            };
            if !define.params.iter().any(|p| p.name.name == key) {
                return Err(CompileError::MissingNameParam {
                    key,
                    type_name: define.name.clone(),
                    file: define.file.clone(),
                    line: define.line,
                });
            }

            defines.insert(&define.name, define);
        }

        let mut nodes: HashMap<&str, &Node> = HashMap::new();
        for node in &manifest.nodes {
            if let Some(existing) = nodes.insert(&node.name, node) {
                return Err(CompileError::RedefinedNode {
                    name: node.name.clone(),
                    file: node.file.clone(),
                    line: node.line,
                    prev_file: existing.file.clone(),
                    prev_line: existing.line,
                });
            }
        }

        Ok(Registry { classes, defines })
    }
}

/// Mutable compilation state: the realization locks and the ordered
/// output.
#[derive(Default)]
struct Realized {
    /// First realization site per `(type, item)`.
    locks: HashMap<(String, String), (String, u32)>,

    /// Fully-resolved declarations in realization (DFS) order.
    output: Vec<Declaration>,
}

impl Realized {
    /// Test-and-set a realization key. Returns the prior site if the key
    /// was already taken.
    fn lock(&mut self, type_name: &str, item: &str, file: &str, line: u32) -> Option<(String, u32)> {
        match self
            .locks
            .entry((type_name.to_string(), item.to_string()))
        {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert((file.to_string(), line));
                None
            }
        }
    }
}

/// Walk one block. Variable definitions are collected first and resolved
/// lazily; declarations and ifs run in source order; a final pass forces
/// any definition nothing used, so its errors still surface.
fn resolve_block(
    registry: &Registry,
    realized: &mut Realized,
    scope: &mut Scope,
    block: &Block,
    allow_class_realization: bool,
) -> Result<(), CompileError> {
    for stmt in &block.statements {
        if let Statement::Var(def) = stmt {
            scope.declare(def)?;
        }
    }

    for stmt in &block.statements {
        match stmt {
            Statement::Var(_) => {}
            Statement::If(i) => {
                resolve_if(registry, realized, scope, i, allow_class_realization)?
            }
            Statement::Decl(decl) => {
                resolve_declaration(registry, realized, scope, decl, allow_class_realization)?
            }
        }
    }

    for stmt in &block.statements {
        if let Statement::Var(def) = stmt {
            scope.resolve_variable(&def.name, def.line)?;
        }
    }

    Ok(())
}

fn resolve_if(
    registry: &Registry,
    realized: &mut Realized,
    scope: &mut Scope,
    i: &If,
    allow_class_realization: bool,
) -> Result<(), CompileError> {
    let condition = scope.resolve_value(&i.condition, i.line)?;
    let truthy = match condition {
        Value::Bool(b) => b,
        _ => {
            return Err(CompileError::BadIfCondition {
                file: i.then_block.file.clone(),
                line: i.line,
            })
        }
    };

    if truthy {
        resolve_block(registry, realized, scope, &i.then_block, allow_class_realization)
    } else if let Some(else_block) = &i.else_block {
        resolve_block(registry, realized, scope, else_block, allow_class_realization)
    } else {
        Ok(())
    }
}

/// Resolve and realize one declaration. An array scalar fans out into one
/// realization per element; each element locks its own `(type, item)`
/// key.
fn resolve_declaration(
    registry: &Registry,
    realized: &mut Realized,
    scope: &mut Scope,
    decl: &Declaration,
    allow_class_realization: bool,
) -> Result<(), CompileError> {
    let scalar = scope.resolve_value(&decl.scalar, decl.line)?;
    let props = scope.resolve_props(&decl.props)?;

    let bad_scalar = || CompileError::BadScalar {
        type_name: decl.type_name.clone(),
        file: decl.file.clone(),
        line: decl.line,
    };
    let names = match scalar {
        Value::Str(name) => vec![name],
        Value::Array(items) => {
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Str(name) => names.push(name),
                    _ => return Err(bad_scalar()),
                }
            }
            names
        }
        _ => return Err(bad_scalar()),
    };

    for name in names {
        if let Some((prev_file, prev_line)) = realized.lock(&decl.type_name, &name, &decl.file, decl.line)
        {
            return Err(CompileError::DoubleRealization {
                type_name: decl.type_name.clone(),
                item: name,
                file: decl.file.clone(),
                line: decl.line,
                prev_file,
                prev_line,
            });
        }

        if decl.type_name == "class" {
            if !allow_class_realization {
                return Err(CompileError::ClassInsideDefine {
                    file: decl.file.clone(),
                    line: decl.line,
                });
            }
            let class = match registry.classes.get(name.as_str()) {
                Some(class) => *class,
                None => {
                    return Err(CompileError::UndefinedClass {
                        name,
                        file: decl.file.clone(),
                        line: decl.line,
                    })
                }
            };
            realize_class(registry, realized, class, &props, &decl.file, decl.line)?;
        } else {
            let define = match registry.defines.get(decl.type_name.as_str()) {
                Some(define) => *define,
                None => {
                    return Err(CompileError::UndefinedType {
                        name: decl.type_name.clone(),
                        file: decl.file.clone(),
                        line: decl.line,
                    })
                }
            };
            realize_define(registry, realized, define, &name, &props, &decl.file, decl.line)?;

            realized.output.push(Declaration {
                file: decl.file.clone(),
                line: decl.line,
                type_name: decl.type_name.clone(),
                scalar: Value::Str(name),
                props: props.clone(),
            });
        }
    }

    Ok(())
}

fn realize_class(
    registry: &Registry,
    realized: &mut Realized,
    class: &Class,
    args: &[Prop],
    caller_file: &str,
    caller_line: u32,
) -> Result<(), CompileError> {
    let mut scope = Scope::new(&class.file, caller_file, caller_line);
    scope.bind_args(args, &class.params)?;
    resolve_block(registry, realized, &mut scope, &class.body, true)
}

fn realize_define(
    registry: &Registry,
    realized: &mut Realized,
    define: &Define,
    item: &str,
    args: &[Prop],
    caller_file: &str,
    caller_line: u32,
) -> Result<(), CompileError> {
    let name_key = match define.kind {
        DefineKind::Single => "name",
        DefineKind::Multiple => "names",
    };
    for arg in args {
        if arg.name == name_key {
            return Err(CompileError::ReservedArgument {
                name: name_key,
                file: caller_file.to_string(),
                line: arg.line,
            });
        }
    }

    // The realization name binds as $name / $names.
    let mut full_args = args.to_vec();
    full_args.push(Prop {
        line: 0,
        name: name_key.to_string(),
        value: Value::Str(item.to_string()),
    });

    let mut scope = Scope::new(&define.file, caller_file, caller_line);
    scope.bind_args(&full_args, &define.params)?;
    resolve_block(registry, realized, &mut scope, &define.body, false)
}

/// Type-specific constraints the parameter system can't express. Today:
/// exec's `unless` must be a quoted string.
fn check_declarations(declarations: &[Declaration]) -> Result<(), CompileError> {
    for decl in declarations {
        if decl.type_name != "exec" {
            continue;
        }
        for prop in &decl.props {
            if prop.name == "unless" && !matches!(prop.value, Value::Str(_)) {
                return Err(CompileError::BadPropType {
                    param: "unless",
                    file: decl.file.clone(),
                    line: prop.line,
                });
            }
        }
    }
    Ok(())
}
