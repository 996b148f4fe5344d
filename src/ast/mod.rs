//! AST for the mosa manifest language.
//!
//! Built by the parser, consumed by the resolver. Nodes are immutable once
//! parsed. Structural equality deliberately ignores line numbers and
//! filenames so that resolved output can be compared against manifests
//! parsed from expected-output text.

use std::fmt;

// ============================================================================
// Values
// ============================================================================

/// A value as it appears in a manifest: `1`, `'foo'`, `"a $b"`, `$bar`,
/// `[ 1, 'five', ]`, `package[$name]` or a binary expression.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    /// Single-quoted string. No interpolation, no escapes.
    Str(String),
    /// Double-quoted string with `$var` / `${var}` splices.
    Interpolated(InterpolatedString),
    Var(VariableName),
    Array(Vec<Value>),
    Ref(Reference),
    Expr(Box<Expression>),
}

impl Value {
    /// Kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Interpolated(_) => "interpolated string",
            Value::Var(_) => "variable",
            Value::Array(_) => "array",
            Value::Ref(_) => "reference",
            Value::Expr(_) => "expression",
        }
    }

    /// True if no unresolved construct (variable, expression, interpolated
    /// string) remains anywhere in the value.
    pub fn is_concrete(&self) -> bool {
        match self {
            Value::Int(_) | Value::Bool(_) | Value::Str(_) => true,
            Value::Interpolated(_) | Value::Var(_) | Value::Expr(_) => false,
            Value::Array(items) => items.iter().all(Value::is_concrete),
            Value::Ref(r) => matches!(*r.scalar, Value::Str(_)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Interpolated(a), Value::Interpolated(b)) => a == b,
            (Value::Var(a), Value::Var(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Expr(a), Value::Expr(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Interpolated(is) => write!(f, "{}", is),
            Value::Var(v) => write!(f, "{}", v),
            Value::Array(items) => {
                write!(f, "[")?;
                for item in items {
                    write!(f, " {},", item)?;
                }
                write!(f, " ]")
            }
            Value::Ref(r) => write!(f, "{}", r),
            Value::Expr(e) => write!(f, "{}", e),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Array(items) => items.serialize(serializer),
            // References and unresolved constructs serialize as their
            // manifest rendering.
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

/// A lexical `$name` token. The leading `$` is part of the name.
#[derive(Debug, Clone)]
pub struct VariableName {
    pub line: u32,
    pub name: String,
}

impl PartialEq for VariableName {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for VariableName {}

impl fmt::Display for VariableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// One piece of a double-quoted string: either literal text or a variable
/// splice. `"/home/$user/.config"` segments into
/// `[ "/home/", $user, "/.config" ]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Var(VariableName),
}

/// A double-quoted string with its splices kept in source order.
#[derive(Debug, Clone)]
pub struct InterpolatedString {
    pub line: u32,
    pub segments: Vec<Segment>,
}

impl PartialEq for InterpolatedString {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for InterpolatedString {}

impl fmt::Display for InterpolatedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Variables render in the explicit `${name}` form so the output
        // re-lexes to the same segments no matter what follows them.
        write!(f, "\"")?;
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => write!(f, "{}", s)?,
                Segment::Var(v) => write!(f, "${{{}}}", &v.name[1..])?,
            }
        }
        write!(f, "\"")
    }
}

/// A citation of another resource, e.g. `package['nginx']` or
/// `package[$webserver]`.
#[derive(Debug, Clone)]
pub struct Reference {
    pub line: u32,
    pub type_name: String,
    pub scalar: Box<Value>,
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.scalar == other.scalar
    }
}

impl Eq for Reference {}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.type_name, self.scalar)
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A binary expression tree, e.g. `$foo + 5` or `1 == 2`. Operands may be
/// nested expressions or leaf values.
#[derive(Debug, Clone)]
pub struct Expression {
    pub line: u32,
    pub op: BinOp,
    pub left: Value,
    pub right: Value,
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.left == other.left && self.right == other.right
    }
}

impl Eq for Expression {}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Always parenthesized; re-parsing yields the identical tree.
        write!(f, "({} {} {})", self.left, self.op, self.right)
    }
}

// ============================================================================
// Statements
// ============================================================================

/// A `$name = value` binding. `value` is `None` only for parameters
/// without a default, which makes them required at realization time.
#[derive(Debug, Clone)]
pub struct VariableDef {
    pub line: u32,
    pub name: VariableName,
    pub value: Option<Value>,
}

impl PartialEq for VariableDef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl Eq for VariableDef {}

impl fmt::Display for VariableDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{} = {}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// A named argument in a declaration, e.g. `ensure => 'latest'`.
#[derive(Debug, Clone)]
pub struct Prop {
    pub line: u32,
    pub name: String,
    pub value: Value,
}

impl PartialEq for Prop {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl Eq for Prop {}

impl fmt::Display for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.name, self.value)
    }
}

/// A realization of a type, e.g. `package { 'nginx': ensure => 'latest', }`.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub file: String,
    pub line: u32,
    pub type_name: String,
    pub scalar: Value,
    pub props: Vec<Prop>,
}

impl PartialEq for Declaration {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.scalar == other.scalar
            && self.props == other.props
    }
}

impl Eq for Declaration {}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{ {}:", self.type_name, self.scalar)?;
        for prop in &self.props {
            write!(f, " {},", prop)?;
        }
        write!(f, " }}")
    }
}

/// `if cond { … } else { … }`. The condition must resolve to a bool.
#[derive(Debug, Clone)]
pub struct If {
    pub line: u32,
    pub condition: Value,
    pub then_block: Block,
    pub else_block: Option<Block>,
}

impl PartialEq for If {
    fn eq(&self, other: &Self) -> bool {
        self.condition == other.condition
            && self.then_block == other.then_block
            && self.else_block == other.else_block
    }
}

impl Eq for If {}

/// One statement in a block body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Var(VariableDef),
    Decl(Declaration),
    If(If),
}

/// An ordered statement list with its source location.
#[derive(Debug, Clone)]
pub struct Block {
    pub file: String,
    pub line: u32,
    pub statements: Vec<Statement>,
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.statements == other.statements
    }
}

impl Eq for Block {}

// ============================================================================
// Top-level items
// ============================================================================

/// A named, parameterized bundle of declarations.
#[derive(Debug, Clone)]
pub struct Class {
    pub file: String,
    pub line: u32,
    pub name: String,
    pub params: Vec<VariableDef>,
    pub body: Block,
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.params == other.params && self.body == other.body
    }
}

impl Eq for Class {}

/// Whether a define receives one name (`$name`) or a fan-in list
/// (`$names`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineKind {
    Single,
    Multiple,
}

/// A user-defined type: a parameterized template expanded at realization.
#[derive(Debug, Clone)]
pub struct Define {
    pub file: String,
    pub line: u32,
    pub name: String,
    pub kind: DefineKind,
    pub params: Vec<VariableDef>,
    pub body: Block,
}

impl PartialEq for Define {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.params == other.params
            && self.body == other.body
    }
}

impl Eq for Define {}

/// A per-host entry point.
#[derive(Debug, Clone)]
pub struct Node {
    pub file: String,
    pub line: u32,
    pub name: String,
    pub body: Block,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.body == other.body
    }
}

impl Eq for Node {}

// ============================================================================
// Manifest collector
// ============================================================================

/// Accumulates the classes, defines and nodes of one compilation. Multiple
/// files parse into the same collector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub classes: Vec<Class>,
    pub defines: Vec<Define>,
    pub nodes: Vec<Node>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the manifest back to parseable source text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for class in &self.classes {
            render_class(&mut out, class);
        }
        for define in &self.defines {
            let kind = match define.kind {
                DefineKind::Single => "single",
                DefineKind::Multiple => "multiple",
            };
            out.push_str(&format!("define {} {}(", kind, define.name));
            for param in &define.params {
                out.push_str(&format!("{}, ", param));
            }
            out.push_str(") ");
            render_block(&mut out, &define.body, 0);
            out.push('\n');
        }
        for node in &self.nodes {
            out.push_str(&format!("node '{}' ", node.name));
            render_block(&mut out, &node.body, 0);
            out.push('\n');
        }
        out
    }
}

fn render_class(out: &mut String, class: &Class) {
    out.push_str(&format!("class {}(", class.name));
    for param in &class.params {
        out.push_str(&format!("{}, ", param));
    }
    out.push_str(") ");
    render_block(out, &class.body, 0);
    out.push('\n');
}

fn render_block(out: &mut String, block: &Block, depth: usize) {
    let pad = "\t".repeat(depth + 1);
    out.push_str("{\n");
    for stmt in &block.statements {
        match stmt {
            Statement::Var(def) => out.push_str(&format!("{}{}\n", pad, def)),
            Statement::Decl(decl) => {
                out.push_str(&format!("{}{} {{ {}:", pad, decl.type_name, decl.scalar));
                for prop in &decl.props {
                    out.push_str(&format!(" {},", prop));
                }
                out.push_str(" }\n");
            }
            Statement::If(i) => {
                out.push_str(&format!("{}if {} ", pad, i.condition));
                render_block(out, &i.then_block, depth + 1);
                if let Some(els) = &i.else_block {
                    out.push_str(" else ");
                    render_block(out, els, depth + 1);
                }
                out.push('\n');
            }
        }
    }
    out.push_str(&"\t".repeat(depth));
    out.push('}');
}
