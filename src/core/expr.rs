//! Binary operator semantics.
//!
//! Operands are already resolved to concrete values when they arrive here.
//! The operator table:
//!
//! | op            | operands                  | result |
//! |---------------|---------------------------|--------|
//! | `+`           | int+int, string+string    | same   |
//! | `-` `*` `/`   | int+int                   | int    |
//! | `==` `!=`     | int, string, bool, array  | bool   |
//! | `<` `<=` `>` `>=` | int+int, string+string | bool  |
//! | `&&` `\|\|`   | bool+bool                 | bool   |
//!
//! Anything else is a type error reported with both operand kinds.

use crate::ast::{BinOp, Value};

/// Operand kinds of a failed application, in (lhs, rhs) order.
pub type TypeMismatch = (&'static str, &'static str);

/// Apply a binary operator. Integer division truncates toward zero;
/// division by zero is reported as a type mismatch rather than a crash.
pub fn apply(op: BinOp, left: &Value, right: &Value) -> Result<Value, TypeMismatch> {
    let mismatch = || Err((left.kind(), right.kind()));

    match op {
        BinOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
            _ => mismatch(),
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            _ => mismatch(),
        },
        BinOp::Mul => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            _ => mismatch(),
        },
        BinOp::Div => match (left, right) {
            (Value::Int(_), Value::Int(0)) => mismatch(),
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a / b)),
            _ => mismatch(),
        },
        BinOp::Eq | BinOp::Ne => {
            let equal = match (left, right) {
                (Value::Int(a), Value::Int(b)) => a == b,
                (Value::Str(a), Value::Str(b)) => a == b,
                (Value::Bool(a), Value::Bool(b)) => a == b,
                (Value::Array(a), Value::Array(b)) => a == b,
                _ => return mismatch(),
            };
            Ok(Value::Bool(if op == BinOp::Eq { equal } else { !equal }))
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (left, right) {
                (Value::Int(a), Value::Int(b)) => a.cmp(b),
                (Value::Str(a), Value::Str(b)) => a.cmp(b),
                _ => return mismatch(),
            };
            let result = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::And => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a && *b)),
            _ => mismatch(),
        },
        BinOp::Or => match (left, right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(*a || *b)),
            _ => mismatch(),
        },
    }
}
