//! Constant folding of closed sub-trees.
//!
//! Anything that does not reference a lambda parameter or join alias is
//! evaluated once, at translation time, and becomes a literal.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::FlowError;
use crate::expression::{BinaryOp, Expr, MethodCall, UnaryOp};
use crate::value::{DataType, Value};

/// Evaluates `expr` to a value
///
/// # Errors
///
/// - `NotSupported` when the tree references a parameter or uses an unknown method
/// - `InvalidOperation` for runtime failures such as division by zero
pub fn evaluate(expr: &Expr) -> Result<Value, FlowError> {
    match expr {
        Expr::Constant { value, .. } => Ok(value.clone()),
        Expr::Default(ty) => Ok(ty.default_value()),
        Expr::Parameter(p) => Err(FlowError::not_supported(format!(
            "parameter '{}' cannot be evaluated to a constant",
            p.name
        ))),
        Expr::Lambda(_) => Err(FlowError::not_supported(
            "a lambda cannot be evaluated to a constant",
        )),
        Expr::Member { target, name, .. } => member(evaluate(target)?, name),
        Expr::Call(call) => method_call(call),
        Expr::Binary { op, left, right, .. } => binary(*op, left, right),
        Expr::Unary { op, operand, ty } => {
            let value = evaluate(operand)?;
            match op {
                UnaryOp::Not => match value {
                    Value::Null => Ok(Value::Null),
                    other => truth(&other).map(|b| Value::Bool(!b)),
                },
                UnaryOp::Negate => negate(value),
                UnaryOp::Convert => value.convert_to(ty),
            }
        }
        Expr::Conditional {
            test,
            if_true,
            if_false,
            ..
        } => {
            if truth(&evaluate(test)?)? {
                evaluate(if_true)
            } else {
                evaluate(if_false)
            }
        }
        Expr::New { members, .. } => {
            let mut object = BTreeMap::new();
            for (name, member) in members {
                object.insert(name.clone(), evaluate(member)?);
            }
            Ok(Value::Object(object))
        }
        Expr::Invoke { target, args, .. } => match evaluate(target)? {
            Value::Callable(callable) => {
                let args = args.iter().map(evaluate).collect::<Result<Vec<_>, _>>()?;
                callable.call(&args)
            }
            other => Err(FlowError::not_supported(format!(
                "cannot invoke {other:?}"
            ))),
        },
    }
}

fn truth(value: &Value) -> Result<bool, FlowError> {
    value
        .as_bool()
        .ok_or_else(|| FlowError::invalid_operation(format!("{value:?} is not a boolean")))
}

fn member(target: Value, name: &str) -> Result<Value, FlowError> {
    match target {
        Value::Object(mut map) => map
            .remove(name)
            .ok_or_else(|| FlowError::invalid_operation(format!("object has no member '{name}'"))),
        Value::String(s) if name == "length" => Ok(Value::Int(s.chars().count() as i32)),
        Value::List(items) if name == "length" => Ok(Value::Int(items.len() as i32)),
        Value::Null => Err(FlowError::invalid_operation(format!(
            "member '{name}' accessed on null"
        ))),
        other => Err(FlowError::not_supported(format!(
            "member '{name}' of {other:?}"
        ))),
    }
}

fn method_call(call: &MethodCall) -> Result<Value, FlowError> {
    let subject = call
        .subject()
        .ok_or_else(|| FlowError::invalid_argument(format!("'{}' has no subject", call.method)))?;
    let subject = evaluate(subject)?;
    let args = call
        .operands()
        .iter()
        .map(evaluate)
        .collect::<Result<Vec<_>, _>>()?;

    let string_arg = |i: usize| -> Result<&str, FlowError> {
        args.get(i).and_then(Value::as_str).ok_or_else(|| {
            FlowError::invalid_argument(format!("'{}' expects a string argument", call.method))
        })
    };
    let int_arg = |i: usize| -> Result<Option<usize>, FlowError> {
        match args.get(i) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| {
                    FlowError::invalid_argument(format!(
                        "'{}' expects a non-negative integer",
                        call.method
                    ))
                }),
        }
    };

    match (call.method.as_str(), &subject) {
        ("contains", Value::List(items)) => {
            let needle = args.first().cloned().unwrap_or(Value::Null);
            Ok(Value::Bool(items.iter().any(|v| v.loose_eq(&needle))))
        }
        ("contains", Value::String(s)) => Ok(Value::Bool(s.contains(string_arg(0)?))),
        ("starts_with", Value::String(s)) => Ok(Value::Bool(s.starts_with(string_arg(0)?))),
        ("ends_with", Value::String(s)) => Ok(Value::Bool(s.ends_with(string_arg(0)?))),
        ("substring", Value::String(s)) => {
            let start = int_arg(0)?.unwrap_or(0);
            let chars = s.chars().skip(start);
            let out: String = match int_arg(1)? {
                Some(len) => chars.take(len).collect(),
                None => chars.collect(),
            };
            Ok(Value::String(out))
        }
        ("trim", Value::String(s)) => Ok(Value::String(s.trim().to_string())),
        ("trim_start", Value::String(s)) => Ok(Value::String(s.trim_start().to_string())),
        ("trim_end", Value::String(s)) => Ok(Value::String(s.trim_end().to_string())),
        ("to_upper", Value::String(s)) => Ok(Value::String(s.to_uppercase())),
        ("to_lower", Value::String(s)) => Ok(Value::String(s.to_lowercase())),
        ("round", value) if value.is_numeric() => {
            let digits = int_arg(0)?.unwrap_or(0) as u32;
            value
                .as_decimal()
                .map(|d| Value::Decimal(d.round_dp(digits)))
                .ok_or_else(|| FlowError::invalid_operation("round of a non-finite number"))
        }
        (method, value) => Err(FlowError::not_supported(format!(
            "method '{method}' cannot be evaluated on {value:?}"
        ))),
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, FlowError> {
    match op {
        BinaryOp::AndAlso => {
            if !truth(&evaluate(left)?)? {
                return Ok(Value::Bool(false));
            }
            return evaluate(right).and_then(|v| truth(&v)).map(Value::Bool);
        }
        BinaryOp::OrElse => {
            if truth(&evaluate(left)?)? {
                return Ok(Value::Bool(true));
            }
            return evaluate(right).and_then(|v| truth(&v)).map(Value::Bool);
        }
        _ => {}
    }

    let l = evaluate(left)?;
    let r = evaluate(right)?;
    match op {
        BinaryOp::ExclusiveOr => Ok(Value::Bool(truth(&l)? ^ truth(&r)?)),
        BinaryOp::Equal => Ok(Value::Bool(l.loose_eq(&r))),
        BinaryOp::NotEqual => Ok(Value::Bool(!l.loose_eq(&r))),
        BinaryOp::GreaterThan => ordered(&l, &r, |o| o == Ordering::Greater),
        BinaryOp::GreaterThanOrEqual => ordered(&l, &r, |o| o != Ordering::Less),
        BinaryOp::LessThan => ordered(&l, &r, |o| o == Ordering::Less),
        BinaryOp::LessThanOrEqual => ordered(&l, &r, |o| o != Ordering::Greater),
        _ => arithmetic(op, l, r),
    }
}

fn ordered(l: &Value, r: &Value, test: impl Fn(Ordering) -> bool) -> Result<Value, FlowError> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Bool(false));
    }
    l.compare(r)
        .map(|o| Value::Bool(test(o)))
        .ok_or_else(|| FlowError::invalid_operation(format!("cannot order {l:?} and {r:?}")))
}

fn arithmetic(op: BinaryOp, l: Value, r: Value) -> Result<Value, FlowError> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    if op == BinaryOp::Add && (l.as_str().is_some() || r.as_str().is_some()) {
        return Ok(Value::String(format!("{l}{r}")));
    }
    if !l.is_numeric() || !r.is_numeric() {
        return Err(FlowError::invalid_operation(format!(
            "arithmetic on {l:?} and {r:?}"
        )));
    }

    let overflow = || FlowError::invalid_operation("arithmetic overflow");
    let by_zero = || FlowError::invalid_operation("division by zero");

    match l.data_type().promote(&r.data_type()) {
        DataType::Double => {
            let (a, b) = (l.as_f64().unwrap_or_default(), r.as_f64().unwrap_or_default());
            Ok(Value::Double(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => a / b,
                _ => a % b,
            }))
        }
        DataType::Decimal => {
            let (a, b) = (
                l.as_decimal().ok_or_else(overflow)?,
                r.as_decimal().ok_or_else(overflow)?,
            );
            if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b == Decimal::ZERO {
                return Err(by_zero());
            }
            let out = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide => a.checked_div(b),
                _ => a.checked_rem(b),
            };
            out.map(Value::Decimal).ok_or_else(overflow)
        }
        ty => {
            let (a, b) = (l.as_i64().ok_or_else(overflow)?, r.as_i64().ok_or_else(overflow)?);
            if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b == 0 {
                return Err(by_zero());
            }
            let out = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Subtract => a.checked_sub(b),
                BinaryOp::Multiply => a.checked_mul(b),
                BinaryOp::Divide => a.checked_div(b),
                _ => a.checked_rem(b),
            }
            .ok_or_else(overflow)?;
            if ty == DataType::Int {
                i32::try_from(out).map(Value::Int).map_err(|_| overflow())
            } else {
                Ok(Value::Long(out))
            }
        }
    }
}

fn negate(value: Value) -> Result<Value, FlowError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => Ok(Value::Int(-i)),
        Value::Long(i) => Ok(Value::Long(-i)),
        Value::Double(d) => Ok(Value::Double(-d)),
        Value::Decimal(d) => Ok(Value::Decimal(-d)),
        other => Err(FlowError::invalid_operation(format!("cannot negate {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Callable;

    #[test]
    fn test_arithmetic_promotes() {
        let e = Expr::constant(2) * Expr::constant(3i64) + Expr::constant(1);
        assert_eq!(evaluate(&e).unwrap(), Value::Long(7));
        let e = Expr::constant(1) + Expr::constant(0.5);
        assert_eq!(evaluate(&e).unwrap(), Value::Double(1.5));
    }

    #[test]
    fn test_integer_division_by_zero() {
        let e = Expr::constant(1) / Expr::constant(0);
        assert!(matches!(evaluate(&e), Err(FlowError::InvalidOperation(_))));
    }

    #[test]
    fn test_string_methods() {
        let e = Expr::constant("  Hello ").trim().substring(1, 3);
        assert_eq!(evaluate(&e).unwrap(), Value::String("ell".into()));
        let e = Expr::constant("abc").starts_with("ab");
        assert_eq!(evaluate(&e).unwrap(), Value::Bool(true));
        assert_eq!(
            evaluate(&(Expr::constant("a") + 1)).unwrap(),
            Value::String("a1".into())
        );
    }

    #[test]
    fn test_short_circuit_skips_failing_branch() {
        let failing = Expr::constant(1) / Expr::constant(0);
        let e = Expr::constant(false).and(failing.eq(1));
        assert_eq!(evaluate(&e).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_member_of_object_and_invoke() {
        let obj = Expr::object([("x", Expr::constant(4))]);
        assert_eq!(evaluate(&obj.get("x")).unwrap(), Value::Int(4));

        let twice = Callable::new(|args| Ok(Value::Long(args[0].as_i64().unwrap_or(0) * 2)));
        let e = Expr::constant(twice).invoke(vec![Expr::constant(21)]);
        assert_eq!(evaluate(&e).unwrap(), Value::Long(42));
    }

    #[test]
    fn test_parameters_are_not_constant() {
        let e = Expr::param::<i32>("x") + 1;
        assert!(evaluate(&e).unwrap_err().is_not_supported());
    }
}
