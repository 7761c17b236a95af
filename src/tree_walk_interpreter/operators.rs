use crate::{
    ast::{InfixOperator, UnaryOperator},
    error::{keys, HplError},
};

use super::Value;

fn require_numeric(op: InfixOperator, left: &Value, right: &Value) -> Result<(), HplError> {
    for operand in [left, right] {
        if !operand.is_numeric() {
            return Err(HplError::type_error(format!(
                "Unsupported operand type for {op}: '{}' (expected number)",
                operand.type_name()
            ))
            .with_key(keys::TYPE_INVALID_OPERATION));
        }
    }
    Ok(())
}

fn overflow(op: InfixOperator) -> HplError {
    HplError::value(format!("Integer overflow in {op}"))
}

fn floored_rem_i64(a: i64, b: i64) -> Option<i64> {
    let r = a.checked_rem(b)?;
    Some(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
}

fn floored_rem_f64(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn is_zero(value: &Value) -> bool {
    value.as_f64() == Some(0.0)
}

/// Applies every infix operator except the logical ones, which short-circuit.
pub fn binary(op: InfixOperator, left: Value, right: Value) -> Result<Value, HplError> {
    match op {
        InfixOperator::Equal => Ok(Value::Bool(left == right)),
        InfixOperator::NotEqual => Ok(Value::Bool(left != right)),
        InfixOperator::Plus => add(left, right),
        InfixOperator::LessThan
        | InfixOperator::LessThanOrEqual
        | InfixOperator::GreaterThan
        | InfixOperator::GreaterThanOrEqual => compare(op, &left, &right),
        InfixOperator::Minus | InfixOperator::Multiply => {
            require_numeric(op, &left, &right)?;
            match (left, right) {
                (Value::Int(a), Value::Int(b)) => {
                    let result = if op == InfixOperator::Minus {
                        a.checked_sub(b)
                    } else {
                        a.checked_mul(b)
                    };
                    result.map(Value::Int).ok_or_else(|| overflow(op))
                }
                (a, b) => {
                    let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
                    Ok(Value::Float(if op == InfixOperator::Minus {
                        a - b
                    } else {
                        a * b
                    }))
                }
            }
        }
        InfixOperator::Divide => {
            require_numeric(op, &left, &right)?;
            if is_zero(&right) {
                return Err(HplError::division("Division by zero")
                    .with_hint("add a check first: if (divisor != 0): result = dividend / divisor"));
            }
            let (a, b) = (
                left.as_f64().unwrap_or_default(),
                right.as_f64().unwrap_or_default(),
            );
            Ok(Value::Float(a / b))
        }
        InfixOperator::Modulo => {
            require_numeric(op, &left, &right)?;
            if is_zero(&right) {
                return Err(HplError::division("Modulo by zero")
                    .with_hint("add a check first: if (divisor != 0): result = dividend % divisor"));
            }
            match (left, right) {
                (Value::Int(a), Value::Int(b)) => floored_rem_i64(a, b)
                    .map(Value::Int)
                    .ok_or_else(|| overflow(op)),
                (a, b) => Ok(Value::Float(floored_rem_f64(
                    a.as_f64().unwrap_or_default(),
                    b.as_f64().unwrap_or_default(),
                ))),
            }
        }
        InfixOperator::And | InfixOperator::Or => Err(HplError::runtime(format!(
            "Operator {op} must be evaluated lazily"
        ))),
    }
}

fn add(left: Value, right: Value) -> Result<Value, HplError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(b)
            .map(Value::Int)
            .ok_or_else(|| overflow(InfixOperator::Plus)),
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(Value::Float(
            a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default(),
        )),
        (Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (a, b) => Ok(Value::Str(format!("{a}{b}"))),
    }
}

fn compare(op: InfixOperator, left: &Value, right: &Value) -> Result<Value, HplError> {
    require_numeric(op, left, right)?;
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (a, b) => a
            .as_f64()
            .unwrap_or_default()
            .partial_cmp(&b.as_f64().unwrap_or_default()),
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        InfixOperator::LessThan => ordering.is_lt(),
        InfixOperator::LessThanOrEqual => ordering.is_le(),
        InfixOperator::GreaterThan => ordering.is_gt(),
        _ => ordering.is_ge(),
    }))
}

pub fn unary(op: UnaryOperator, operand: Value) -> Result<Value, HplError> {
    match (op, operand) {
        (UnaryOperator::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOperator::Not, other) => Err(HplError::type_error(format!(
            "Logical NOT requires boolean operand, got {}",
            other.type_name()
        ))),
        (UnaryOperator::Negate, Value::Int(n)) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| HplError::value("Integer overflow in negation")),
        (UnaryOperator::Negate, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOperator::Negate, other) => Err(HplError::type_error(format!(
            "Cannot negate {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    fn list(items: &[i64]) -> Value {
        Value::list(items.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_plus_semantics() {
        assert_eq!(
            binary(InfixOperator::Plus, Value::Int(2), Value::Float(0.5)).unwrap(),
            Value::Float(2.5)
        );
        let joined = binary(InfixOperator::Plus, list(&[1, 2]), list(&[3])).unwrap();
        assert_eq!(joined, list(&[1, 2, 3]));
        assert_eq!(
            binary(InfixOperator::Plus, Value::str("hp: "), Value::Int(10)).unwrap(),
            Value::str("hp: 10")
        );
        assert_eq!(
            binary(InfixOperator::Plus, Value::Null, Value::Bool(true)).unwrap(),
            Value::str("nulltrue")
        );
    }

    #[test]
    fn test_zero_divisor_is_division_kind() {
        for op in [InfixOperator::Divide, InfixOperator::Modulo] {
            for zero in [Value::Int(0), Value::Float(0.0)] {
                let err = binary(op, Value::Int(7), zero.clone()).unwrap_err();
                assert_eq!(err.kind, ErrorKind::Division);
                assert!(!err.hints.is_empty());
            }
        }
    }

    #[test]
    fn test_non_numeric_operands_are_type_errors() {
        for op in [
            InfixOperator::Minus,
            InfixOperator::Multiply,
            InfixOperator::Divide,
            InfixOperator::Modulo,
            InfixOperator::LessThan,
            InfixOperator::GreaterThanOrEqual,
        ] {
            let err = binary(op, Value::str("a"), Value::Int(0)).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Type);
            assert!(err.message.contains("'string'"));
        }
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(
            binary(InfixOperator::Divide, Value::Int(7), Value::Int(2)).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            binary(InfixOperator::Modulo, Value::Int(-7), Value::Int(3)).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            binary(InfixOperator::LessThanOrEqual, Value::Int(2), Value::Float(2.0)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(InfixOperator::Equal, list(&[1]), list(&[1])).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary(UnaryOperator::Not, Value::Bool(false)).unwrap(), Value::Bool(true));
        assert_eq!(
            unary(UnaryOperator::Not, Value::Int(1)).unwrap_err().kind,
            ErrorKind::Type
        );
        assert_eq!(unary(UnaryOperator::Negate, Value::Int(3)).unwrap(), Value::Int(-3));
    }
}
