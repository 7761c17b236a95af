//! Built-in modules available to every program without a file on disk.

use std::rc::Rc;

use crate::{
    error::HplError,
    module::{Module, NativeModule},
    tree_walk_interpreter::{Arity, Value},
};

pub const MODULES: &[&str] = &["math", "string"];

/// Builds the named built-in module.
pub fn builtin(name: &str) -> Option<Rc<dyn Module>> {
    let module = match name {
        "math" => math(),
        "string" => string(),
        _ => return None,
    };
    Some(Rc::new(module))
}

fn number(function: &str, value: &Value) -> Result<f64, HplError> {
    value.as_f64().ok_or_else(|| {
        HplError::type_error(format!(
            "{function}() requires number, got {}",
            value.type_name()
        ))
    })
}

fn text<'a>(function: &str, value: &'a Value) -> Result<&'a str, HplError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(HplError::type_error(format!(
            "{function}() requires string, got {}",
            other.type_name()
        ))),
    }
}

fn math() -> NativeModule {
    NativeModule::new("math", "Numeric functions and constants")
        .with_constant("PI", Value::Float(std::f64::consts::PI))
        .with_constant("E", Value::Float(std::f64::consts::E))
        .with_function("sqrt", Arity::Fixed(1), |args| {
            let n = number("sqrt", &args[0])?;
            if n < 0.0 {
                return Err(HplError::value("sqrt() of a negative number"));
            }
            Ok(Value::Float(n.sqrt()))
        })
        .with_function("pow", Arity::Fixed(2), |args| match (&args[0], &args[1]) {
            (Value::Int(base), Value::Int(exp)) if (0..=u32::MAX as i64).contains(exp) => base
                .checked_pow(*exp as u32)
                .map(Value::Int)
                .ok_or_else(|| HplError::value("Integer overflow in pow()")),
            (base, exp) => Ok(Value::Float(
                number("pow", base)?.powf(number("pow", exp)?),
            )),
        })
        .with_function("floor", Arity::Fixed(1), |args| {
            Ok(Value::Int(number("floor", &args[0])?.floor() as i64))
        })
        .with_function("ceil", Arity::Fixed(1), |args| {
            Ok(Value::Int(number("ceil", &args[0])?.ceil() as i64))
        })
}

fn string() -> NativeModule {
    NativeModule::new("string", "String helpers")
        .with_function("upper", Arity::Fixed(1), |args| {
            Ok(Value::str(text("upper", &args[0])?.to_uppercase()))
        })
        .with_function("lower", Arity::Fixed(1), |args| {
            Ok(Value::str(text("lower", &args[0])?.to_lowercase()))
        })
        .with_function("trim", Arity::Fixed(1), |args| {
            Ok(Value::str(text("trim", &args[0])?.trim()))
        })
        .with_function("split", Arity::Fixed(2), |args| {
            let s = text("split", &args[0])?;
            let separator = text("split", &args[1])?;
            if separator.is_empty() {
                return Err(HplError::value("split() separator must not be empty"));
            }
            Ok(Value::list(s.split(separator).map(Value::str).collect()))
        })
        .with_function("join", Arity::Fixed(2), |args| {
            let separator = text("join", &args[1])?;
            let Value::List(items) = &args[0] else {
                return Err(HplError::type_error(format!(
                    "join() requires array, got {}",
                    args[0].type_name()
                )));
            };
            let joined = items
                .borrow()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(separator);
            Ok(Value::Str(joined))
        })
        .with_function("contains", Arity::Fixed(2), |args| {
            Ok(Value::Bool(
                text("contains", &args[0])?.contains(text("contains", &args[1])?),
            ))
        })
        .with_function("replace", Arity::Fixed(3), |args| {
            let s = text("replace", &args[0])?;
            Ok(Value::str(
                s.replace(text("replace", &args[1])?, text("replace", &args[2])?),
            ))
        })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_math() {
        let math = builtin("math").unwrap();
        assert_eq!(math.call("sqrt", vec![Value::Int(9)]).unwrap(), Value::Float(3.0));
        assert_eq!(
            math.call("pow", vec![Value::Int(2), Value::Int(10)]).unwrap(),
            Value::Int(1024)
        );
        assert_eq!(
            math.call("sqrt", vec![Value::str("9")]).unwrap_err().kind,
            ErrorKind::Type
        );
        assert!(matches!(math.constant("PI").unwrap(), Value::Float(_)));
    }

    #[test]
    fn test_string() {
        let string = builtin("string").unwrap();
        let parts = string
            .call("split", vec![Value::str("a,b,c"), Value::str(",")])
            .unwrap();
        assert_eq!(parts.to_string(), r#"["a", "b", "c"]"#);
        assert_eq!(
            string.call("join", vec![parts, Value::str("-")]).unwrap(),
            Value::str("a-b-c")
        );
        assert_eq!(
            string.call("upper", vec![]).unwrap_err().kind,
            ErrorKind::Value
        );
        assert!(builtin("network").is_none());
    }
}
