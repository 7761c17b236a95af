use std::cmp::Ordering;

use crate::error::{keys, HplError};

use super::{callable::Arity, Evaluator, Value};

pub const NAMES: &[&str] = &[
    "len", "int", "float", "str", "type", "abs", "max", "min", "range", "input",
];

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

fn one(name: &str, args: Vec<Value>) -> Result<Value, HplError> {
    Arity::Fixed(1).check("Function", name, args.len())?;
    Ok(args.into_iter().next().unwrap_or(Value::Null))
}

fn conversion_error(target: &str, value: &Value) -> HplError {
    let error = HplError::type_error(format!(
        "Cannot convert {} (value: {}) to {target}",
        value.type_name(),
        value.repr()
    ))
    .with_key(keys::TYPE_CONVERSION_FAILED);
    match value {
        Value::Null => error.with_hint("the variable is uninitialised (null)"),
        Value::Str(_) if target == "int" => {
            error.with_hint("the string must contain only digits, e.g. int(\"42\")")
        }
        Value::Str(_) => error.with_hint("the string must be a valid number, e.g. float(\"3.14\")"),
        _ => error,
    }
}

fn order(a: &Value, b: &Value, function: &str) -> Result<Ordering, HplError> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(a
            .as_f64()
            .unwrap_or_default()
            .partial_cmp(&b.as_f64().unwrap_or_default())
            .unwrap_or(Ordering::Equal)),
        (a, b) => Err(HplError::type_error(format!(
            "{function}() cannot compare {} with {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn extreme(function: &str, args: Vec<Value>, wanted: Ordering) -> Result<Value, HplError> {
    // A single array argument is searched element-wise.
    let single_list = if let [Value::List(items)] = args.as_slice() {
        Some(items.borrow().clone())
    } else {
        None
    };
    let mut items = single_list.unwrap_or(args).into_iter();
    let Some(mut best) = items.next() else {
        return Err(HplError::value(format!(
            "{function}() requires at least one argument"
        )));
    };
    for item in items {
        if order(&item, &best, function)? == wanted {
            best = item;
        }
    }
    Ok(best)
}

fn range(args: Vec<Value>) -> Result<Value, HplError> {
    if args.is_empty() || args.len() > 3 {
        return Err(HplError::value(format!(
            "range() requires 1 to 3 arguments, got {}",
            args.len()
        )));
    }
    let mut bounds = Vec::with_capacity(3);
    for arg in &args {
        match arg {
            Value::Int(n) => bounds.push(*n),
            other => {
                return Err(HplError::type_error(format!(
                    "range() arguments must be integers, got {}",
                    other.type_name()
                )))
            }
        }
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(HplError::value("range() requires 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(HplError::value("range() step must not be zero"));
    }

    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::Int(current));
        match current.checked_add(step) {
            Some(next) => current = next,
            None => break,
        }
    }
    Ok(Value::list(items))
}

impl Evaluator {
    /// Runs a built-in function, or returns `None` if `name` is not one.
    pub(super) fn call_builtin(
        &mut self,
        name: &str,
        args: Vec<Value>,
    ) -> Option<Result<Value, HplError>> {
        let result = match name {
            "len" => one(name, args).and_then(|value| match &value {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int(items.borrow().len() as i64)),
                Value::Dict(entries) => Ok(Value::Int(entries.borrow().len() as i64)),
                other => Err(HplError::type_error(format!(
                    "len() requires array, string or dict, got {}",
                    other.type_name()
                ))),
            }),
            "int" => one(name, args).and_then(|value| match &value {
                Value::Int(n) => Ok(Value::Int(*n)),
                Value::Float(n) if n.is_finite() => Ok(Value::Int(n.trunc() as i64)),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| conversion_error("int", &value)),
                other => Err(conversion_error("int", other)),
            }),
            "float" => one(name, args).and_then(|value| match &value {
                Value::Int(n) => Ok(Value::Float(*n as f64)),
                Value::Float(n) => Ok(Value::Float(*n)),
                Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| conversion_error("float", &value)),
                other => Err(conversion_error("float", other)),
            }),
            "str" => one(name, args).map(|value| Value::Str(value.to_string())),
            "type" => one(name, args).map(|value| Value::Str(value.type_name())),
            "abs" => one(name, args).and_then(|value| match value {
                Value::Int(n) => n
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| HplError::value("Integer overflow in abs()")),
                Value::Float(n) => Ok(Value::Float(n.abs())),
                other => Err(HplError::type_error(format!(
                    "abs() requires number, got {}",
                    other.type_name()
                ))),
            }),
            "max" => extreme(name, args, Ordering::Greater),
            "min" => extreme(name, args, Ordering::Less),
            "range" => range(args),
            "input" => self.input(args),
            _ => return None,
        };
        Some(result)
    }

    fn input(&mut self, args: Vec<Value>) -> Result<Value, HplError> {
        match args.as_slice() {
            [] => {}
            [Value::Str(prompt)] => {
                let mut stdout = self.stdout.borrow_mut();
                write!(stdout, "{prompt}")
                    .and_then(|_| stdout.flush())
                    .map_err(|e| HplError::io(format!("Failed to write prompt: {e}")))?;
            }
            [other] => {
                return Err(HplError::type_error(format!(
                    "input() requires string prompt, got {}",
                    other.type_name()
                )))
            }
            _ => {
                return Err(HplError::value(format!(
                    "input() requires 0 or 1 arguments, got {}",
                    args.len()
                )))
            }
        }

        let mut line = String::new();
        let read = self
            .stdin
            .borrow_mut()
            .read_line(&mut line)
            .map_err(|e| HplError::io(format!("Failed to read input: {e}")))?;
        if read == 0 {
            return Err(HplError::io("End of file reached while waiting for input"));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        Ok(Value::str(trimmed))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_statement_keywords_are_not_builtins() {
        assert!(is_builtin("len"));
        assert!(!is_builtin("echo"));
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(range(vec![Value::Int(3)]).unwrap().to_string(), "[0, 1, 2]");
        assert_eq!(
            range(vec![Value::Int(5), Value::Int(0), Value::Int(-2)])
                .unwrap()
                .to_string(),
            "[5, 3, 1]"
        );
        assert!(range(vec![Value::Int(1), Value::Int(2), Value::Int(0)]).is_err());
        assert!(range(vec![Value::str("3")]).is_err());
    }

    #[test]
    fn test_extremes() {
        let args = vec![Value::Int(3), Value::Float(7.5), Value::Int(-1)];
        assert_eq!(extreme("max", args.clone(), Ordering::Greater).unwrap(), Value::Float(7.5));
        assert_eq!(extreme("min", args, Ordering::Less).unwrap(), Value::Int(-1));
        assert!(extreme("max", vec![], Ordering::Greater).is_err());
        let list = Value::list(vec![Value::str("b"), Value::str("a")]);
        assert_eq!(extreme("min", vec![list], Ordering::Less).unwrap(), Value::str("a"));
    }
}
