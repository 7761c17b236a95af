//! Element access for arrays, strings and dictionaries.
//!
//! Failed lookups carry hints describing the valid range or the nearest keys.

use crate::error::{keys, suggestions, HplError};

use super::value::{DictKey, Value};

const MAX_LISTED_KEYS: usize = 10;

pub fn get(target: &Value, index: &Value) -> Result<Value, HplError> {
    match target {
        Value::Dict(entries) => {
            let entries = entries.borrow();
            let key = DictKey::try_from(index)?;
            match entries.get(&key) {
                Some(value) => Ok(value.clone()),
                None => Err(missing_key(&key, entries.keys())),
            }
        }
        Value::List(items) => {
            let items = items.borrow();
            let position = position("Array", index, items.len(), || target.preview(60))?;
            Ok(items[position].clone())
        }
        Value::Str(s) => {
            let count = s.chars().count();
            let position = position("String", index, count, || target.repr())?;
            Ok(s.chars()
                .nth(position)
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or(Value::Null))
        }
        other => {
            let error = HplError::type_error(format!("Cannot index {} value", other.type_name()));
            Err(match other {
                Value::Null => error.with_hint("the variable may be uninitialised (null)"),
                Value::Object(_) => error.with_hint("objects use property access: obj.property"),
                Value::Int(_) | Value::Float(_) => error.with_hint("numbers are not indexable"),
                _ => error,
            })
        }
    }
}

pub fn set(target: &Value, index: Value, value: Value) -> Result<(), HplError> {
    match target {
        Value::Dict(entries) => {
            let key = DictKey::try_from(&index)?;
            entries.borrow_mut().insert(key, value);
            Ok(())
        }
        Value::List(items) => {
            let len = items.borrow().len();
            let position = position("Array", &index, len, || target.preview(60))?;
            items.borrow_mut()[position] = value;
            Ok(())
        }
        other => Err(HplError::type_error(format!(
            "Cannot assign to an element of {} value",
            other.type_name()
        ))),
    }
}

/// Validates an integer position in `0..len`.
fn position(
    what: &str,
    index: &Value,
    len: usize,
    contents: impl Fn() -> String,
) -> Result<usize, HplError> {
    let Value::Int(index) = index else {
        let error = HplError::type_error(format!(
            "{what} index must be integer, got {} (value: {})",
            index.type_name(),
            index.repr()
        ));
        return Err(match index {
            Value::Str(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
                error.with_hint(format!("convert it first: int(\"{s}\")"))
            }
            Value::Float(n) if n.fract() == 0.0 => {
                error.with_hint(format!("convert it first: int({n:?})"))
            }
            Value::Null => error.with_hint("an index cannot be null"),
            _ => error,
        });
    };

    if let Ok(position) = usize::try_from(*index) {
        if position < len {
            return Ok(position);
        }
    }

    let mut hints = Vec::new();
    let signed_len = len as i64;
    if *index < 0 && signed_len + index >= 0 {
        hints.push(format!(
            "negative indices are not supported; use {} to reach element {} from the end",
            signed_len + index,
            -index
        ));
    }
    if *index >= signed_len {
        hints.push(format!(
            "length is {len}, so the last index is {}",
            signed_len - 1
        ));
    }
    if len > 0 {
        hints.push(format!("valid indices: 0 to {}", len - 1));
        if *index >= 0 && *index < signed_len + 5 {
            hints.push(format!("contents: {}", contents()));
        }
    } else {
        hints.push(format!("the {} is empty", what.to_lowercase()));
    }

    Err(
        HplError::index(format!("{what} index {index} out of bounds (length: {len})"))
            .with_key(keys::RUNTIME_INDEX_OUT_OF_BOUNDS)
            .with_hints(hints),
    )
}

fn missing_key<'a>(key: &DictKey, available: impl Iterator<Item = &'a DictKey>) -> HplError {
    let available: Vec<&DictKey> = available.collect();
    let listed: Vec<String> = available
        .iter()
        .take(MAX_LISTED_KEYS)
        .map(|k| k.repr())
        .collect();

    let mut message = format!(
        "Key {} (type: {}) not found in dictionary",
        key.repr(),
        key.type_name()
    );
    if listed.is_empty() {
        message.push_str(". Dictionary is empty");
    } else {
        message.push_str(&format!(". Available keys: [{}]", listed.join(", ")));
    }

    let mut hints = Vec::new();
    let key_text = key.to_string();
    let names: Vec<String> = available.iter().map(|k| k.to_string()).collect();
    let similar = suggestions(&key_text, names.iter().map(String::as_str), 3);
    match similar.as_slice() {
        [] => {}
        [only] => hints.push(format!("did you mean '{only}'?")),
        many => hints.push(format!("similar keys: {}", many.join(", "))),
    }

    match key {
        DictKey::Int(n) if available.contains(&&DictKey::Str(n.to_string())) => {
            hints.push(format!("try using string key: \"{n}\""));
        }
        DictKey::Str(s) => {
            if let Ok(n) = s.parse::<i64>() {
                if available.contains(&&DictKey::Int(n)) {
                    hints.push(format!("key exists as integer: {n}"));
                }
            }
        }
        _ => {}
    }

    HplError::key(message)
        .with_key(keys::RUNTIME_KEY_NOT_FOUND)
        .with_hints(hints)
}

#[cfg(test)]
mod test {
    use indexmap::IndexMap;

    use super::*;
    use crate::error::ErrorKind;

    fn dict(pairs: &[(DictKey, i64)]) -> Value {
        let entries: IndexMap<DictKey, Value> = pairs
            .iter()
            .map(|(k, v)| (k.clone(), Value::Int(*v)))
            .collect();
        Value::dict(entries)
    }

    #[test]
    fn test_dict_lookup_and_miss() {
        let d = dict(&[
            (DictKey::Str("apple".into()), 1),
            (DictKey::Str("banana".into()), 2),
        ]);
        assert_eq!(get(&d, &Value::str("apple")).unwrap(), Value::Int(1));

        let err = get(&d, &Value::str("aple")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Key);
        assert!(err.message.contains("Available keys: [\"apple\", \"banana\"]"));
        assert!(err.hints.iter().any(|h| h.contains("did you mean 'apple'")));
    }

    #[test]
    fn test_dict_cross_type_hint() {
        let d = dict(&[(DictKey::Int(1), 10)]);
        let err = get(&d, &Value::str("1")).unwrap_err();
        assert!(err.hints.iter().any(|h| h == "key exists as integer: 1"));

        let d = dict(&[(DictKey::Str("2".into()), 10)]);
        let err = get(&d, &Value::Int(2)).unwrap_err();
        assert!(err.hints.iter().any(|h| h.contains("string key")));
    }

    #[test]
    fn test_list_bounds() {
        let list = Value::list(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        assert_eq!(get(&list, &Value::Int(1)).unwrap(), Value::Int(20));

        let err = get(&list, &Value::Int(3)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Index);

        let err = get(&list, &Value::Int(-1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Index);
        assert!(err.hints[0].contains("use 2"));

        let err = get(&list, &Value::str("1")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
        assert!(err.hints[0].contains("int(\"1\")"));
    }

    #[test]
    fn test_string_index() {
        let s = Value::str("héllo");
        assert_eq!(get(&s, &Value::Int(1)).unwrap(), Value::str("é"));
        assert_eq!(get(&s, &Value::Int(9)).unwrap_err().kind, ErrorKind::Index);
        assert_eq!(get(&s, &Value::Float(1.0)).unwrap_err().kind, ErrorKind::Type);
    }

    #[test]
    fn test_set_elements() {
        let list = Value::list(vec![Value::Int(1)]);
        set(&list, Value::Int(0), Value::str("x")).unwrap();
        assert_eq!(get(&list, &Value::Int(0)).unwrap(), Value::str("x"));
        assert_eq!(
            set(&list, Value::Int(1), Value::Null).unwrap_err().kind,
            ErrorKind::Index
        );

        let d = dict(&[]);
        set(&d, Value::str("k"), Value::Int(5)).unwrap();
        assert_eq!(get(&d, &Value::str("k")).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_non_indexable() {
        let err = get(&Value::Int(3), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
    }
}
