use std::{
    cell::RefCell,
    fmt::{Debug, Display},
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{error::HplError, module::Module};

use super::class::{Class, Object};

pub type List = Rc<RefCell<Vec<Value>>>;
pub type Dict = Rc<RefCell<IndexMap<DictKey, Value>>>;

#[derive(Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    List(List),
    Dict(Dict),
    Object(Rc<Object>),
    Class(Rc<Class>),
    Module(Rc<dyn Module>),
    Error(Rc<HplError>),
}

/// The primitive values usable as dictionary keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DictKey {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn dict(entries: IndexMap<DictKey, Value>) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Dict(entries) => !entries.borrow().is_empty(),
            Value::Object(_) | Value::Class(_) | Value::Module(_) | Value::Error(_) => true,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// The name reported by `type()` and in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Int(_) => "int".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Str(_) => "string".to_string(),
            Value::Bool(_) => "boolean".to_string(),
            Value::Null => "null".to_string(),
            Value::List(_) => "array".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::Object(object) => object.class.name.clone(),
            Value::Class(_) => "class".to_string(),
            Value::Module(_) => "module".to_string(),
            Value::Error(_) => "error".to_string(),
        }
    }

    /// Quoted form used inside collections and diagnostics.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{s:?}"),
            other => other.to_string(),
        }
    }

    /// Display form cut to `max` characters.
    pub fn preview(&self, max: usize) -> String {
        let repr = self.repr();
        if repr.chars().count() <= max {
            repr
        } else {
            let cut: String = repr.chars().take(max).collect();
            format!("{cut}...")
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equals(self, other, &mut Vec::new())
    }
}

type Address = *const ();

fn address<T>(rc: &Rc<T>) -> Address {
    Rc::as_ptr(rc).cast()
}

/// Structural equality. A pair of collections already being compared
/// further up counts as equal, so self-referencing values terminate.
fn equals(left: &Value, right: &Value, active: &mut Vec<(Address, Address)>) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(_), _) | (_, Value::Float(_)) if left.is_numeric() && right.is_numeric() => {
            left.as_f64() == right.as_f64()
        }
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Null, Value::Null) => true,
        (Value::List(a), Value::List(b)) => {
            let pair = (address(a), address(b));
            if Rc::ptr_eq(a, b) || active.contains(&pair) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            if a.len() != b.len() {
                return false;
            }
            active.push(pair);
            let same = a.iter().zip(b.iter()).all(|(x, y)| equals(x, y, active));
            active.pop();
            same
        }
        (Value::Dict(a), Value::Dict(b)) => {
            let pair = (address(a), address(b));
            if Rc::ptr_eq(a, b) || active.contains(&pair) {
                return true;
            }
            let (a, b) = (a.borrow(), b.borrow());
            if a.len() != b.len() {
                return false;
            }
            active.push(pair);
            let same = a
                .iter()
                .all(|(key, x)| b.get(key).is_some_and(|y| equals(x, y, active)));
            active.pop();
            same
        }
        (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
        (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
        (Value::Module(a), Value::Module(b)) => a.name() == b.name(),
        (Value::Error(a), Value::Error(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        render(self, f, false, &mut Vec::new())
    }
}

/// Writes `value`, printing `[...]` or `{...}` for a collection that is
/// already being written further up.
fn render(
    value: &Value,
    f: &mut std::fmt::Formatter<'_>,
    quoted: bool,
    active: &mut Vec<Address>,
) -> std::fmt::Result {
    match value {
        Value::Int(n) => write!(f, "{n}"),
        Value::Float(n) => write!(f, "{n:?}"),
        Value::Str(s) if quoted => write!(f, "{s:?}"),
        Value::Str(s) => write!(f, "{s}"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Null => write!(f, "null"),
        Value::List(items) => {
            let id = address(items);
            if active.contains(&id) {
                return write!(f, "[...]");
            }
            active.push(id);
            write!(f, "[")?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                render(item, f, true, active)?;
            }
            active.pop();
            write!(f, "]")
        }
        Value::Dict(entries) => {
            let id = address(entries);
            if active.contains(&id) {
                return write!(f, "{{...}}");
            }
            active.push(id);
            write!(f, "{{")?;
            for (i, (key, value)) in entries.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", key.repr())?;
                render(value, f, true, active)?;
            }
            active.pop();
            write!(f, "}}")
        }
        Value::Object(object) => write!(f, "<{} object>", object.class.name),
        Value::Class(class) => write!(f, "<class {}>", class.name),
        Value::Module(module) => write!(f, "<module {}>", module.name()),
        Value::Error(error) => write!(f, "{}", error.message),
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl DictKey {
    pub fn into_value(self) -> Value {
        match self {
            DictKey::Int(n) => Value::Int(n),
            DictKey::Str(s) => Value::Str(s),
            DictKey::Bool(b) => Value::Bool(b),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DictKey::Int(_) => "int",
            DictKey::Str(_) => "string",
            DictKey::Bool(_) => "boolean",
        }
    }

    pub fn repr(&self) -> String {
        match self {
            DictKey::Int(n) => n.to_string(),
            DictKey::Str(s) => format!("{s:?}"),
            DictKey::Bool(b) => b.to_string(),
        }
    }
}

impl Display for DictKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DictKey::Int(n) => write!(f, "{n}"),
            DictKey::Str(s) => write!(f, "{s}"),
            DictKey::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl TryFrom<&Value> for DictKey {
    type Error = HplError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(n) => Ok(DictKey::Int(*n)),
            Value::Str(s) => Ok(DictKey::Str(s.clone())),
            Value::Bool(b) => Ok(DictKey::Bool(*b)),
            other => Err(HplError::type_error(format!(
                "Dictionary keys must be int, string or boolean, got {}",
                other.type_name()
            ))),
        }
    }
}
