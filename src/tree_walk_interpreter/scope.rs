use std::rc::Rc;

use indexmap::IndexMap;

use super::{
    class::{Class, Object},
    Value,
};

pub type Globals = IndexMap<String, Value>;

/// Local variables of one function or method invocation.
#[derive(Debug, Default)]
pub struct Scope {
    locals: IndexMap<String, Value>,
    this: Option<Rc<Object>>,
    /// Class defining the running method, used to resolve `this.parent`.
    owner: Option<Rc<Class>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(this: Option<Rc<Object>>, owner: Rc<Class>) -> Self {
        Self {
            locals: IndexMap::new(),
            this,
            owner: Some(owner),
        }
    }

    /// Binds parameters positionally. Missing trailing arguments are null.
    pub fn bind_params(&mut self, params: &[String], args: Vec<Value>) {
        let mut args = args.into_iter();
        for param in params {
            self.locals
                .insert(param.clone(), args.next().unwrap_or(Value::Null));
        }
    }

    pub fn this(&self) -> Option<&Rc<Object>> {
        self.this.as_ref()
    }

    pub fn owner(&self) -> Option<&Rc<Class>> {
        self.owner.as_ref()
    }

    pub fn declare(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    /// Local scope first, then globals.
    pub fn get(&self, name: &str, globals: &Globals) -> Option<Value> {
        if name == "this" {
            if let Some(this) = &self.this {
                return Some(Value::Object(this.clone()));
            }
        }
        self.locals
            .get(name)
            .or_else(|| globals.get(name))
            .cloned()
    }

    /// Updates an existing binding, declaring a local when the name is new.
    pub fn assign(&mut self, name: &str, value: Value, globals: &mut Globals) {
        if let Some(slot) = self.locals.get_mut(name) {
            *slot = value;
        } else if let Some(slot) = globals.get_mut(name) {
            *slot = value;
        } else {
            self.locals.insert(name.to_string(), value);
        }
    }

    pub fn names<'a>(&'a self, globals: &'a Globals) -> impl Iterator<Item = &'a str> {
        self.locals
            .keys()
            .chain(globals.keys())
            .map(String::as_str)
            .chain(self.this.as_ref().map(|_| "this"))
    }

    /// Up to `limit` locals rendered as `name = value` for diagnostics.
    pub fn preview(&self, limit: usize) -> Vec<String> {
        self.locals
            .iter()
            .take(limit)
            .map(|(name, value)| format!("{name} = {}", value.preview(40)))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_first_write_declares_local() {
        let mut globals = Globals::new();
        globals.insert("score".into(), Value::Int(1));
        let mut scope = Scope::new();

        scope.assign("score", Value::Int(2), &mut globals);
        scope.assign("fresh", Value::Int(3), &mut globals);

        assert_eq!(globals["score"], Value::Int(2));
        assert!(!globals.contains_key("fresh"));
        assert_eq!(scope.get("fresh", &globals), Some(Value::Int(3)));
    }

    #[test]
    fn test_missing_args_bind_null() {
        let mut scope = Scope::new();
        scope.bind_params(&["a".to_string(), "b".to_string()], vec![Value::Int(1)]);
        assert_eq!(scope.get("b", &Globals::new()), Some(Value::Null));
        assert_eq!(scope.preview(5), vec!["a = 1".to_string(), "b = null".to_string()]);
    }
}
