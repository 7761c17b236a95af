use std::{fmt::Display, rc::Rc};

use crate::{
    ast::FunctionDecl,
    error::{keys, suggestions, HplError},
};

use super::{
    class::{Class, Object},
    scope::Scope,
    Evaluator, Flow, Value,
};

/// A host function exposed to the language, usually through a module.
pub type NativeFunction = Rc<dyn Fn(Vec<Value>) -> Result<Value, HplError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic,
}

impl Arity {
    /// Rejects a call with the wrong number of arguments as a Value-kind error.
    pub fn check(self, what: &str, name: &str, got: usize) -> Result<(), HplError> {
        match self {
            Arity::Fixed(expected) if expected != got => Err(HplError::value(format!(
                "{what} '{name}' expects {expected} arguments, got {got}"
            ))
            .with_key(keys::VALUE_ARITY_MISMATCH)),
            _ => Ok(()),
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arity::Fixed(n) => write!(f, "{n}"),
            Arity::Variadic => write!(f, "variadic"),
        }
    }
}

impl Evaluator {
    /// Runs a function body in `scope` under a new call-stack frame.
    pub(super) fn invoke(
        &mut self,
        label: String,
        decl: &FunctionDecl,
        mut scope: Scope,
    ) -> Result<Value, HplError> {
        if self.call_stack.len() >= self.max_call_depth {
            return Err(HplError::recursion(format!(
                "Maximum call depth of {} exceeded while calling {label}",
                self.max_call_depth
            ))
            .with_call_stack(&self.call_stack));
        }

        tracing::trace!(function = %label, depth = self.call_stack.len(), "invoke");
        self.call_stack.push(label);
        let result = self.execute_block(&decl.body, &mut scope);
        self.call_stack.pop();

        match result? {
            Flow::Normal => Ok(Value::Null),
            Flow::Return(value) => Ok(value),
            Flow::Break(span) => Err(HplError::syntax("'break' outside of a loop").at(span)),
            Flow::Continue(span) => Err(HplError::syntax("'continue' outside of a loop").at(span)),
        }
    }

    /// Calls a top-level function with positional arguments.
    pub fn call_function(&mut self, name: &str, args: Vec<Value>) -> Result<Value, HplError> {
        let Some(decl) = self.functions.get(name).cloned() else {
            return Err(self.unknown_function(name));
        };
        let mut scope = Scope::new();
        scope.bind_params(&decl.params, args);
        self.invoke(format!("{name}()"), &decl, scope)
    }

    pub(super) fn unknown_function(&self, name: &str) -> HplError {
        let candidates = self
            .functions
            .keys()
            .chain(self.classes.keys())
            .map(String::as_str)
            .chain(super::builtins::NAMES.iter().copied());
        let similar = suggestions(name, candidates, 3);
        let error = HplError::name(format!("Unknown function '{name}'"));
        if similar.is_empty() {
            error
        } else {
            error.with_hint(format!("did you mean: {}?", similar.join(", ")))
        }
    }

    /// Dispatches `object.method(args)` through the class chain.
    ///
    /// Without a matching method an attribute of the same name is returned.
    pub fn call_method(
        &mut self,
        object: &Rc<Object>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, HplError> {
        match object.class.find_method(method) {
            Some((owner, decl)) => {
                let mut scope = Scope::method(Some(object.clone()), owner);
                scope.bind_params(&decl.params, args);
                self.invoke(format!("{}.{method}()", object.class.name), &decl, scope)
            }
            None => match object.get(method) {
                Some(value) => Ok(value),
                None => {
                    let attributes: Vec<String> = object.attributes.borrow().keys().cloned().collect();
                    let similar = suggestions(
                        method,
                        attributes
                            .iter()
                            .map(String::as_str)
                            .chain(object.class.methods.keys().map(String::as_str)),
                        3,
                    );
                    let error = HplError::attribute(format!(
                        "Method or attribute '{method}' not found in class '{}'",
                        object.class.name
                    ));
                    Err(if similar.is_empty() {
                        error
                    } else {
                        error.with_hint(format!("did you mean: {}?", similar.join(", ")))
                    })
                }
            },
        }
    }

    /// Runs an ancestor's method, reached through `this.parent`, on the current object.
    pub(super) fn call_parent_method(
        &mut self,
        class: &Rc<Class>,
        method: &str,
        args: Vec<Value>,
        this: Option<Rc<Object>>,
    ) -> Result<Value, HplError> {
        let Some((owner, decl)) = class.find_method(method) else {
            return Err(HplError::attribute(format!(
                "Method '{method}' not found in parent class '{}'",
                class.name
            )));
        };
        let label = format!("{}.{method}()", owner.name);
        let mut scope = Scope::method(this, owner);
        scope.bind_params(&decl.params, args);
        self.invoke(label, &decl, scope)
    }

    /// Allocates a fresh object and runs the class's own constructor, if any.
    ///
    /// Parent constructors only run when the constructor calls them explicitly.
    pub fn instantiate(
        &mut self,
        class: &Rc<Class>,
        name: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<Rc<Object>, HplError> {
        let object = Rc::new(Object::new(name, class.clone()));
        if let Some((constructor, decl)) = class.constructor() {
            let mut scope = Scope::method(Some(object.clone()), class.clone());
            scope.bind_params(&decl.params, args);
            self.invoke(format!("{}.{constructor}()", class.name), &decl, scope)?;
        }
        Ok(object)
    }

    pub fn instantiate_class(&mut self, class_name: &str, args: Vec<Value>) -> Result<Value, HplError> {
        let Some(class) = self.classes.get(class_name).cloned() else {
            return Err(HplError::name(format!("Class '{class_name}' not found")));
        };
        let name = format!("{class_name}_instance");
        Ok(Value::Object(self.instantiate(&class, name, args)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_arity_check() {
        assert!(Arity::Variadic.check("Function", "f", 9).is_ok());
        assert!(Arity::Fixed(2).check("Function", "f", 2).is_ok());
        let err = Arity::Fixed(2).check("Constructor", "Point", 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        assert_eq!(err.message, "Constructor 'Point' expects 2 arguments, got 1");
        assert_eq!(err.error_key, keys::VALUE_ARITY_MISMATCH);
    }
}
