//! The module capability interface and the registry type most modules are built from.

use std::{path::Path, rc::Rc};

use indexmap::IndexMap;

use crate::{
    error::{suggestions, HplError},
    tree_walk_interpreter::{Arity, NativeFunction, Value},
};

/// Anything that can call a named function and read a named constant.
pub trait Module {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn call(&self, function: &str, args: Vec<Value>) -> Result<Value, HplError>;

    fn constant(&self, name: &str) -> Result<Value, HplError>;

    /// Names of every function and constant, used for suggestions.
    fn exports(&self) -> Vec<String> {
        Vec::new()
    }
}

impl std::fmt::Debug for dyn Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<module {}>", self.name())
    }
}

struct Entry {
    arity: Arity,
    what: &'static str,
    function: NativeFunction,
}

/// A module backed by registered host functions and constant values.
pub struct NativeModule {
    name: String,
    description: String,
    functions: IndexMap<String, Entry>,
    constants: IndexMap<String, Value>,
}

impl NativeModule {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            functions: IndexMap::new(),
            constants: IndexMap::new(),
        }
    }

    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        arity: Arity,
        function: impl Fn(Vec<Value>) -> Result<Value, HplError> + 'static,
    ) {
        self.functions.insert(
            name.into(),
            Entry {
                arity,
                what: "Function",
                function: Rc::new(function),
            },
        );
    }

    /// Like [`NativeModule::register_function`] but reports arity errors as a constructor.
    pub fn register_constructor(
        &mut self,
        name: impl Into<String>,
        arity: Arity,
        function: impl Fn(Vec<Value>) -> Result<Value, HplError> + 'static,
    ) {
        self.functions.insert(
            name.into(),
            Entry {
                arity,
                what: "Constructor",
                function: Rc::new(function),
            },
        );
    }

    pub fn register_constant(&mut self, name: impl Into<String>, value: Value) {
        self.constants.insert(name.into(), value);
    }

    pub fn with_function(
        mut self,
        name: impl Into<String>,
        arity: Arity,
        function: impl Fn(Vec<Value>) -> Result<Value, HplError> + 'static,
    ) -> Self {
        self.register_function(name, arity, function);
        self
    }

    pub fn with_constant(mut self, name: impl Into<String>, value: Value) -> Self {
        self.register_constant(name, value);
        self
    }

    fn missing(&self, what: &str, name: &str) -> HplError {
        let exports = self.exports();
        let similar = suggestions(name, exports.iter().map(String::as_str), 3);
        let error = HplError::attribute(format!(
            "Module '{}' has no {what} '{name}'",
            self.name
        ));
        if similar.is_empty() {
            error
        } else {
            error.with_hint(format!("did you mean: {}?", similar.join(", ")))
        }
    }
}

impl Module for NativeModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn call(&self, function: &str, args: Vec<Value>) -> Result<Value, HplError> {
        let Some(entry) = self.functions.get(function) else {
            return Err(self.missing("function", function));
        };
        entry.arity.check(entry.what, function, args.len())?;
        (entry.function)(args)
    }

    fn constant(&self, name: &str) -> Result<Value, HplError> {
        self.constants
            .get(name)
            .cloned()
            .ok_or_else(|| self.missing("constant", name))
    }

    fn exports(&self) -> Vec<String> {
        self.functions
            .keys()
            .chain(self.constants.keys())
            .cloned()
            .collect()
    }
}

/// A public member of a host package.
#[derive(Clone)]
pub enum Export {
    Callable(NativeFunction),
    Value(Value),
}

/// A host-ecosystem package supplied by the embedder.
///
/// Unless it carries its own facade module, its exports are wrapped
/// automatically: callables become variadic functions, other values become
/// constants, and names starting with `_` stay private.
#[derive(Clone)]
pub struct HostPackage {
    pub name: String,
    pub description: String,
    exports: IndexMap<String, Export>,
    facade: Option<Rc<dyn Module>>,
}

impl HostPackage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            exports: IndexMap::new(),
            facade: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_function(
        mut self,
        name: impl Into<String>,
        function: impl Fn(Vec<Value>) -> Result<Value, HplError> + 'static,
    ) -> Self {
        self.exports
            .insert(name.into(), Export::Callable(Rc::new(function)));
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.exports.insert(name.into(), Export::Value(value));
        self
    }

    pub fn with_facade(mut self, facade: Rc<dyn Module>) -> Self {
        self.facade = Some(facade);
        self
    }

    pub fn into_module(self) -> Rc<dyn Module> {
        if let Some(facade) = self.facade {
            return facade;
        }

        let description = if self.description.is_empty() {
            format!("Host package: {}", self.name)
        } else {
            self.description
        };
        let mut module = NativeModule::new(self.name, description);
        for (name, export) in self.exports {
            if name.starts_with('_') {
                continue;
            }
            match export {
                Export::Callable(function) => {
                    module.register_function(name, Arity::Variadic, move |args| function(args))
                }
                Export::Value(value) => module.register_constant(name, value),
            }
        }
        Rc::new(module)
    }
}

/// Turns host-native source files with a given extension into packages.
pub trait NativeFileLoader {
    /// Extension without the leading dot.
    fn extension(&self) -> &str;

    fn load(&self, name: &str, path: &Path) -> Result<HostPackage, HplError>;
}
