use std::{
    cell::{OnceCell, RefCell},
    rc::{Rc, Weak},
};

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::FunctionDecl;

use super::Value;

pub type ClassTable = FxHashMap<String, Rc<Class>>;

pub struct Class {
    pub name: String,
    /// Name of the single parent class, resolved through the class table at lookup time.
    pub parent: Option<String>,
    pub methods: FxHashMap<String, Rc<FunctionDecl>>,
    parent_link: OnceCell<Weak<Class>>,
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// `init` and `__init__` name the same constructor.
fn constructor_alias(name: &str) -> Option<&'static str> {
    match name {
        "init" => Some("__init__"),
        "__init__" => Some("init"),
        _ => None,
    }
}

impl Class {
    pub fn new(
        name: impl Into<String>,
        parent: Option<String>,
        methods: FxHashMap<String, Rc<FunctionDecl>>,
    ) -> Self {
        Self {
            name: name.into(),
            parent,
            methods,
            parent_link: OnceCell::new(),
        }
    }

    /// Resolves every parent name in `classes` once the table is complete.
    ///
    /// Links are weak, so a class table that forms a cycle is still freed.
    pub fn link_parents(classes: &ClassTable) {
        for class in classes.values() {
            if let Some(parent) = class.parent.as_ref().and_then(|p| classes.get(p)) {
                let _ = class.parent_link.set(Rc::downgrade(parent));
            }
        }
    }

    /// A method defined directly on this class, honouring the constructor alias.
    pub fn own_method(&self, name: &str) -> Option<Rc<FunctionDecl>> {
        self.methods
            .get(name)
            .or_else(|| constructor_alias(name).and_then(|alias| self.methods.get(alias)))
            .cloned()
    }

    /// The constructor this class itself defines. Parents are not consulted.
    pub fn constructor(&self) -> Option<(&'static str, Rc<FunctionDecl>)> {
        ["init", "__init__"]
            .into_iter()
            .find_map(|name| self.methods.get(name).map(|method| (name, method.clone())))
    }

    /// Searches this class and then its ancestor chain.
    ///
    /// Returns the class that defines the method along with it. A parent
    /// chain that loops back on itself ends the search.
    pub fn find_method(self: &Rc<Self>, name: &str) -> Option<(Rc<Class>, Rc<FunctionDecl>)> {
        let mut visited = FxHashSet::default();
        let mut current = Some(self.clone());
        while let Some(class) = current {
            if !visited.insert(class.name.clone()) {
                break;
            }
            if let Some(method) = class.own_method(name) {
                return Some((class, method));
            }
            current = class.parent_class();
        }
        None
    }

    pub fn parent_class(&self) -> Option<Rc<Class>> {
        self.parent_link.get().and_then(Weak::upgrade)
    }
}

pub struct Object {
    pub name: String,
    pub class: Rc<Class>,
    pub attributes: RefCell<IndexMap<String, Value>>,
}

impl Object {
    pub fn new(name: impl Into<String>, class: Rc<Class>) -> Self {
        Self {
            name: name.into(),
            class,
            attributes: RefCell::new(IndexMap::new()),
        }
    }

    pub fn get(&self, attribute: &str) -> Option<Value> {
        self.attributes.borrow().get(attribute).cloned()
    }

    pub fn set(&self, attribute: impl Into<String>, value: Value) {
        self.attributes.borrow_mut().insert(attribute.into(), value);
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("name", &self.name)
            .field("class", &self.class.name)
            .field("attributes", &self.attributes.borrow())
            .finish()
    }
}
