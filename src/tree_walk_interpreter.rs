mod builtins;
mod callable;
mod class;
mod index;
mod operators;
mod scope;
mod value;

use std::{
    cell::RefCell,
    fmt::Debug,
    io::{BufRead, Write},
    path::{Path, PathBuf},
    rc::{Rc, Weak},
};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::{
    ast::{Block, Expression, FunctionDecl, InfixOperator, Literal, Statement},
    document::{EntryPoint, ImportDecl, ObjectDecl, Program},
    error::{keys, suggestions, HplError},
    loader::Session,
    module::Module,
    span::Span,
};

use self::{
    class::ClassTable,
    scope::{Globals, Scope},
};

pub use self::{
    callable::{Arity, NativeFunction},
    class::{Class, Object},
    value::{DictKey, Value},
};

/// How a statement finished.
#[derive(Debug)]
pub(crate) enum Flow {
    Normal,
    Return(Value),
    Break(Span),
    Continue(Span),
}

/// Evaluates one document: its classes, functions, global objects and imports.
pub struct Evaluator {
    classes: ClassTable,
    functions: FxHashMap<String, Rc<FunctionDecl>>,
    globals: Globals,
    objects: IndexMap<String, ObjectDecl>,
    imports: Vec<ImportDecl>,
    entry: Option<EntryPoint>,
    call_stack: Vec<String>,
    imported_modules: IndexMap<String, Rc<dyn Module>>,
    stdout: Rc<RefCell<dyn Write>>,
    stdin: Rc<RefCell<dyn BufRead>>,
    session: Weak<Session>,
    file: Option<String>,
    base_dir: Option<PathBuf>,
    max_call_depth: usize,
    initialized: bool,
}

impl Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("file", &self.file)
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .field("call_stack", &self.call_stack)
            .finish()
    }
}

/// Resolves a raw constructor argument from an `objects` declaration.
fn object_argument(raw: &str, globals: &Globals) -> Value {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(n) = raw.parse::<f64>() {
        return Value::Float(n);
    }
    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    if quoted {
        return Value::str(&raw[1..raw.len() - 1]);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        name => globals.get(name).cloned().unwrap_or_else(|| Value::str(name)),
    }
}

fn error_property(error: &HplError, property: &str) -> Result<Value, HplError> {
    let location = |n: Option<usize>| n.map_or(Value::Null, |n| Value::Int(n as i64));
    match property {
        "message" => Ok(Value::str(&error.message)),
        "type" => Ok(Value::str(error.kind.name())),
        "line" => Ok(location(error.line)),
        "column" => Ok(location(error.column)),
        "file" => Ok(error.file.clone().map_or(Value::Null, Value::Str)),
        _ => Err(HplError::attribute(format!(
            "Error value has no property '{property}'"
        ))
        .with_hint("available: message, type, line, column, file")),
    }
}

impl Evaluator {
    pub fn new(program: Program, session: &Rc<Session>) -> Self {
        let classes: ClassTable = program
            .classes
            .into_values()
            .map(|decl| {
                let methods = decl
                    .methods
                    .into_iter()
                    .map(|(name, method)| (name, Rc::new(method)))
                    .collect();
                let class = Class::new(decl.name.clone(), decl.parent, methods);
                (decl.name, Rc::new(class))
            })
            .collect();
        Class::link_parents(&classes);
        let functions = program
            .functions
            .into_iter()
            .map(|(name, function)| (name, Rc::new(function)))
            .collect();

        Self {
            classes,
            functions,
            globals: Globals::new(),
            objects: program.objects,
            imports: program.imports,
            entry: program.call,
            call_stack: Vec::new(),
            imported_modules: IndexMap::new(),
            stdout: session.stdout(),
            stdin: session.stdin(),
            session: Rc::downgrade(session),
            file: program.path.as_ref().map(|p| p.display().to_string()),
            base_dir: program
                .path
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf),
            max_call_depth: session.config().max_call_depth,
            initialized: false,
        }
    }

    /// Binds document imports and constructs the declared objects, in order.
    pub fn initialize(&mut self) -> Result<(), HplError> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;

        for import in self.imports.clone() {
            let module = self.import(&import.module)?;
            let binding = import.binding().to_string();
            self.globals
                .insert(binding.clone(), Value::Module(module.clone()));
            self.imported_modules.insert(binding, module);
        }

        for (name, decl) in self.objects.clone() {
            let Some(class) = self.classes.get(&decl.class_name).cloned() else {
                return Err(self.located(HplError::name(format!(
                    "Class '{}' not found",
                    decl.class_name
                ))));
            };
            let args = decl
                .args
                .iter()
                .map(|raw| object_argument(raw, &self.globals))
                .collect();
            tracing::debug!(object = %name, class = %class.name, "constructing object");
            let object = self
                .instantiate(&class, name.clone(), args)
                .map_err(|e| self.located(e))?;
            self.globals.insert(name, Value::Object(object));
        }
        Ok(())
    }

    /// Runs the entry point: the `call` directive, else `main` if defined.
    pub fn run(&mut self) -> Result<Value, HplError> {
        self.initialize()?;

        let result = match self.entry.clone() {
            Some(entry) => {
                let mut scope = Scope::new();
                let mut args = Vec::with_capacity(entry.args.len());
                for arg in &entry.args {
                    args.push(self.evaluate(arg, &mut scope)?);
                }
                if self.functions.contains_key(&entry.function) {
                    self.call_function(&entry.function, args)
                } else {
                    Err(HplError::name(format!(
                        "Unknown call target: '{}'",
                        entry.function
                    )))
                }
            }
            None if self.functions.contains_key("main") => self.call_function("main", Vec::new()),
            None => Ok(Value::Null),
        };
        result.map_err(|e| self.located(e))
    }

    /// Classes with the parameter count of their own constructor.
    pub fn class_signatures(&self) -> Vec<(String, usize)> {
        self.classes
            .values()
            .map(|class| {
                let params = class
                    .constructor()
                    .map_or(0, |(_, decl)| decl.params.len());
                (class.name.clone(), params)
            })
            .collect()
    }

    pub fn function_signatures(&self) -> Vec<(String, usize)> {
        self.functions
            .iter()
            .map(|(name, decl)| (name.clone(), decl.params.len()))
            .collect()
    }

    pub fn object_names(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    pub fn imported_modules(&self) -> impl Iterator<Item = (&String, &Rc<dyn Module>)> {
        self.imported_modules.iter()
    }

    fn located(&self, error: HplError) -> HplError {
        match &self.file {
            Some(file) => error.in_file(file.clone()),
            None => error,
        }
    }

    /// Attaches location, call stack and file. Only the innermost site adds
    /// the local-variable hint.
    fn enrich(&self, error: HplError, span: Span, scope: &Scope) -> HplError {
        let fresh = error.line.is_none();
        let error = self
            .located(error.at(span))
            .with_call_stack(&self.call_stack);
        if !fresh {
            return error;
        }
        let locals = scope.preview(5);
        if locals.is_empty() {
            error
        } else {
            error.with_hint(format!("local variables: {}", locals.join(", ")))
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), HplError> {
        writeln!(self.stdout.borrow_mut(), "{line}")
            .map_err(|e| HplError::io(format!("Failed to write output: {e}")))
    }

    fn import(&mut self, name: &str) -> Result<Rc<dyn Module>, HplError> {
        let Some(session) = self.session.upgrade() else {
            return Err(HplError::import(format!(
                "Cannot import module '{name}': the loading session has ended"
            )));
        };
        session.load_module(name, self.base_dir.as_deref())
    }

    fn execute_block(&mut self, block: &Block, scope: &mut Scope) -> Result<Flow, HplError> {
        for statement in &block.statements {
            match self.execute(statement, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn execute(&mut self, statement: &Statement, scope: &mut Scope) -> Result<Flow, HplError> {
        match self.execute_statement(statement, scope) {
            Ok(flow) => Ok(flow),
            Err(error) => Err(self.enrich(error, statement.span(), scope)),
        }
    }

    fn execute_statement(
        &mut self,
        statement: &Statement,
        scope: &mut Scope,
    ) -> Result<Flow, HplError> {
        match statement {
            Statement::Expression(expression) => {
                self.evaluate(expression, scope)?;
            }
            Statement::Assign { target, expr, .. } => {
                let value = self.evaluate(expr, scope)?;
                match target.rsplit_once('.') {
                    Some((base, property)) => {
                        let object = self.property_owner(base, property, scope)?;
                        object.set(property, value);
                    }
                    None => scope.assign(target, value, &mut self.globals),
                }
            }
            Statement::IndexAssign {
                target,
                index,
                expr,
                ..
            } => {
                let container = match target.rsplit_once('.') {
                    Some((base, property)) => {
                        let object = self.property_owner(base, property, scope)?;
                        let existing = object.get(property);
                        match existing {
                            Some(value) => value,
                            None => {
                                let dict = Value::dict(IndexMap::new());
                                object.set(property, dict.clone());
                                dict
                            }
                        }
                    }
                    None => self.lookup(target, scope)?,
                };
                let index = self.evaluate(index, scope)?;
                let value = self.evaluate(expr, scope)?;
                index::set(&container, index, value)?;
            }
            Statement::Return(expression, _) => {
                let value = match expression {
                    Some(expression) => self.evaluate(expression, scope)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(value));
            }
            Statement::If {
                condition,
                then_block,
                else_block,
                ..
            } => {
                if self.evaluate(condition, scope)?.is_truthy() {
                    return self.execute_block(then_block, scope);
                } else if let Some(else_block) = else_block {
                    return self.execute_block(else_block, scope);
                }
            }
            Statement::ForIn {
                variable,
                iterable,
                body,
                ..
            } => {
                let items: Vec<Value> = match self.evaluate(iterable, scope)? {
                    Value::List(items) => items.borrow().clone(),
                    Value::Dict(entries) => entries
                        .borrow()
                        .keys()
                        .cloned()
                        .map(DictKey::into_value)
                        .collect(),
                    Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                    other => {
                        return Err(HplError::type_error(format!(
                            "Cannot iterate over {} value",
                            other.type_name()
                        ))
                        .with_key(keys::TYPE_INVALID_OPERATION))
                    }
                };
                for item in items {
                    scope.declare(variable.clone(), item);
                    match self.execute_block(body, scope)? {
                        Flow::Break(_) => break,
                        Flow::Normal | Flow::Continue(_) => {}
                        flow => return Ok(flow),
                    }
                }
            }
            Statement::While {
                condition, body, ..
            } => {
                while self.evaluate(condition, scope)?.is_truthy() {
                    match self.execute_block(body, scope)? {
                        Flow::Break(_) => break,
                        Flow::Normal | Flow::Continue(_) => {}
                        flow => return Ok(flow),
                    }
                }
            }
            Statement::Break(span) => return Ok(Flow::Break(*span)),
            Statement::Continue(span) => return Ok(Flow::Continue(*span)),
            Statement::Throw(expression, _) => {
                let value = match expression {
                    Some(expression) => Some(self.evaluate(expression, scope)?),
                    None => None,
                };
                return Err(match value {
                    Some(Value::Error(error)) => (*error).clone(),
                    Some(value) => HplError::runtime(value.to_string()),
                    None => HplError::runtime("Exception thrown"),
                });
            }
            Statement::Try {
                try_block,
                catches,
                finally_block,
                span,
            } => {
                let outcome = match self.execute_block(try_block, scope) {
                    Err(error) => {
                        let clause = catches.iter().find(|clause| {
                            clause
                                .error_type
                                .as_deref()
                                .map_or(true, |name| error.kind.is_caught_by(name))
                        });
                        match clause {
                            Some(clause) => {
                                tracing::trace!(kind = %error.kind, "caught");
                                scope.declare(clause.variable.clone(), Value::Error(Rc::new(error)));
                                self.execute_block(&clause.block, scope)
                            }
                            None => Err(error.at(*span)),
                        }
                    }
                    flow => flow,
                };
                if let Some(finally_block) = finally_block {
                    match self.execute_block(finally_block, scope)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                return outcome;
            }
            Statement::Echo(expression, _) => {
                let value = self.evaluate(expression, scope)?;
                self.write_line(&value.to_string())?;
            }
            Statement::Import { module, alias, .. } => {
                let loaded = self.import(module)?;
                let binding = alias.clone().unwrap_or_else(|| module.clone());
                scope.declare(binding.clone(), Value::Module(loaded.clone()));
                self.imported_modules.insert(binding, loaded);
            }
            Statement::Increment(name, _) => {
                self.increment(name, scope)?;
            }
            Statement::Block(block) => return self.execute_block(block, scope),
        }
        Ok(Flow::Normal)
    }

    /// The object whose `property` a dotted assignment writes.
    fn property_owner(
        &mut self,
        base: &str,
        property: &str,
        scope: &Scope,
    ) -> Result<Rc<Object>, HplError> {
        match self.resolve_path(base, scope)? {
            Value::Object(object) => Ok(object),
            other => Err(HplError::type_error(format!(
                "Cannot set property '{property}' on {} value",
                other.type_name()
            ))
            .with_key(keys::TYPE_INVALID_OPERATION)),
        }
    }

    /// Adds one to a numeric variable, returning the previous value.
    fn increment(&mut self, name: &str, scope: &mut Scope) -> Result<Value, HplError> {
        let current = self.resolve_path(name, scope)?;
        let next = match &current {
            Value::Int(n) => n
                .checked_add(1)
                .map(Value::Int)
                .ok_or_else(|| HplError::value(format!("Integer overflow incrementing '{name}'")))?,
            Value::Float(n) => Value::Float(n + 1.0),
            other => {
                return Err(HplError::type_error(format!(
                    "Cannot increment {} value '{name}'",
                    other.type_name()
                ))
                .with_key(keys::TYPE_INVALID_OPERATION))
            }
        };
        match name.rsplit_once('.') {
            Some((base, property)) => self.property_owner(base, property, scope)?.set(property, next),
            None => scope.assign(name, next, &mut self.globals),
        }
        Ok(current)
    }

    fn evaluate(&mut self, expression: &Expression, scope: &mut Scope) -> Result<Value, HplError> {
        match self.evaluate_expression(expression, scope) {
            Ok(value) => Ok(value),
            Err(error) => Err(self.enrich(error, expression.span(), scope)),
        }
    }

    fn evaluate_expression(
        &mut self,
        expression: &Expression,
        scope: &mut Scope,
    ) -> Result<Value, HplError> {
        match expression {
            Expression::Literal(literal, _) => Ok(match literal {
                Literal::Integer(n) => Value::Int(*n),
                Literal::Float(n) => Value::Float(*n),
                Literal::String(s) => Value::str(s),
                Literal::Boolean(b) => Value::Bool(*b),
                Literal::Null => Value::Null,
            }),
            Expression::Variable(path, _) => self.resolve_path(path, scope),
            Expression::Binary(left, InfixOperator::And, right, _) => {
                let left = self.evaluate(left, scope)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(right, scope)
            }
            Expression::Binary(left, InfixOperator::Or, right, _) => {
                let left = self.evaluate(left, scope)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.evaluate(right, scope)
            }
            Expression::Binary(left, op, right, _) => {
                let left = self.evaluate(left, scope)?;
                let right = self.evaluate(right, scope)?;
                operators::binary(*op, left, right)
            }
            Expression::Unary(op, operand, _) => {
                let operand = self.evaluate(operand, scope)?;
                operators::unary(*op, operand)
            }
            Expression::FunctionCall(name, args, _) => {
                let args = self.evaluate_all(args, scope)?;
                self.call_named(name, args)
            }
            Expression::MethodCall {
                object,
                method,
                args,
                ..
            } => {
                let receiver = self.evaluate(object, scope)?;
                let args = self.evaluate_all(args, scope)?;
                self.call_on(receiver, method, args, scope)
            }
            Expression::PostfixIncrement(name, _) => self.increment(name, scope),
            Expression::Array(items, _) => Ok(Value::list(self.evaluate_all(items, scope)?)),
            Expression::Index(target, index, _) => {
                let target = self.evaluate(target, scope)?;
                let index = self.evaluate(index, scope)?;
                index::get(&target, &index)
            }
            Expression::Dict(pairs, _) => {
                let mut entries = IndexMap::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let key = DictKey::try_from(&self.evaluate(key, scope)?)?;
                    let value = self.evaluate(value, scope)?;
                    entries.insert(key, value);
                }
                Ok(Value::dict(entries))
            }
        }
    }

    fn evaluate_all(
        &mut self,
        expressions: &[Expression],
        scope: &mut Scope,
    ) -> Result<Vec<Value>, HplError> {
        let mut values = Vec::with_capacity(expressions.len());
        for expression in expressions {
            values.push(self.evaluate(expression, scope)?);
        }
        Ok(values)
    }

    /// A bare call: class instantiation, then built-ins, then top-level functions.
    fn call_named(&mut self, name: &str, args: Vec<Value>) -> Result<Value, HplError> {
        if self.classes.contains_key(name) {
            return self.instantiate_class(name, args);
        }
        if builtins::is_builtin(name) {
            return self
                .call_builtin(name, args)
                .unwrap_or_else(|| Err(self.unknown_function(name)));
        }
        if self.functions.contains_key(name) {
            return self.call_function(name, args);
        }
        Err(self.unknown_function(name))
    }

    fn call_on(
        &mut self,
        receiver: Value,
        method: &str,
        args: Vec<Value>,
        scope: &Scope,
    ) -> Result<Value, HplError> {
        match receiver {
            Value::Object(object) => self.call_method(&object, method, args),
            Value::Class(class) => {
                self.call_parent_method(&class, method, args, scope.this().cloned())
            }
            Value::Module(module) if args.is_empty() => match module.constant(method) {
                Ok(value) => Ok(value),
                Err(_) => module.call(method, args),
            },
            Value::Module(module) => module.call(method, args),
            Value::Error(error) if args.is_empty() => error_property(&error, method),
            other => Err(HplError::type_error(format!(
                "Cannot call method '{method}' on {} value",
                other.type_name()
            ))
            .with_key(keys::TYPE_INVALID_OPERATION)),
        }
    }

    fn lookup(&self, name: &str, scope: &Scope) -> Result<Value, HplError> {
        if let Some(value) = scope.get(name, &self.globals) {
            return Ok(value);
        }
        if name == "this" {
            return Err(HplError::name(
                "'this' is not defined outside of method context",
            ));
        }
        if let Some(module) = self.imported_modules.get(name) {
            return Ok(Value::Module(module.clone()));
        }

        let similar = suggestions(name, scope.names(&self.globals), 3);
        let error = HplError::name(format!("Undefined variable: '{name}'"))
            .with_key(keys::RUNTIME_UNDEFINED_VAR);
        Err(if similar.is_empty() {
            error
        } else {
            error.with_hint(format!("did you mean: {}?", similar.join(", ")))
        })
    }

    /// Resolves `a.b.c` left to right.
    fn resolve_path(&mut self, path: &str, scope: &Scope) -> Result<Value, HplError> {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let mut current = self.lookup(first, scope)?;
        let mut through_this = first == "this";
        for segment in segments {
            current = self.member(current, segment, through_this, scope)?;
            through_this = false;
        }
        Ok(current)
    }

    fn member(
        &self,
        base: Value,
        property: &str,
        through_this: bool,
        scope: &Scope,
    ) -> Result<Value, HplError> {
        match base {
            Value::Object(object) => {
                if let Some(value) = object.get(property) {
                    return Ok(value);
                }
                if property == "parent" {
                    // `this.parent` is relative to the class defining the running method.
                    let class = match scope.owner() {
                        Some(owner) if through_this => owner.clone(),
                        _ => object.class.clone(),
                    };
                    return self.parent_of(&class);
                }
                let attributes: Vec<String> = object.attributes.borrow().keys().cloned().collect();
                let similar = suggestions(property, attributes.iter().map(String::as_str), 3);
                let error = HplError::attribute(format!(
                    "Property '{property}' not found in object '{}'",
                    object.name
                ))
                .with_key(keys::TYPE_MISSING_PROPERTY);
                Err(if similar.is_empty() {
                    error
                } else {
                    error.with_hint(format!("did you mean: {}?", similar.join(", ")))
                })
            }
            Value::Class(class) if property == "parent" => self.parent_of(&class),
            Value::Module(module) => module.constant(property),
            Value::Error(error) => error_property(&error, property),
            other => Err(HplError::type_error(format!(
                "Cannot access property '{property}' on {} value",
                other.type_name()
            ))
            .with_key(keys::TYPE_MISSING_PROPERTY)),
        }
    }

    fn parent_of(&self, class: &Rc<Class>) -> Result<Value, HplError> {
        class
            .parent_class()
            .map(Value::Class)
            .ok_or_else(|| {
                HplError::attribute(format!("Class '{}' has no parent class", class.name))
            })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_object_argument_coercion() {
        let mut globals = Globals::new();
        globals.insert("limit".to_string(), Value::Int(10));

        assert_eq!(object_argument(" 42 ", &globals), Value::Int(42));
        assert_eq!(object_argument("2.5", &globals), Value::Float(2.5));
        assert_eq!(object_argument("\"Rex\"", &globals), Value::str("Rex"));
        assert_eq!(object_argument("'a'", &globals), Value::str("a"));
        assert_eq!(object_argument("true", &globals), Value::Bool(true));
        assert_eq!(object_argument("null", &globals), Value::Null);
        assert_eq!(object_argument("limit", &globals), Value::Int(10));
        assert_eq!(object_argument("plain", &globals), Value::str("plain"));
    }

    #[test]
    fn test_error_properties() {
        let error = HplError::key("missing").at(Span::new(3, 7));
        assert_eq!(error_property(&error, "type").unwrap(), Value::str("KeyError"));
        assert_eq!(error_property(&error, "line").unwrap(), Value::Int(3));
        assert_eq!(error_property(&error, "file").unwrap(), Value::Null);
        assert!(error_property(&error, "stack").is_err());
    }
}
