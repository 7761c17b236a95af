//! Module resolution: built-ins, host packages, `.hpl` files and host-native files.

use std::{
    cell::RefCell,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    rc::Rc,
};

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;

use crate::{
    config::Config,
    document,
    error::{keys, HplError},
    module::{HostPackage, Module, NativeFileLoader, NativeModule},
    stdlib,
    tree_walk_interpreter::{Arity, Evaluator, Value},
};

pub const NATIVE_EXTENSION: &str = "hpl";

/// One program run: module cache, import guard, registered packages and I/O.
pub struct Session {
    config: Config,
    host_packages: RefCell<IndexMap<String, HostPackage>>,
    file_loaders: RefCell<Vec<Rc<dyn NativeFileLoader>>>,
    cache: RefCell<FxHashMap<String, Rc<dyn Module>>>,
    loading: RefCell<IndexSet<String>>,
    stdout: Rc<RefCell<dyn Write>>,
    stdin: Rc<RefCell<dyn BufRead>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("host_packages", &self.host_packages.borrow().keys().collect::<Vec<_>>())
            .field("cached", &self.cache.borrow().keys().collect::<Vec<_>>())
            .field("loading", &self.loading.borrow())
            .finish()
    }
}

impl Session {
    pub fn new(config: Config) -> Rc<Self> {
        Self::with_io(
            config,
            Rc::new(RefCell::new(std::io::stdout())),
            Rc::new(RefCell::new(BufReader::new(std::io::stdin()))),
        )
    }

    pub fn with_io(
        config: Config,
        stdout: Rc<RefCell<dyn Write>>,
        stdin: Rc<RefCell<dyn BufRead>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            config,
            host_packages: RefCell::new(IndexMap::new()),
            file_loaders: RefCell::new(Vec::new()),
            cache: RefCell::new(FxHashMap::default()),
            loading: RefCell::new(IndexSet::new()),
            stdout,
            stdin,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stdout(&self) -> Rc<RefCell<dyn Write>> {
        self.stdout.clone()
    }

    pub fn stdin(&self) -> Rc<RefCell<dyn BufRead>> {
        self.stdin.clone()
    }

    pub fn register_host_package(&self, package: HostPackage) {
        self.host_packages
            .borrow_mut()
            .insert(package.name.clone(), package);
    }

    pub fn register_file_loader(&self, loader: impl NativeFileLoader + 'static) {
        self.file_loaders.borrow_mut().push(Rc::new(loader));
    }

    /// Forgets every loaded module and any half-finished import.
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
        self.loading.borrow_mut().clear();
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.borrow().contains_key(name)
    }

    /// Parses and runs a document file.
    pub fn run_file(self: &Rc<Self>, path: &Path) -> Result<Value, HplError> {
        tracing::debug!(path = %path.display(), "loading document");
        let program = document::parse_file(path, &self.config.search_paths(path.parent()))?;
        Evaluator::new(program, self).run()
    }

    /// Parses and runs document text. `path` only locates includes and names the file.
    pub fn run_source(self: &Rc<Self>, source: &str, path: Option<&Path>) -> Result<Value, HplError> {
        let search_paths = self.config.search_paths(path.and_then(Path::parent));
        let program = document::parse_str(source, path, &search_paths)?;
        Evaluator::new(program, self).run()
    }

    /// Resolves a module by name. `origin` is the directory of the importing file.
    pub fn load_module(
        self: &Rc<Self>,
        name: &str,
        origin: Option<&Path>,
    ) -> Result<Rc<dyn Module>, HplError> {
        if self.loading.borrow().contains(name) {
            let chain = self
                .loading
                .borrow()
                .iter()
                .map(String::as_str)
                .chain([name])
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(HplError::import(format!(
                "Circular import detected: '{name}' is already being loaded. Import chain: {chain}"
            ))
            .with_key(keys::IMPORT_CIRCULAR));
        }

        if let Some(module) = self.cache.borrow().get(name) {
            tracing::debug!(module = name, "module cache hit");
            return Ok(module.clone());
        }

        self.loading.borrow_mut().insert(name.to_string());
        let result = self.resolve(name, origin);
        self.loading.borrow_mut().shift_remove(name);

        let module = result?;
        self.cache
            .borrow_mut()
            .insert(name.to_string(), module.clone());
        Ok(module)
    }

    fn resolve(self: &Rc<Self>, name: &str, origin: Option<&Path>) -> Result<Rc<dyn Module>, HplError> {
        if let Some(module) = stdlib::builtin(name) {
            tracing::debug!(module = name, "resolved built-in module");
            return Ok(module);
        }

        let package = self.host_packages.borrow().get(name).cloned();
        if let Some(package) = package {
            tracing::debug!(module = name, "resolved host package");
            return Ok(package.into_module());
        }

        let search_paths = self.config.search_paths(origin);
        if let Some(path) = find_module_file(name, NATIVE_EXTENSION, &search_paths) {
            tracing::debug!(module = name, path = %path.display(), "resolved module file");
            return self.load_native_module(name, &path);
        }

        let loaders = self.file_loaders.borrow().clone();
        for loader in loaders {
            if let Some(path) = find_module_file(name, loader.extension(), &search_paths) {
                tracing::debug!(module = name, path = %path.display(), "resolved host-native file");
                return Ok(loader.load(name, &path)?.into_module());
            }
        }

        let searched: Vec<String> = search_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        Err(HplError::import(format!(
            "Module '{name}' not found. Built-in modules: {}",
            stdlib::MODULES.join(", ")
        ))
        .with_key(keys::IMPORT_MODULE_NOT_FOUND)
        .with_hint(format!("searched: {}", searched.join(", "))))
    }

    fn load_native_module(self: &Rc<Self>, name: &str, path: &Path) -> Result<Rc<dyn Module>, HplError> {
        self.build_native_module(name, path).map_err(|error| {
            if error.error_key == keys::IMPORT_CIRCULAR {
                return error;
            }
            tracing::warn!(module = name, error = %error, "module failed to load");
            let mut wrapped = HplError::import(format!(
                "Cannot import module '{name}': {}",
                error.message
            ))
            .with_hints(error.hints);
            wrapped.line = error.line;
            wrapped.column = error.column;
            wrapped.call_stack = error.call_stack;
            wrapped.in_file(
                error
                    .file
                    .unwrap_or_else(|| path.display().to_string()),
            )
        })
    }

    /// Runs a document and exposes its classes, functions, objects and imports.
    fn build_native_module(self: &Rc<Self>, name: &str, path: &Path) -> Result<Rc<dyn Module>, HplError> {
        let program = document::parse_file(path, &self.config.search_paths(path.parent()))?;
        let evaluator = Rc::new(RefCell::new(Evaluator::new(program, self)));
        evaluator.borrow_mut().initialize()?;

        let mut module = NativeModule::new(name, format!("Module loaded from {}", path.display()));
        let state = evaluator.borrow();

        for (class, params) in state.class_signatures() {
            let evaluator = evaluator.clone();
            let class_name = class.clone();
            module.register_constructor(class, Arity::Fixed(params), move |args| {
                enter(&evaluator, |e| e.instantiate_class(&class_name, args))
            });
        }
        for (function, params) in state.function_signatures() {
            let evaluator = evaluator.clone();
            let function_name = function.clone();
            module.register_function(function, Arity::Fixed(params), move |args| {
                enter(&evaluator, |e| e.call_function(&function_name, args))
            });
        }
        for object in state.object_names() {
            if let Some(value) = state.global(&object) {
                module.register_constant(object, value);
            }
        }
        for (alias, imported) in state.imported_modules() {
            module.register_constant(alias.clone(), Value::Module(imported.clone()));
        }
        drop(state);

        Ok(Rc::new(module))
    }
}

/// Runs `f` on a module's evaluator. A module calling back into itself
/// while one of its functions is running is rejected.
fn enter(
    evaluator: &RefCell<Evaluator>,
    f: impl FnOnce(&mut Evaluator) -> Result<Value, HplError>,
) -> Result<Value, HplError> {
    let mut evaluator = evaluator
        .try_borrow_mut()
        .map_err(|_| HplError::runtime("Module function called re-entrantly while it is running"))?;
    f(&mut evaluator)
}

/// `<name>.<ext>` or `<name>/index.<ext>` in the first directory that has one.
/// Dotted names map to nested directories.
fn find_module_file(name: &str, extension: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let relative: PathBuf = name.split('.').collect();
    search_paths.iter().find_map(|dir| {
        let file = dir.join(&relative).with_extension(extension);
        if file.is_file() {
            return Some(file);
        }
        let index = dir.join(&relative).join(format!("index.{extension}"));
        index.is_file().then_some(index)
    })
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use crate::error::ErrorKind;

    fn session(dir: &Path) -> Rc<Session> {
        let config = Config {
            package_dir: dir.join("packages"),
            extra_paths: Vec::new(),
            working_dir: dir.to_path_buf(),
            max_call_depth: 64,
        };
        Session::with_io(
            config,
            Rc::new(RefCell::new(Vec::new())),
            Rc::new(RefCell::new(std::io::Cursor::new(Vec::new()))),
        )
    }

    #[test]
    fn test_find_module_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("geo")).unwrap();
        fs::write(dir.path().join("geo/index.hpl"), "").unwrap();
        fs::write(dir.path().join("util.hpl"), "").unwrap();
        let paths = vec![dir.path().to_path_buf()];

        assert_eq!(
            find_module_file("util", "hpl", &paths),
            Some(dir.path().join("util.hpl"))
        );
        assert_eq!(
            find_module_file("geo", "hpl", &paths),
            Some(dir.path().join("geo/index.hpl"))
        );
        assert_eq!(find_module_file("nothing", "hpl", &paths), None);
    }

    #[test]
    fn test_builtin_modules_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        let first = session.load_module("math", None).unwrap();
        assert!(session.is_cached("math"));
        let second = session.load_module("math", None).unwrap();
        assert!(Rc::ptr_eq(&first, &second));

        session.clear_cache();
        assert!(!session.is_cached("math"));
    }

    #[test]
    fn test_host_package_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        session.register_host_package(
            HostPackage::new("greeter").with_function("hello", |args| {
                Ok(Value::Str(format!("hello {}", args[0])))
            }),
        );
        let module = session.load_module("greeter", None).unwrap();
        assert_eq!(
            module.call("hello", vec![Value::str("bob")]).unwrap(),
            Value::str("hello bob")
        );
    }

    struct TextLoader;

    impl NativeFileLoader for TextLoader {
        fn extension(&self) -> &str {
            "txt"
        }

        fn load(&self, name: &str, path: &Path) -> Result<HostPackage, HplError> {
            let content = fs::read_to_string(path).map_err(|e| HplError::io(e.to_string()))?;
            Ok(HostPackage::new(name).with_value("content", Value::str(content.trim())))
        }
    }

    #[test]
    fn test_native_file_loader() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "remember\n").unwrap();
        let session = session(dir.path());
        session.register_file_loader(TextLoader);

        let module = session.load_module("notes", Some(dir.path())).unwrap();
        assert_eq!(module.constant("content").unwrap(), Value::str("remember"));
    }

    #[test]
    fn test_missing_module_lists_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let err = session(dir.path()).load_module("nowhere", None).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Import);
        assert_eq!(err.error_key, keys::IMPORT_MODULE_NOT_FOUND);
        assert!(err.message.contains("math, string"));
        assert!(err.hints[0].starts_with("searched: "));
    }
}
