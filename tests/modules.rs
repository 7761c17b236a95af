use std::{
    cell::RefCell,
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    rc::Rc,
};

use hpl::{
    config::Config,
    error::{keys, ErrorKind},
    loader::Session,
    module::HostPackage,
    tree_walk_interpreter::Value,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    output: Rc<RefCell<Vec<u8>>>,
    session: Rc<Session>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(|config, _| config)
    }

    fn with_config(configure: impl FnOnce(Config, &Path) -> Config) -> Self {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let config = Config {
            package_dir: dir.path().join("packages"),
            extra_paths: Vec::new(),
            working_dir: dir.path().to_path_buf(),
            max_call_depth: 32,
        };
        let config = configure(config, dir.path());
        let output = Rc::new(RefCell::new(Vec::new()));
        let session = Session::with_io(
            config,
            output.clone(),
            Rc::new(RefCell::new(Cursor::new(Vec::new()))),
        );
        Self {
            dir,
            output,
            session,
        }
    }

    fn write(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("fixture directory should be created");
        }
        fs::write(path, content).expect("fixture should be written");
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn output(&self) -> String {
        String::from_utf8(self.output.take()).expect("Output should be valid UTF-8")
    }
}

const GEOMETRY: &str = r#"
classes:
  Square:
    init: (side) => {
        this.side = side
      }
    area: () => {
        return this.side * this.side
      }
objects:
  unit: Square(1)
double: (x) => { return x * 2; }
"#;

#[test]
fn test_language_module_exports() {
    let fixture = Fixture::new();
    fixture.write("geometry.hpl", GEOMETRY);
    fixture.write(
        "main.hpl",
        r#"
imports:
  - geometry
main: () => {
    sq = geometry.Square(3)
    echo sq.area()
    echo geometry.double(21)
    echo geometry.unit.side
  }
"#,
    );

    fixture
        .session
        .run_file(&fixture.path("main.hpl"))
        .unwrap_or_else(|e| panic!("{}", e.report()));
    assert_eq!(fixture.output(), "9\n42\n1\n");
    assert!(fixture.session.is_cached("geometry"));
}

#[test]
fn test_module_arity_is_value_error() {
    let fixture = Fixture::new();
    fixture.write("geometry.hpl", GEOMETRY);
    let module = fixture
        .session
        .load_module("geometry", Some(fixture.dir.path()))
        .unwrap();

    let err = module
        .call("double", vec![Value::Int(1), Value::Int(2)])
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Value);
    assert_eq!(err.message, "Function 'double' expects 1 arguments, got 2");

    let err = module.call("Square", vec![]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Value);
    assert_eq!(err.message, "Constructor 'Square' expects 1 arguments, got 0");

    let err = module.call("triple", vec![Value::Int(1)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Attribute);
}

#[test]
fn test_index_file_in_package_dir() {
    let fixture = Fixture::new();
    fixture.write(
        "packages/greetings/index.hpl",
        "hello: (name) => { return \"hello \" + name; }\n",
    );
    let module = fixture.session.load_module("greetings", None).unwrap();
    assert_eq!(
        module.call("hello", vec![Value::str("ada")]).unwrap(),
        Value::str("hello ada")
    );
}

#[test]
fn test_circular_import_then_recovery() {
    let fixture = Fixture::new();
    fixture.write("a.hpl", "imports:\n  - b\nvalue: () => { return 1; }\n");
    fixture.write("b.hpl", "imports:\n  - a\nother: () => { return 2; }\n");
    fixture.write("main.hpl", "imports:\n  - a\nmain: () => { return a.value(); }\n");

    let err = fixture
        .session
        .run_file(&fixture.path("main.hpl"))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Import);
    assert_eq!(err.error_key, keys::IMPORT_CIRCULAR);
    assert_eq!(
        err.message,
        "Circular import detected: 'a' is already being loaded. Import chain: a -> b -> a"
    );
    assert!(!fixture.session.is_cached("a"));

    fixture.write("b.hpl", "other: () => { return 2; }\n");
    let value = fixture
        .session
        .run_file(&fixture.path("main.hpl"))
        .unwrap_or_else(|e| panic!("{}", e.report()));
    assert_eq!(value, Value::Int(1));
    assert!(fixture.session.is_cached("a"));
    assert!(fixture.session.is_cached("b"));
}

#[test]
fn test_nested_imports_are_exposed() {
    let fixture = Fixture::new();
    fixture.write("inner.hpl", "ping: () => { return \"pong\"; }\n");
    fixture.write("outer.hpl", "imports:\n  - inner: i\n");
    let outer = fixture
        .session
        .load_module("outer", Some(fixture.dir.path()))
        .unwrap();
    let Value::Module(inner) = outer.constant("i").unwrap() else {
        panic!("nested import should be a module constant");
    };
    assert_eq!(inner.call("ping", vec![]).unwrap(), Value::str("pong"));
}

#[test]
fn test_broken_module_is_import_error() {
    let fixture = Fixture::new();
    fixture.write("broken.hpl", "main: () => { x = ; }\n");
    let err = fixture
        .session
        .load_module("broken", Some(fixture.dir.path()))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Import);
    assert!(err.message.starts_with("Cannot import module 'broken': "));
    assert!(!fixture.session.is_cached("broken"));
}

#[test]
fn test_missing_module() {
    let fixture = Fixture::new();
    let err = fixture
        .session
        .run_source("imports:\n  - ghost\n", None)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Import);
    assert_eq!(err.error_key, keys::IMPORT_MODULE_NOT_FOUND);
}

#[test]
fn test_host_package_import() {
    let fixture = Fixture::new();
    fixture.session.register_host_package(
        HostPackage::new("counter")
            .with_function("count", |args| Ok(Value::Int(args.len() as i64)))
            .with_value("LIMIT", Value::Int(10)),
    );
    let value = fixture
        .session
        .run_source(
            "imports:\n  - counter\nmain: () => { return counter.count(1, 2, 3) + counter.LIMIT; }\n",
            None,
        )
        .unwrap();
    assert_eq!(value, Value::Int(13));
}

#[test]
fn test_includes_from_module_path() {
    let fixture = Fixture::with_config(|config, dir| config.with_module_path(dir.join("lib")));
    fixture.write(
        "lib/shared.hpl",
        "helper: () => { return \"shared\"; }\nmain: () => { return \"overridden\"; }\n",
    );
    fixture.write(
        "app/main.hpl",
        "includes:\n  - shared.hpl\nmain: () => { return helper(); }\n",
    );

    let value = fixture
        .session
        .run_file(&fixture.path("app/main.hpl"))
        .unwrap_or_else(|e| panic!("{}", e.report()));
    assert_eq!(value, Value::str("shared"));
}

#[test]
fn test_module_next_to_importing_file() {
    let fixture = Fixture::new();
    fixture.write("project/util.hpl", "answer: () => { return 42; }\n");
    fixture.write(
        "project/main.hpl",
        "main: () => {\n    import util\n    return util.answer()\n  }\n",
    );
    let value = fixture
        .session
        .run_file(&fixture.path("project/main.hpl"))
        .unwrap();
    assert_eq!(value, Value::Int(42));
}
