use std::{cell::RefCell, io::Cursor, rc::Rc};

use hpl::{
    config::Config,
    error::{keys, ErrorKind, HplError},
    loader::Session,
    tree_walk_interpreter::Value,
};
use pretty_assertions::assert_eq;

fn run_with_input(source: &str, input: &str) -> (Result<Value, HplError>, String) {
    let output = Rc::new(RefCell::new(Vec::new()));
    let config = Config::default().with_max_call_depth(32);
    let session = Session::with_io(
        config,
        output.clone(),
        Rc::new(RefCell::new(Cursor::new(input.as_bytes().to_vec()))),
    );
    let result = session.run_source(source, None);
    let output = String::from_utf8(output.take()).expect("Output should be valid UTF-8");
    (result, output)
}

fn run(source: &str) -> (Result<Value, HplError>, String) {
    run_with_input(source, "")
}

fn test_valid_program(source: &str, expected_output: &str) -> Value {
    let (result, output) = run(source);
    let value = result.unwrap_or_else(|e| panic!("Program should run:\n{}", e.report()));
    assert_eq!(output, expected_output);
    value
}

fn test_failing_program(source: &str) -> HplError {
    let (result, _) = run(source);
    result.expect_err("Program should fail")
}

#[test]
fn test_fib() {
    let source = r#"
fib: (n) => {
    if (n <= 1):
      return n
    return fib(n - 1) + fib(n - 2)
  }
main: () => {
    for (i in range(10)):
      echo fib(i)
  }
"#;
    test_valid_program(source, "0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n");
}

#[test]
fn test_main_return_value() {
    let value = test_valid_program("main: () => { return 1 + 2; }", "");
    assert_eq!(value, Value::Int(3));
}

#[test]
fn test_call_directive() {
    let source = r#"
add: (a, b) => { return a + b; }
call: add(2, 40)
"#;
    assert_eq!(test_valid_program(source, ""), Value::Int(42));

    let err = test_failing_program("call: missing()");
    assert_eq!(err.kind, ErrorKind::Name);
    assert_eq!(err.message, "Unknown call target: 'missing'");
}

#[test]
fn test_arithmetic_and_plus() {
    let source = r#"
main: () => {
    echo 1 + 2
    echo 1.5 + 1
    echo [1, 2] + [3]
    echo "n=" + 5
    echo 7 / 2
    echo -7 % 3
    echo 2 * 3 == 6.0
  }
"#;
    test_valid_program(source, "3\n2.5\n[1, 2, 3]\nn=5\n3.5\n2\ntrue\n");
}

#[test]
fn test_logical_operators_return_operands() {
    let source = r#"
main: () => {
    echo null || "default"
    echo 0 && crash()
    echo 1 && 2
  }
"#;
    test_valid_program(source, "default\n0\n2\n");
}

#[test]
fn test_division_by_zero() {
    let err = test_failing_program("main: () => { return 1 / 0; }");
    assert_eq!(err.kind, ErrorKind::Division);
    assert_eq!(err.error_key, keys::RUNTIME_DIVISION_BY_ZERO);
    assert_eq!(err.line, Some(1));
    assert_eq!(err.call_stack, vec!["main()".to_string()]);
    assert!(err.report().starts_with("DivisionError: Division by zero"));
}

#[test]
fn test_type_errors() {
    let err = test_failing_program(r#"main: () => { return "a" - 1; }"#);
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("-"));

    let err = test_failing_program("main: () => { return !5; }");
    assert_eq!(err.kind, ErrorKind::Type);

    let err = test_failing_program(r#"main: () => { return int("abc"); }"#);
    assert_eq!(err.kind, ErrorKind::Type);
    assert_eq!(err.error_key, keys::TYPE_CONVERSION_FAILED);
}

#[test]
fn test_missing_dict_key() {
    let source = r#"
main: () => {
    d = {"name": "Rex", "age": 3}
    return d["nmae"]
  }
"#;
    let err = test_failing_program(source);
    assert_eq!(err.kind, ErrorKind::Key);
    assert_eq!(
        err.message,
        r#"Key "nmae" (type: string) not found in dictionary. Available keys: ["name", "age"]"#
    );
    assert!(err.hints.iter().any(|h| h == "did you mean 'name'?"));
    assert!(err.hints.iter().any(|h| h.starts_with("local variables: d = ")));
}

#[test]
fn test_list_index_errors() {
    let err = test_failing_program("main: () => { items = [1, 2, 3]; return items[-1]; }");
    assert_eq!(err.kind, ErrorKind::Index);
    assert_eq!(err.message, "Array index -1 out of bounds (length: 3)");
    assert!(err
        .hints
        .iter()
        .any(|h| h.contains("use 2 to reach element 1 from the end")));

    let err = test_failing_program(r#"main: () => { items = [1, 2, 3]; return items["1"]; }"#);
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.hints.iter().any(|h| h == r#"convert it first: int("1")"#));

    let err = test_failing_program(r#"main: () => { return "abc"[3]; }"#);
    assert_eq!(err.kind, ErrorKind::Index);
}

#[test]
fn test_undefined_variable_suggestion() {
    let err = test_failing_program("main: () => { total = 1; return totl; }");
    assert_eq!(err.kind, ErrorKind::Name);
    assert_eq!(err.message, "Undefined variable: 'totl'");
    assert!(err.hints.iter().any(|h| h == "did you mean: total?"));
}

#[test]
fn test_inherited_method() {
    let source = r#"
classes:
  Animal:
    speak: () => { return "..."; }
  Dog:
    parent: Animal
main: () => {
    d = Dog()
    return d.speak()
  }
"#;
    assert_eq!(test_valid_program(source, ""), Value::str("..."));
}

#[test]
fn test_three_level_parent_calls() {
    let source = r#"
classes:
  Base:
    init: (name) => {
        this.name = name
      }
    describe: () => {
        return "base " + this.name
      }
    greet: () => {
        return "hello from " + this.name
      }
  Middle:
    parent: Base
    init: (name) => {
        this.parent.init(name)
        this.level = 2
      }
    describe: () => {
        return "middle(" + this.parent.describe() + ")"
      }
  Leaf:
    parent: Middle
    __init__: (name) => {
        this.parent.init(name)
        this.level = 3
      }
    describe: () => {
        return "leaf(" + this.parent.describe() + ")"
      }
objects:
  leaf: Leaf("x")
main: () => {
    echo leaf.describe()
    echo leaf.greet()
    echo leaf.level
  }
"#;
    test_valid_program(source, "leaf(middle(base x))\nhello from x\n3\n");
}

#[test]
fn test_parent_constructor_is_not_implicit() {
    let source = r#"
classes:
  Base:
    init: () => {
        echo "base init"
      }
  Child:
    parent: Base
    init: () => {
        echo "child init"
      }
main: () => {
    c = Child()
  }
"#;
    test_valid_program(source, "child init\n");
}

#[test]
fn test_constructor_aliases() {
    let source = r#"
classes:
  Point:
    __init__: (x) => {
        this.x = x
      }
main: () => {
    p = Point(4)
    p.init(9)
    return p.x
  }
"#;
    assert_eq!(test_valid_program(source, ""), Value::Int(9));
}

#[test]
fn test_dunder_init_reaches_init() {
    let source = r#"
classes:
  Counter:
    init: (start) => {
        this.value = start
      }
main: () => {
    c = Counter(1)
    c.__init__(5)
    return c.value
  }
"#;
    assert_eq!(test_valid_program(source, ""), Value::Int(5));
}

#[test]
fn test_missing_method() {
    let source = r#"
classes:
  Box:
    init: () => { this.size = 1; }
main: () => {
    b = Box()
    echo b.size()
    b.open()
  }
"#;
    let (result, output) = run(source);
    assert_eq!(output, "1\n");
    let err = result.expect_err("missing method should fail");
    assert_eq!(err.kind, ErrorKind::Attribute);
    assert_eq!(err.message, "Method or attribute 'open' not found in class 'Box'");
    assert_eq!(err.call_stack, vec!["main()".to_string()]);
}

#[test]
fn test_for_break() {
    let source = r#"
main: () => {
    for (i in [1, 2, 3]):
      if (i == 2):
        break
    return i
  }
"#;
    assert_eq!(test_valid_program(source, ""), Value::Int(2));
}

#[test]
fn test_loops() {
    let source = r#"
main: () => {
    i = 0
    total = 0
    while (i < 5) {
      i++
      if (i == 2) { continue; }
      total = total + i
    }
    echo total
    for (key in {"a": 1, "b": 2}):
      echo key
    for (c in "hi"): echo c
  }
"#;
    test_valid_program(source, "13\na\nb\nh\ni\n");
}

#[test]
fn test_try_catch_finally() {
    let source = r#"
main: () => {
    try:
      x = 10 % 0
    catch (DivisionError e):
      echo "caught " + e.type
    finally:
      echo "finally"
    return 1
  }
"#;
    let value = test_valid_program(source, "caught DivisionError\nfinally\n");
    assert_eq!(value, Value::Int(1));
}

#[test]
fn test_catch_by_category() {
    let source = r#"
main: () => {
    try:
      d = {"a": 1}
      echo d["b"]
    catch (RuntimeError e):
      echo e.type
    try:
      throw "boom"
    catch (TypeError e):
      echo "wrong clause"
    catch (err):
      echo "any " + err.message
    try:
      x = undefined_name
    catch (hplnameerror e):
      echo "prefixed " + e.type
  }
"#;
    test_valid_program(source, "KeyError\nany boom\nprefixed NameError\n");
}

#[test]
fn test_unmatched_catch_runs_finally() {
    let source = r#"
main: () => {
    try:
      x = [1, 2][5]
    catch (KeyError e):
      echo "no"
    finally:
      echo "cleanup"
  }
"#;
    let (result, output) = run(source);
    assert_eq!(output, "cleanup\n");
    assert_eq!(result.expect_err("should propagate").kind, ErrorKind::Index);
}

#[test]
fn test_return_in_finally_overrides() {
    let source = r#"
main: () => {
    try:
      throw "lost"
    finally:
      return 7
  }
"#;
    assert_eq!(test_valid_program(source, ""), Value::Int(7));
}

#[test]
fn test_return_in_finally_overrides_try_return() {
    let source = r#"
main: () => {
    try:
      return 1
    finally:
      echo "finally"
      return 7
  }
"#;
    assert_eq!(test_valid_program(source, "finally\n"), Value::Int(7));
}

#[test]
fn test_rethrow_keeps_kind() {
    let source = r#"
main: () => {
    try:
      x = 1 / 0
    catch (e):
      throw e
  }
"#;
    let err = test_failing_program(source);
    assert_eq!(err.kind, ErrorKind::Division);
    assert_eq!(err.line, Some(3));
}

#[test]
fn test_recursion_limit() {
    let source = r#"
down: (n) => { return down(n + 1); }
main: () => { return down(0); }
"#;
    let err = test_failing_program(source);
    assert_eq!(err.kind, ErrorKind::Recursion);
    assert_eq!(err.call_stack.len(), 32);
    assert_eq!(err.call_stack[0], "main()");
}

#[test]
fn test_property_dict_and_increment() {
    let source = r#"
classes:
  Registry:
    init: () => { this.count = 0; }
    add: (key, value) => {
        this.entries[key] = value
        this.count++
      }
main: () => {
    r = Registry()
    r.add("a", 1)
    r.add("b", 2)
    echo r.entries
    echo r.count
  }
"#;
    test_valid_program(source, "{\"a\": 1, \"b\": 2}\n2\n");
}

#[test]
fn test_builtins() {
    let source = r#"
classes:
  Point:
    init: (x) => { this.x = x; }
main: () => {
    echo type(1)
    echo type(2.5)
    echo type([1])
    echo type(Point(1))
    echo str(10) + "!"
    echo int("42") + 1
    echo len("héllo")
    echo max([3, 9, 2])
    echo min(4, -1)
    echo abs(-3)
  }
"#;
    test_valid_program(
        source,
        "int\nfloat\narray\nPoint\n10!\n43\n5\n9\n-1\n3\n",
    );
}

#[test]
fn test_input() {
    let source = r#"
main: () => {
    name = input("Name? ")
    echo "Hi " + name
    return input()
  }
"#;
    let (result, output) = run_with_input(source, "Ada\n");
    assert_eq!(output, "Name? Hi Ada\n");
    assert_eq!(result.expect_err("EOF should fail").kind, ErrorKind::Io);
}

#[test]
fn test_builtin_module_imports() {
    let source = r#"
imports:
  - math
  - string: s
main: () => {
    echo math.sqrt(16)
    echo s.upper("abc")
    echo math.PI > 3
    import string as tools
    echo tools.trim("  x ")
  }
"#;
    test_valid_program(source, "4.0\nABC\ntrue\nx\n");
}

#[test]
fn test_object_arguments() {
    let source = r#"
classes:
  Pet:
    init: (name, age, owner) => {
        this.name = name
        this.age = age
        this.owner = owner
      }
objects:
  owner: Pet("Sam", 40, null)
  rex: Pet("Rex", 3, owner)
main: () => {
    echo rex.name + " " + str(rex.age + 1) + " " + rex.owner.name
  }
"#;
    test_valid_program(source, "Rex 4 Sam\n");
}

#[test]
fn test_syntax_error_names_function() {
    let err = test_failing_program("helper: () => { x = ; }\nmain: () => { return 1; }");
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert!(err.hints.iter().any(|h| h == "in function 'helper'"));
}

#[test]
fn test_self_referencing_collections() {
    let source = r#"
main: () => {
    a = [0]
    a[0] = a
    echo a
    d = {"k": 1}
    d["self"] = d
    echo d
    echo str(a)
    echo a == a
  }
"#;
    test_valid_program(
        source,
        "[[...]]\n{\"k\": 1, \"self\": {...}}\n[[...]]\ntrue\n",
    );
}

#[test]
fn test_error_hint_with_self_referencing_local() {
    let source = r#"
main: () => {
    a = [0]
    a[0] = a
    return a[5]
  }
"#;
    let err = test_failing_program(source);
    assert_eq!(err.kind, ErrorKind::Index);
    assert!(err.hints.iter().any(|hint| hint.contains("a = [[...]]")));
}
