//! Top-level documents: YAML mappings of classes, objects, functions and imports.
//!
//! Function values use the arrow literal `(params) => { body }`. Before the
//! YAML is parsed, multi-line arrow literals are rewritten into literal block
//! scalars so their bodies survive untouched.

use std::{
    fs,
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde_yaml::Value as Yaml;

use crate::{
    ast::{Expression, FunctionDecl},
    error::{ErrorKind, HplError},
    parser, tokenizer,
};

const MERGED_KEYS: &[&str] = &["classes", "objects"];

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("YAML syntax error in '{path}': {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("Include file '{include}' not found in any search path")]
    IncludeNotFound { include: String, from: String },
    #[error("{0}")]
    Malformed(String),
    #[error("In function '{name}': {source}")]
    Function { name: String, source: HplError },
}

impl From<DocumentError> for HplError {
    fn from(error: DocumentError) -> Self {
        let message = error.to_string();
        match error {
            DocumentError::Io { path, .. } => {
                HplError::io(message).in_file(path.display().to_string())
            }
            DocumentError::Yaml { path, source } => {
                let mut error = HplError::syntax(message).in_file(path);
                if let Some(location) = source.location() {
                    error.line = Some(location.line());
                    error.column = Some(location.column());
                }
                error
            }
            DocumentError::IncludeNotFound { from, .. } => HplError::import(message).in_file(from),
            DocumentError::Malformed(_) => HplError::syntax(message),
            DocumentError::Function { name, source } => {
                source.with_hint(format!("in function '{name}'"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub parent: Option<String>,
    pub methods: IndexMap<String, FunctionDecl>,
}

/// A deferred `ClassName(args...)` construction. Arguments stay raw text
/// until evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDecl {
    pub class_name: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub module: String,
    pub alias: Option<String>,
}

impl ImportDecl {
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.module)
    }
}

/// The `call` directive: a function name and its literal arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPoint {
    pub function: String,
    pub args: Vec<Expression>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub path: Option<PathBuf>,
    pub classes: IndexMap<String, ClassDecl>,
    pub objects: IndexMap<String, ObjectDecl>,
    pub functions: IndexMap<String, FunctionDecl>,
    pub imports: Vec<ImportDecl>,
    pub call: Option<EntryPoint>,
}

impl Program {
    /// Adds what `other` declares without overriding anything already present.
    fn absorb(&mut self, other: Program) {
        for (name, class) in other.classes {
            self.classes.entry(name).or_insert(class);
        }
        for (name, object) in other.objects {
            self.objects.entry(name).or_insert(object);
        }
        for (name, function) in other.functions {
            self.functions.entry(name).or_insert(function);
        }
        self.imports.extend(other.imports);
    }
}

/// Parses a document file, resolving includes against `search_paths`.
pub fn parse_file(path: &Path, search_paths: &[PathBuf]) -> Result<Program, DocumentError> {
    let mut visited = FxHashSet::default();
    parse_file_inner(path, search_paths, &mut visited)
}

/// Parses document text. `path` locates relative includes and names the file in errors.
pub fn parse_str(
    source: &str,
    path: Option<&Path>,
    search_paths: &[PathBuf],
) -> Result<Program, DocumentError> {
    let mut visited = FxHashSet::default();
    parse_source(source, path, search_paths, &mut visited)
}

fn parse_file_inner(
    path: &Path,
    search_paths: &[PathBuf],
    visited: &mut FxHashSet<PathBuf>,
) -> Result<Program, DocumentError> {
    let source = fs::read_to_string(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_source(&source, Some(path), search_paths, visited)
}

fn parse_source(
    source: &str,
    path: Option<&Path>,
    search_paths: &[PathBuf],
    visited: &mut FxHashSet<PathBuf>,
) -> Result<Program, DocumentError> {
    if let Some(path) = path {
        visited.insert(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()));
    }
    let display = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<document>".to_string());

    let text = rewrite_arrow_functions(&merge_duplicate_keys(source));
    let data: Yaml = serde_yaml::from_str(&text).map_err(|source| DocumentError::Yaml {
        path: display.clone(),
        source,
    })?;
    let data = match data {
        Yaml::Null => serde_yaml::Mapping::new(),
        Yaml::Mapping(mapping) => mapping,
        _ => {
            return Err(DocumentError::Malformed(format!(
                "Document '{display}' must be a mapping at the top level"
            )))
        }
    };

    let mut program = Program {
        path: path.map(Path::to_path_buf),
        ..Program::default()
    };

    for (key, value) in &data {
        let Some(key) = key.as_str() else {
            return Err(DocumentError::Malformed(format!(
                "Top-level keys must be strings, found {key:?}"
            )));
        };
        match key {
            "includes" => {}
            "imports" => program.imports = parse_imports(value)?,
            "classes" => program.classes = parse_classes(value)?,
            "objects" => program.objects = parse_objects(value)?,
            "call" => program.call = Some(parse_call(value)?),
            name => match value {
                Yaml::String(text) if text.contains("=>") => {
                    program
                        .functions
                        .insert(name.to_string(), parse_named_function(name, text)?);
                }
                _ => tracing::trace!(key = name, "ignoring non-function top-level key"),
            },
        }
    }

    if let Some(includes) = data.get("includes") {
        let Yaml::Sequence(includes) = includes else {
            return Err(DocumentError::Malformed("'includes' must be a list".to_string()));
        };
        let base_dir = path.and_then(Path::parent);
        for include in includes {
            let Some(include) = include.as_str() else {
                return Err(DocumentError::Malformed(
                    "'includes' entries must be file names".to_string(),
                ));
            };
            let resolved = resolve_include(include, base_dir, search_paths).ok_or_else(|| {
                DocumentError::IncludeNotFound {
                    include: include.to_string(),
                    from: display.clone(),
                }
            })?;
            let canonical = resolved.canonicalize().unwrap_or_else(|_| resolved.clone());
            if visited.contains(&canonical) {
                tracing::debug!(include, "include already processed");
                continue;
            }
            tracing::debug!(include, path = %resolved.display(), "resolving include");
            let included = parse_file_inner(&resolved, search_paths, visited)?;
            program.absorb(included);
        }
    }

    Ok(program)
}

fn resolve_include(include: &str, base_dir: Option<&Path>, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let candidate = Path::new(include);
    if candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    base_dir
        .into_iter()
        .chain(search_paths.iter().map(PathBuf::as_path))
        .map(|dir| dir.join(include))
        .find(|path| path.is_file())
}

fn parse_imports(value: &Yaml) -> Result<Vec<ImportDecl>, DocumentError> {
    let Yaml::Sequence(entries) = value else {
        return Err(DocumentError::Malformed("'imports' must be a list".to_string()));
    };
    let mut imports = Vec::new();
    for entry in entries {
        match entry {
            Yaml::String(module) => imports.push(ImportDecl {
                module: module.clone(),
                alias: None,
            }),
            Yaml::Mapping(pairs) => {
                for (module, alias) in pairs {
                    match (module.as_str(), alias.as_str()) {
                        (Some(module), Some(alias)) => imports.push(ImportDecl {
                            module: module.to_string(),
                            alias: Some(alias.to_string()),
                        }),
                        _ => {
                            return Err(DocumentError::Malformed(
                                "import aliases must map a module name to an alias".to_string(),
                            ))
                        }
                    }
                }
            }
            other => {
                return Err(DocumentError::Malformed(format!(
                    "Invalid import entry: {other:?}"
                )))
            }
        }
    }
    Ok(imports)
}

fn parse_classes(value: &Yaml) -> Result<IndexMap<String, ClassDecl>, DocumentError> {
    let Yaml::Mapping(entries) = value else {
        return Err(DocumentError::Malformed("'classes' must be a mapping".to_string()));
    };
    let mut classes = IndexMap::new();
    for (name, body) in entries {
        let Some(name) = name.as_str() else {
            return Err(DocumentError::Malformed("class names must be strings".to_string()));
        };
        let mut class = ClassDecl {
            name: name.to_string(),
            parent: None,
            methods: IndexMap::new(),
        };
        match body {
            Yaml::Mapping(members) => {
                for (member, definition) in members {
                    let member = member.as_str().unwrap_or_default();
                    match (member, definition) {
                        ("parent", Yaml::String(parent)) => class.parent = Some(parent.clone()),
                        (method, Yaml::String(text)) => {
                            let qualified = format!("{name}.{method}");
                            class
                                .methods
                                .insert(method.to_string(), parse_named_function(&qualified, text)?);
                        }
                        (member, _) => {
                            return Err(DocumentError::Malformed(format!(
                                "Member '{member}' of class '{name}' must be a function literal"
                            )))
                        }
                    }
                }
            }
            Yaml::Null => {}
            _ => {
                return Err(DocumentError::Malformed(format!(
                    "Class '{name}' must be a mapping of methods"
                )))
            }
        }
        classes.insert(name.to_string(), class);
    }
    Ok(classes)
}

fn parse_objects(value: &Yaml) -> Result<IndexMap<String, ObjectDecl>, DocumentError> {
    let Yaml::Mapping(entries) = value else {
        return Err(DocumentError::Malformed("'objects' must be a mapping".to_string()));
    };
    let mut objects = IndexMap::new();
    for (name, definition) in entries {
        let (Some(name), Some(definition)) = (name.as_str(), definition.as_str()) else {
            return Err(DocumentError::Malformed(
                "objects must map a name to a ClassName(args) string".to_string(),
            ));
        };
        let (class_name, args) = match (definition.find('('), definition.rfind(')')) {
            (Some(open), Some(close)) if open < close => (
                definition[..open].trim(),
                split_arguments(&definition[open + 1..close]),
            ),
            _ => (definition.trim_end_matches("()").trim(), Vec::new()),
        };
        objects.insert(
            name.to_string(),
            ObjectDecl {
                class_name: class_name.to_string(),
                args,
            },
        );
    }
    Ok(objects)
}

/// Splits on top-level commas, keeping quoted text and brackets intact.
fn split_arguments(text: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in text.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '(' | '[' | '{') => {
                depth += 1;
                current.push(c);
            }
            (None, ')' | ']' | '}') => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            (None, ',') if depth == 0 => args.push(std::mem::take(&mut current)),
            (None, c) => current.push(c),
        }
    }
    args.push(current);

    let args: Vec<String> = args.into_iter().map(|a| a.trim().to_string()).collect();
    if args.len() == 1 && args[0].is_empty() {
        Vec::new()
    } else {
        args
    }
}

fn parse_call(value: &Yaml) -> Result<EntryPoint, DocumentError> {
    let Some(text) = value.as_str() else {
        return Err(DocumentError::Malformed(
            "'call' must be a function call such as main()".to_string(),
        ));
    };
    let syntax = |source: HplError| DocumentError::Function {
        name: "call".to_string(),
        source,
    };
    let tokens = tokenizer::tokens(text).map_err(|e| syntax(e.into()))?;
    let expression = parser::standalone_expression(&tokens).map_err(|e| syntax(e.into()))?;
    match expression {
        Expression::FunctionCall(function, args, _) => Ok(EntryPoint { function, args }),
        Expression::Variable(function, _) => Ok(EntryPoint {
            function,
            args: Vec::new(),
        }),
        other => Err(DocumentError::Malformed(format!(
            "'call' must name a function, found {other}"
        ))),
    }
}

fn parse_named_function(name: &str, text: &str) -> Result<FunctionDecl, DocumentError> {
    parse_function(text).map_err(|source| DocumentError::Function {
        name: name.to_string(),
        source,
    })
}

/// Parses an arrow literal `(a, b) => { body }`.
pub fn parse_function(text: &str) -> Result<FunctionDecl, HplError> {
    let text = text.trim();
    let (Some(open), Some(close)) = (text.find('('), text.find(')')) else {
        return Err(HplError::syntax(
            "Arrow function syntax error: parameter list not found",
        ));
    };
    if close < open {
        return Err(HplError::syntax(
            "Arrow function syntax error: malformed parameter list",
        ));
    }
    let params: Vec<String> = text[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();

    let Some(arrow) = text[close..].find("=>").map(|i| i + close) else {
        return Err(HplError::syntax("Arrow function syntax error: => not found"));
    };
    let (Some(body_start), Some(body_end)) = (
        text[arrow..].find('{').map(|i| i + arrow),
        text.rfind('}'),
    ) else {
        return Err(HplError::syntax(
            "Arrow function syntax error: braces not found",
        ));
    };
    if body_end < body_start {
        return Err(HplError::syntax(
            "Arrow function syntax error: braces not found",
        ));
    }

    let body = &text[body_start + 1..body_end];
    let tokens = tokenizer::tokens(body)?;
    let body = parser::function_body(&tokens)?;
    Ok(FunctionDecl { params, body })
}

fn top_level_key(line: &str) -> Option<&str> {
    if line.starts_with([' ', '\t']) || line.trim_start().starts_with('#') {
        return None;
    }
    let colon = line.find(':')?;
    Some(line[..colon].trim())
}

/// Folds repeated top-level `classes` and `objects` sections into their first occurrence.
pub fn merge_duplicate_keys(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut sections: IndexMap<&str, Vec<&str>> = IndexMap::new();
    let mut current: Option<&str> = None;

    for line in &lines {
        match top_level_key(line) {
            Some(key) if MERGED_KEYS.contains(&key) => {
                sections.entry(key).or_default();
                current = Some(key);
            }
            Some(_) => current = None,
            None => {
                if let Some(key) = current {
                    sections.entry(key).or_default().push(line);
                }
            }
        }
    }

    let mut out = Vec::with_capacity(lines.len());
    let mut emitted = FxHashSet::default();
    let mut skipping = false;
    for line in &lines {
        match top_level_key(line) {
            Some(key) if MERGED_KEYS.contains(&key) => {
                skipping = true;
                if emitted.insert(key) {
                    out.push(format!("{key}:"));
                    out.extend(sections[key].iter().map(|l| l.to_string()));
                }
            }
            Some(_) => {
                skipping = false;
                out.push(line.to_string());
            }
            None if skipping => {}
            None => out.push(line.to_string()),
        }
    }
    out.join("\n")
}

/// Net `{` minus `}` outside of string literals and comments.
fn brace_balance(line: &str) -> i64 {
    let mut balance = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut previous = ' ';
    for c in line.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            previous = c;
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => balance += 1,
            '}' => balance -= 1,
            '#' => break,
            '/' if previous == '/' => break,
            _ => {}
        }
        previous = c;
    }
    balance
}

/// Splits `key: (params) => ...` into its indentation, key and value.
fn arrow_definition(line: &str) -> Option<(usize, &str, &str)> {
    let indent = line.len() - line.trim_start().len();
    let rest = &line[indent..];
    let colon = rest.find(':')?;
    let key = &rest[..colon];
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }
    let value = rest[colon + 1..].trim_start();
    (value.starts_with('(') && value.contains("=>")).then_some((indent, key, value))
}

/// Rewrites arrow literals into `key: |` block scalars so YAML keeps their
/// bodies verbatim. Relative indentation inside a body is preserved.
pub fn rewrite_arrow_functions(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let Some((indent, key, value)) = arrow_definition(lines[i]) else {
            out.push(lines[i].to_string());
            i += 1;
            continue;
        };

        let mut balance = brace_balance(value);
        let mut body = Vec::new();
        i += 1;
        while balance > 0 && i < lines.len() {
            balance += brace_balance(lines[i]);
            body.push(lines[i]);
            i += 1;
        }

        let common = body
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.len() - l.trim_start().len())
            .min()
            .unwrap_or(0);
        let pad = " ".repeat(indent + 4);

        out.push(format!("{}{key}: |", " ".repeat(indent)));
        out.push(format!("{pad}{value}"));
        for line in body {
            if line.trim().is_empty() {
                out.push(String::new());
            } else {
                out.push(format!("{pad}{}", &line[common.min(line.len())..]));
            }
        }
    }

    out.join("\n")
}

impl DocumentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::Io { .. } => ErrorKind::Io,
            DocumentError::IncludeNotFound { .. } => ErrorKind::Import,
            DocumentError::Function { source, .. } => source.kind,
            DocumentError::Yaml { .. } | DocumentError::Malformed(_) => ErrorKind::Syntax,
        }
    }
}
