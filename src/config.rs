use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Where modules are searched for and how deep calls may nest.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub package_dir: PathBuf,
    pub extra_paths: Vec<PathBuf>,
    pub working_dir: PathBuf,
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            package_dir: home.join(".hpl").join("packages"),
            extra_paths: Vec::new(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Config {
    pub fn with_module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extra_paths.push(path.into());
        self
    }

    pub fn with_package_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.package_dir = path.into();
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Module search order: the loading file's directory, the working
    /// directory, the package directory, then extra paths.
    pub fn search_paths(&self, origin: Option<&Path>) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = Vec::with_capacity(self.extra_paths.len() + 3);
        let candidates = origin
            .into_iter()
            .map(Path::to_path_buf)
            .chain([self.working_dir.clone(), self.package_dir.clone()])
            .chain(self.extra_paths.iter().cloned());
        for candidate in candidates {
            if !paths.contains(&candidate) {
                paths.push(candidate);
            }
        }
        paths
    }
}
