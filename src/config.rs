//! Render options.
//!
//! [`RenderOptions`] is built once per batch with a fluent API and never
//! mutated by the render. The source root is always explicit: use
//! [`RenderOptions::from_current_dir`] to start from the working directory.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use style_batch::RenderOptions;
//!
//! let options = RenderOptions::new("assets/styles")
//!     .dest("public/css")
//!     .define("brand", json!("#0af"))
//!     .compiler_option("compress", json!(true));
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::compile::CompileFn;
use crate::error::RenderError;
use crate::unit::{CompiledUnit, Filter};

/// One define mapping: variable name to value, in insertion order.
pub type Defines = Map<String, Value>;

/// What a task does when its source file cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadErrorPolicy {
    /// Report the failure through the terminal callback.
    #[default]
    Report,
    /// Panic in the task, tearing down the whole batch.
    ///
    /// The terminal callback never fires;
    /// [`RenderHandle::wait`](crate::RenderHandle::wait) returns `Err`.
    Panic,
}

/// Options for one batch render.
#[derive(Clone)]
pub struct RenderOptions {
    pub(crate) src: PathBuf,
    pub(crate) dest: Option<PathBuf>,
    pub(crate) filters: Vec<Arc<dyn Filter>>,
    pub(crate) defines: Vec<Defines>,
    pub(crate) compiler_options: Map<String, Value>,
    pub(crate) compile: Option<CompileFn>,
    pub(crate) read_errors: ReadErrorPolicy,
    pub(crate) create_dirs: bool,
    pub(crate) jobs: Option<usize>,
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("src", &self.src)
            .field("dest", &self.dest)
            .field("filters", &self.filters.len())
            .field("defines", &self.defines)
            .field("compiler_options", &self.compiler_options)
            .field("compile", &self.compile.as_ref().map(|_| "<fn>"))
            .field("read_errors", &self.read_errors)
            .field("create_dirs", &self.create_dirs)
            .field("jobs", &self.jobs)
            .finish()
    }
}

impl RenderOptions {
    /// Create options rooted at `src`. The destination defaults to `src`.
    pub fn new(src: impl Into<PathBuf>) -> Self {
        Self {
            src: src.into(),
            dest: None,
            filters: Vec::new(),
            defines: Vec::new(),
            compiler_options: Map::new(),
            compile: None,
            read_errors: ReadErrorPolicy::default(),
            create_dirs: false,
            jobs: None,
        }
    }

    /// Create options rooted at the process working directory.
    pub fn from_current_dir() -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Build options from a JSON options hash.
    ///
    /// Recognized keys: `src`, `dest`, `define` (object or array of objects),
    /// `stylusOptions` / `compilerOptions` (object), `jobs`, `createDirs`.
    /// Relative `src`/`dest` are resolved against `base_dir`; a missing `src`
    /// means `base_dir` itself. `use` and `compile` hold code and are rejected.
    pub fn from_json(value: &Value, base_dir: &Path) -> Result<Self, RenderError> {
        let Value::Object(hash) = value else {
            return Err(RenderError::options(format!("expected an object, got {value}")));
        };

        for key in ["use", "compile"] {
            if hash.contains_key(key) {
                return Err(RenderError::options(format!(
                    "`{key}` cannot be set from JSON"
                )));
            }
        }

        let src = match hash.get("src") {
            None | Some(Value::Null) => base_dir.to_path_buf(),
            Some(value) => base_dir.join(path_value("src", value)?),
        };
        let mut options = Self::new(src);

        if let Some(value) = hash.get("dest").filter(|v| !v.is_null()) {
            options = options.dest(base_dir.join(path_value("dest", value)?));
        }

        match hash.get("define") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => options = options.with_defines(map.clone()),
            Some(Value::Array(items)) => {
                for item in items {
                    let Value::Object(map) = item else {
                        return Err(RenderError::options(format!(
                            "`define` entries must be objects, got {item}"
                        )));
                    };
                    options = options.with_defines(map.clone());
                }
            }
            Some(other) => {
                return Err(RenderError::options(format!(
                    "`define` must be an object or array of objects, got {other}"
                )));
            }
        }

        for key in ["stylusOptions", "compilerOptions"] {
            match hash.get(key) {
                None | Some(Value::Null) => {}
                Some(Value::Object(map)) => {
                    for (k, v) in map {
                        options = options.compiler_option(k.clone(), v.clone());
                    }
                }
                Some(other) => {
                    return Err(RenderError::options(format!(
                        "`{key}` must be an object, got {other}"
                    )));
                }
            }
        }

        match hash.get("jobs") {
            None | Some(Value::Null) => {}
            Some(value) => match value.as_u64().filter(|n| *n > 0) {
                Some(n) => options = options.jobs(n as usize),
                None => {
                    return Err(RenderError::options(format!(
                        "`jobs` must be a positive integer, got {value}"
                    )));
                }
            },
        }

        match hash.get("createDirs") {
            None | Some(Value::Null) => {}
            Some(Value::Bool(b)) => options = options.create_dirs(*b),
            Some(other) => {
                return Err(RenderError::options(format!(
                    "`createDirs` must be a boolean, got {other}"
                )));
            }
        }

        Ok(options)
    }

    /// Set the destination root.
    pub fn dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    /// Register a filter. Filters apply in registration order.
    pub fn use_filter<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Register several shared filters.
    pub fn with_filters<I>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Filter>>,
    {
        self.filters.extend(filters);
        self
    }

    /// Add a define mapping. Later mappings override earlier ones.
    pub fn with_defines(mut self, defines: Defines) -> Self {
        self.defines.push(defines);
        self
    }

    /// Add a single define as its own mapping.
    pub fn define(self, name: impl Into<String>, value: Value) -> Self {
        let mut map = Defines::new();
        map.insert(name.into(), value);
        self.with_defines(map)
    }

    /// Set a compiler option, applied to every unit via `Stylesheet::set`.
    pub fn compiler_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.compiler_options.insert(key.into(), value);
        self
    }

    /// Replace the default compile function.
    ///
    /// The function is used verbatim: filters, defines and compiler options
    /// set on these options are not applied to its units.
    pub fn with_compile<F>(mut self, compile: F) -> Self
    where
        F: Fn(String, &Path) -> Box<dyn CompiledUnit> + Send + Sync + 'static,
    {
        self.compile = Some(Arc::new(compile));
        self
    }

    /// Choose how unreadable sources are handled.
    pub fn read_errors(mut self, policy: ReadErrorPolicy) -> Self {
        self.read_errors = policy;
        self
    }

    /// Create missing destination directories before writing.
    pub fn create_dirs(mut self, create: bool) -> Self {
        self.create_dirs = create;
        self
    }

    /// Run at most `jobs` tasks at once.
    ///
    /// Without the `pool` feature every task runs on its own thread and this
    /// setting is ignored.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs.max(1));
        self
    }

    /// Source root.
    pub fn src_root(&self) -> &Path {
        &self.src
    }

    /// Destination root, falling back to the source root.
    pub fn dest_root(&self) -> &Path {
        self.dest.as_deref().unwrap_or(&self.src)
    }
}

fn path_value(key: &str, value: &Value) -> Result<PathBuf, RenderError> {
    match value {
        Value::String(s) => Ok(PathBuf::from(s)),
        other => Err(RenderError::options(format!(
            "`{key}` must be a string, got {other}"
        ))),
    }
}
