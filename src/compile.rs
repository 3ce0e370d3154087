//! Compile functions and the per-file pipeline.
//!
//! - [`CompileFn`]: `(source_text, source_path) -> unit`
//! - [`default_compile`]: builds a [`CompileFn`] producing configured [`Stylesheet`]s
//! - [`compile_file`]: read → compile → render → write for one task

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::{Defines, ReadErrorPolicy};
use crate::error::RenderError;
use crate::task::StylesheetTask;
use crate::unit::{CompiledUnit, Filter, Stylesheet};

/// Function turning source text into a compile unit.
///
/// Receives the source text and the path it was read from.
pub type CompileFn = Arc<dyn Fn(String, &Path) -> Box<dyn CompiledUnit> + Send + Sync>;

/// Create the default compile function.
///
/// Each unit is tagged with its source path, then configured in this order:
///
/// 1. filters, in registration order
/// 2. define mappings, in order, each in its own key order (later wins)
/// 3. compiler options, in key order
pub fn default_compile(
    compiler_options: Map<String, Value>,
    filters: Vec<Arc<dyn Filter>>,
    defines: Vec<Defines>,
) -> CompileFn {
    Arc::new(move |source: String, path: &Path| -> Box<dyn CompiledUnit> {
        let mut sheet = Stylesheet::new(source);
        sheet.set("filename", Value::String(path.to_string_lossy().into_owned()));

        for filter in &filters {
            sheet.use_filter(&**filter);
        }

        for mapping in &defines {
            for (name, value) in mapping {
                sheet.define(name.as_str(), value);
            }
        }

        for (key, value) in &compiler_options {
            sheet.set(key.as_str(), value.clone());
        }

        Box::new(sheet)
    })
}

/// Run one compile-and-write cycle.
///
/// Returns the path the CSS was written to.
///
/// # Panics
///
/// Panics when the source cannot be read and `policy` is
/// [`ReadErrorPolicy::Panic`].
pub fn compile_file(
    task: &StylesheetTask,
    compile: &CompileFn,
    policy: ReadErrorPolicy,
    create_dirs: bool,
) -> Result<PathBuf, RenderError> {
    let source = match fs::read_to_string(task.source()) {
        Ok(text) => text,
        Err(source) => match policy {
            ReadErrorPolicy::Report => {
                return Err(RenderError::Read {
                    path: task.source().to_path_buf(),
                    source,
                });
            }
            ReadErrorPolicy::Panic => {
                panic!("failed to read {}: {source}", task.source().display())
            }
        },
    };

    let unit = compile(source, task.source());
    let css = unit.render()?;

    let dest = task.dest();
    if create_dirs
        && let Some(parent) = dest.parent()
    {
        fs::create_dir_all(parent).map_err(|source| RenderError::Write {
            path: dest.to_path_buf(),
            source,
        })?;
    }

    fs::write(dest, css).map_err(|source| RenderError::Write {
        path: dest.to_path_buf(),
        source,
    })?;

    Ok(dest.to_path_buf())
}
