//! # style-batch
//!
//! Batch stylesheet compilation: render a list of stylesheets to CSS with one
//! set of options and get a single completion signal for the whole batch.
//!
//! Each input file is read, handed to a compile function, rendered and
//! written next to its mirror path under the destination root with a `.css`
//! extension. The default compile function uses [grass](https://docs.rs/grass),
//! a pure Rust Sass compiler; any other compiler can be plugged in through
//! [`RenderOptions::with_compile`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use serde_json::json;
//! use style_batch::{render, RenderOptions};
//!
//! let options = RenderOptions::new("assets/styles")
//!     .dest("public/css")
//!     .define("brand", json!("#0af"))
//!     .compiler_option("compress", json!(true));
//!
//! let mut handle = render(["site.scss", "print.scss"], options, |result| {
//!     match result {
//!         Ok(()) => println!("all stylesheets written"),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! });
//!
//! for note in handle.notifications() {
//!     println!("{note}");
//! }
//! handle.wait().ok();
//! ```
//!
//! ## Modules
//!
//! - [`batch`]: [`BatchCompiler`], [`render`] and the completion signal
//! - [`compile`]: compile functions and the per-file pipeline
//! - [`config`]: [`RenderOptions`]
//! - [`unit`]: [`Stylesheet`], [`CompiledUnit`] and [`Filter`]
//! - [`notify`]: progress notifications
//! - [`task`]: input normalization and path resolution
//!
//! ## Features
//!
//! - `pool` (default): run tasks on a rayon pool; `jobs` bounds it
//! - `colored` (default): colorize the level in [`Notification`]'s `Display`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod batch;
pub mod compile;
pub mod config;
pub mod error;
pub mod notify;
pub mod task;
pub mod unit;

// =============================================================================
// Prelude - import commonly used items with a single `use`
// =============================================================================

/// Prelude module for convenient imports.
///
/// ```ignore
/// use style_batch::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        render, BatchCompiler, CompiledUnit, Filter, Level, Notification, ReadErrorPolicy,
        RenderError, RenderHandle, RenderOptions, Stylesheet,
    };
}

pub use batch::{render, BatchCompiler, RenderHandle};
pub use compile::{compile_file, default_compile, CompileFn};
pub use config::{Defines, ReadErrorPolicy, RenderOptions};
pub use error::RenderError;
pub use notify::{Level, Notification, Notifications};
pub use task::{css_path, StylesheetTask, Stylesheets};
pub use unit::{CompiledUnit, Filter, Stylesheet};

/// grass, the default stylesheet compiler.
pub use grass;
