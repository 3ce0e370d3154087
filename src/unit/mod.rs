//! Compile units and the capabilities that configure them.
//!
//! - [`CompiledUnit`] - anything that renders to CSS on demand
//! - [`Stylesheet`] - the default unit, backed by `grass`
//! - [`Filter`] - plugin hook applied to a [`Stylesheet`] before rendering

mod literal;
mod stylesheet;

pub use literal::{is_css_literal, is_variable_name, to_sass};
pub use stylesheet::Stylesheet;

use crate::error::RenderError;

/// A configured compile unit, ready to render.
///
/// Produced by a [`CompileFn`](crate::CompileFn) from one source file.
/// Custom compile functions return their own implementations; the default
/// one returns a [`Stylesheet`].
pub trait CompiledUnit: Send {
    /// Render the unit to CSS text.
    fn render(&self) -> Result<String, RenderError>;
}

/// Plugin capability extending a unit before it renders.
///
/// Filters run in registration order, after the unit was created and before
/// defines and compiler options are applied.
///
/// # Example
///
/// ```ignore
/// struct Theme;
///
/// impl Filter for Theme {
///     fn apply(&self, sheet: &mut Stylesheet) {
///         sheet.include("vendor/theme").define_raw("accent", "#0af");
///     }
/// }
///
/// let options = RenderOptions::new("assets").use_filter(Theme);
/// ```
pub trait Filter: Send + Sync {
    /// Register this filter on the unit.
    fn apply(&self, sheet: &mut Stylesheet);
}

impl<F> Filter for F
where
    F: Fn(&mut Stylesheet) + Send + Sync,
{
    fn apply(&self, sheet: &mut Stylesheet) {
        self(sheet)
    }
}
