//! Default compile unit backed by grass.

use std::path::{Path, PathBuf};

use grass::{InputSyntax, Options, OutputStyle};
use rustc_hash::FxHashMap;
use serde_json::Value;

use super::literal::{is_variable_name, to_sass};
use super::{CompiledUnit, Filter};
use crate::error::RenderError;

/// Setting keys understood at render time.
const KNOWN_SETTINGS: &[&str] = &[
    "filename",
    "compress",
    "style",
    "paths",
    "include paths",
    "load_paths",
    "quiet",
    "charset",
    "unicode",
    "syntax",
];

/// One stylesheet source plus everything injected into it.
///
/// Defines and imports are rendered as a prelude ahead of the source text:
///
/// ```text
/// $brand: #0af;
/// @import "mixins";
/// <source>
/// ```
///
/// Variable declarations may precede `@use` rules, so sources using the
/// module system keep working with defines. Imports added by filters are
/// `@import` rules and therefore must not be combined with `@use` sources.
///
/// Unless the `syntax` setting says otherwise, the input syntax follows the
/// filename extension: `.sass` is indented syntax, `.css` plain CSS and
/// everything else SCSS. Compile errors in the source are reported against
/// the filename at their line in the source, not in the prelude.
#[derive(Debug, Clone)]
pub struct Stylesheet {
    source: String,
    filename: PathBuf,
    defines: Vec<(String, String)>,
    imports: Vec<String>,
    load_paths: Vec<PathBuf>,
    settings: FxHashMap<String, Value>,
}

impl Stylesheet {
    /// Create a unit from source text.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            filename: PathBuf::from("stdin"),
            defines: Vec::new(),
            imports: Vec::new(),
            load_paths: Vec::new(),
            settings: FxHashMap::default(),
        }
    }

    /// Filename used in error messages. Its directory is searched for imports.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Source text as given, without the prelude.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Set a compiler setting.
    ///
    /// A string `filename` retags the unit; every other key is recorded and
    /// interpreted when the unit renders.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        let key = key.into();
        if key == "filename"
            && let Value::String(name) = &value
        {
            self.filename = PathBuf::from(name);
            self.settings.remove("filename");
            return self;
        }
        self.settings.insert(key, value);
        self
    }

    /// Get a recorded compiler setting.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Define a variable from a JSON value.
    ///
    /// Redefining a name replaces the earlier value.
    pub fn define(&mut self, name: impl Into<String>, value: &Value) -> &mut Self {
        self.define_raw(name, to_sass(value))
    }

    /// Define a variable from a raw Sass expression, e.g. `"darken(#0af, 10%)"`.
    pub fn define_raw(&mut self, name: impl Into<String>, expr: impl Into<String>) -> &mut Self {
        let name = name.into();
        let name = name.strip_prefix('$').map(str::to_owned).unwrap_or(name);
        let expr = expr.into();
        match self.defines.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = expr,
            None => self.defines.push((name, expr)),
        }
        self
    }

    /// Value a variable was defined with, as Sass source.
    pub fn defined(&self, name: &str) -> Option<&str> {
        let name = name.strip_prefix('$').unwrap_or(name);
        self.defines
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, expr)| expr.as_str())
    }

    /// Import a stylesheet ahead of the source.
    pub fn import(&mut self, path: impl Into<String>) -> &mut Self {
        self.imports.push(path.into());
        self
    }

    /// Add a directory to the import search path.
    pub fn include(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.load_paths.push(dir.into());
        self
    }

    /// Apply a filter to this unit.
    pub fn use_filter(&mut self, filter: &dyn Filter) -> &mut Self {
        filter.apply(self);
        self
    }

    /// Source text with defines and imports prepended.
    pub fn full_source(&self) -> Result<String, RenderError> {
        let mut out = self.prelude(self.syntax()?)?;
        out.push_str(&self.source);
        Ok(out)
    }

    fn prelude(&self, syntax: InputSyntax) -> Result<String, RenderError> {
        let end = match syntax {
            InputSyntax::Sass => "",
            _ => ";",
        };

        let mut out = String::new();
        for (name, expr) in &self.defines {
            if !is_variable_name(name) {
                return Err(RenderError::options(format!(
                    "`{name}` is not a valid variable name"
                )));
            }
            out.push_str(&format!("${name}: {expr}{end}\n"));
        }
        for import in &self.imports {
            out.push_str(&format!("@import \"{}\"{end}\n", import.replace('"', "\\\"")));
        }
        Ok(out)
    }

    fn options(&self, syntax: InputSyntax) -> Result<Options<'static>, RenderError> {
        if let Some(value) = self.settings.get("filename") {
            return Err(expected("filename", "a string", value));
        }

        let mut options = Options::default();

        let compressed = self.bool_setting("compress")?.unwrap_or(false);
        let style = match self.settings.get("style") {
            None => None,
            Some(Value::String(s)) if s == "expanded" => Some(OutputStyle::Expanded),
            Some(Value::String(s)) if s == "compressed" => Some(OutputStyle::Compressed),
            Some(other) => return Err(expected("style", "\"expanded\" or \"compressed\"", other)),
        };
        options = options.style(style.unwrap_or(if compressed {
            OutputStyle::Compressed
        } else {
            OutputStyle::Expanded
        }));

        if let Some(quiet) = self.bool_setting("quiet")? {
            options = options.quiet(quiet);
        }
        if let Some(charset) = self.bool_setting("charset")? {
            options = options.allows_charset(charset);
        }
        if let Some(unicode) = self.bool_setting("unicode")? {
            options = options.unicode_error_messages(unicode);
        }
        options = options.input_syntax(syntax);

        let load_paths = self.all_load_paths()?;
        options = options.load_paths(load_paths.as_slice());

        for key in self.settings.keys() {
            if !KNOWN_SETTINGS.contains(&key.as_str()) {
                tracing::trace!(key = %key, file = %self.filename.display(), "ignoring compiler option");
            }
        }

        Ok(options)
    }

    fn all_load_paths(&self) -> Result<Vec<PathBuf>, RenderError> {
        let mut paths = Vec::new();
        if let Some(parent) = self.filename.parent()
            && !parent.as_os_str().is_empty()
        {
            paths.push(parent.to_path_buf());
        }
        paths.extend(self.load_paths.iter().cloned());
        for key in ["paths", "include paths", "load_paths"] {
            match self.settings.get(key) {
                None => {}
                Some(Value::String(s)) => paths.push(PathBuf::from(s)),
                Some(Value::Array(items)) => {
                    for item in items {
                        let Value::String(s) = item else {
                            return Err(expected(key, "a list of strings", item));
                        };
                        paths.push(PathBuf::from(s));
                    }
                }
                Some(other) => return Err(expected(key, "a string or list of strings", other)),
            }
        }
        Ok(paths)
    }

    fn bool_setting(&self, key: &str) -> Result<Option<bool>, RenderError> {
        match self.settings.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(expected(key, "a boolean", other)),
        }
    }

    fn syntax(&self) -> Result<InputSyntax, RenderError> {
        match self.settings.get("syntax") {
            None => Ok(syntax_for(&self.filename)),
            Some(Value::String(s)) => match s.as_str() {
                "scss" => Ok(InputSyntax::Scss),
                "sass" => Ok(InputSyntax::Sass),
                "css" => Ok(InputSyntax::Css),
                _ => Err(expected("syntax", "\"scss\", \"sass\" or \"css\"", &Value::String(s.clone()))),
            },
            Some(other) => Err(expected("syntax", "\"scss\", \"sass\" or \"css\"", other)),
        }
    }
}

fn expected(key: &str, what: &str, got: &Value) -> RenderError {
    RenderError::options(format!("option `{key}` expects {what}, got {got}"))
}

fn syntax_for(path: &Path) -> InputSyntax {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("sass") => InputSyntax::Sass,
        Some(ext) if ext.eq_ignore_ascii_case("css") => InputSyntax::Css,
        _ => InputSyntax::Scss,
    }
}

/// Point a grass error at `filename`.
///
/// grass names the root stylesheet `./stdin` and counts the `shift` prelude
/// lines. Errors located in imported files pass through unchanged.
fn relocate(message: &str, filename: &Path, shift: usize) -> String {
    let Some((line, column)) = message.lines().rev().find_map(stdin_location) else {
        return message.to_owned();
    };
    let name = filename.display();
    if line <= shift {
        return message.replace(
            &format!("./stdin:{line}:{column}"),
            &format!("{name} (prelude):{line}:{column}"),
        );
    }

    let actual = line - shift;
    let old_pad = " ".repeat(line.to_string().len() + 1);
    let new_pad = " ".repeat(actual.to_string().len() + 1);
    let gutter = format!("{line} ");

    let mut out = String::with_capacity(message.len());
    for text in message.split_inclusive('\n') {
        if stdin_location(text).is_some() {
            let indent = &text[..text.len() - text.trim_start().len()];
            out.push_str(&format!("{indent}{name}:{actual}:{column}"));
            if text.ends_with('\n') {
                out.push('\n');
            }
        } else if let Some(rest) = text.strip_prefix(&gutter) {
            out.push_str(&format!("{actual} {rest}"));
        } else if let Some(rest) = text.strip_prefix(&old_pad).filter(|r| !r.starts_with(' ')) {
            out.push_str(&new_pad);
            out.push_str(rest);
        } else {
            out.push_str(text);
        }
    }
    out
}

/// `(line, column)` of a `./stdin:L:C` location line.
fn stdin_location(text: &str) -> Option<(usize, usize)> {
    let rest = text.trim().strip_prefix("./stdin:")?;
    let (line, column) = rest.split_once(':')?;
    Some((line.parse().ok()?, column.parse().ok()?))
}

impl CompiledUnit for Stylesheet {
    fn render(&self) -> Result<String, RenderError> {
        let syntax = self.syntax()?;
        let options = self.options(syntax)?;
        let prelude = self.prelude(syntax)?;
        let shift = prelude.matches('\n').count();

        grass::from_string(prelude + &self.source, &options).map_err(|e| {
            RenderError::compile(&self.filename, relocate(&e.to_string(), &self.filename, shift))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_plain() {
        let sheet = Stylesheet::new("a { color: red; }");
        let css = sheet.render().unwrap();
        assert!(css.contains("color: red"));
    }

    #[test]
    fn test_define_injects_variable() {
        let mut sheet = Stylesheet::new(".box { width: $width * 2; }");
        sheet.define("width", &json!("10px"));
        let css = sheet.render().unwrap();
        assert!(css.contains("width: 20px"), "{css}");
    }

    #[test]
    fn test_redefine_replaces() {
        let mut sheet = Stylesheet::new("a { b: $x; }");
        sheet.define("x", &json!(1)).define("$x", &json!(2));
        assert_eq!(sheet.defined("x"), Some("2"));
        assert_eq!(sheet.full_source().unwrap(), "$x: 2;\na { b: $x; }");
    }

    #[test]
    fn test_compress_setting() {
        let mut sheet = Stylesheet::new("a {\n  color: red;\n}\n");
        sheet.set("compress", json!(true));
        let css = sheet.render().unwrap();
        assert_eq!(css.trim(), "a{color:red}");
    }

    #[test]
    fn test_bad_setting_type() {
        let mut sheet = Stylesheet::new("a { color: red; }");
        sheet.set("compress", json!("yes"));
        let err = sheet.render().unwrap_err();
        assert!(matches!(err, RenderError::Options { .. }));
    }

    #[test]
    fn test_unknown_setting_ignored() {
        let mut sheet = Stylesheet::new("a { color: red; }");
        sheet.set("linenos", json!(true));
        assert!(sheet.render().is_ok());
        assert_eq!(sheet.setting("linenos"), Some(&json!(true)));
    }

    #[test]
    fn test_filename_setting_retags() {
        let mut sheet = Stylesheet::new("a { color: ; }");
        sheet.set("filename", json!("theme/broken.scss"));
        assert_eq!(sheet.filename(), Path::new("theme/broken.scss"));
        match sheet.render().unwrap_err() {
            RenderError::Compile { path, .. } => assert_eq!(path, Path::new("theme/broken.scss")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_variable_name() {
        let mut sheet = Stylesheet::new("a { color: red; }");
        sheet.define("not valid", &json!(1));
        assert!(matches!(sheet.render(), Err(RenderError::Options { .. })));
    }

    #[test]
    fn test_filter_closure() {
        let filter = |sheet: &mut Stylesheet| {
            sheet.define_raw("accent", "#00aaff");
        };
        let mut sheet = Stylesheet::new("a { color: $accent; }");
        sheet.use_filter(&filter);
        let css = sheet.render().unwrap();
        assert!(css.contains("#00aaff") || css.contains("#0af"), "{css}");
    }

    #[test]
    fn test_double_dollar_name_rejected() {
        let mut sheet = Stylesheet::new("a { color: red; }");
        sheet.define("$$x", &json!(1));
        assert!(matches!(sheet.render(), Err(RenderError::Options { .. })));
    }

    #[test]
    fn test_trailing_dot_define_quoted() {
        let mut sheet = Stylesheet::new("a { content: $v; }");
        sheet.define("v", &json!("1."));
        let css = sheet.render().unwrap();
        assert!(css.contains("content: \"1.\""), "{css}");
    }

    #[test]
    fn test_error_location_skips_prelude() {
        let mut sheet = Stylesheet::new("a {\n  b: c;\n}\nd { e: ; }\n");
        sheet.set("filename", json!("theme/site.scss"));
        sheet
            .define("x", &json!(1))
            .define("y", &json!(2))
            .define("z", &json!(3));

        let RenderError::Compile { message, .. } = sheet.render().unwrap_err() else {
            panic!("expected a compile error");
        };
        assert!(message.contains("theme/site.scss:4:7"), "{message}");
        assert!(message.contains("4 │ d { e: ; }"), "{message}");
        assert!(!message.contains("stdin"), "{message}");
    }

    #[test]
    fn test_relocate_realigns_gutter() {
        let message = "Error: expected \";\".\n   ╷\n10 │ x\n   │ ^\n   ╵\n  ./stdin:10:1\n";
        let fixed = relocate(message, Path::new("site.scss"), 3);
        assert_eq!(
            fixed,
            "Error: expected \";\".\n  ╷\n7 │ x\n  │ ^\n  ╵\n  site.scss:7:1\n"
        );
    }

    #[test]
    fn test_relocate_leaves_imported_files() {
        let message = "Error: oops\n  ╷\n2 │ x\n  ╵\n  ./_partial.scss:2:1\n";
        assert_eq!(relocate(message, Path::new("site.scss"), 5), message);
    }

    #[test]
    fn test_syntax_from_extension() {
        let mut sheet = Stylesheet::new("a\n  width: $w\n");
        sheet.set("filename", json!("dir/x.sass"));
        sheet.define("w", &json!("3px"));
        assert_eq!(sheet.full_source().unwrap(), "$w: 3px\na\n  width: $w\n");
        let css = sheet.render().unwrap();
        assert!(css.contains("width: 3px"), "{css}");
    }

    #[test]
    fn test_syntax_setting_overrides_extension() {
        let mut sheet = Stylesheet::new("a { color: red; }");
        sheet.set("filename", json!("dir/x.sass"));
        sheet.set("syntax", json!("scss"));
        assert!(sheet.render().unwrap().contains("color: red"));
    }

    #[test]
    fn test_import_from_include_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("_mixins.scss"), "$pad: 4px;").unwrap();

        let mut sheet = Stylesheet::new("a { padding: $pad; }");
        sheet.include(dir.path()).import("mixins");
        let css = sheet.render().unwrap();
        assert!(css.contains("padding: 4px"), "{css}");
    }
}
