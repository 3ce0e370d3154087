//! Batch rendering.
//!
//! [`BatchCompiler::render`] returns a [`RenderHandle`] right away and does
//! the work on a dispatcher thread:
//!
//! 1. `Found N stylesheet(s)` is queued before the handle is returned
//! 2. every entry is resolved to a [`StylesheetTask`] and fanned out at once
//! 3. each task reads, compiles, renders and writes one file
//! 4. outcomes meet in a shared completion counter that fires the terminal
//!    callback exactly once
//!
//! # Example
//!
//! ```ignore
//! let options = RenderOptions::from_current_dir()?.dest("public/css");
//! let mut handle = render(["site.scss", "print.scss"], options, |result| {
//!     if let Err(e) = result {
//!         eprintln!("{e}");
//!     }
//! });
//!
//! for note in handle.notifications() {
//!     println!("{note}");
//! }
//! handle.wait().ok();
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::compile::{compile_file, default_compile, CompileFn};
use crate::config::{ReadErrorPolicy, RenderOptions};
use crate::error::RenderError;
use crate::notify::{Level, Notifications, Notifier};
use crate::task::{StylesheetTask, Stylesheets};

/// Terminal callback of a batch.
type Callback = Box<dyn FnOnce(Result<(), RenderError>) + Send>;

// =============================================================================
// Completion - shared counter and error latch
// =============================================================================

/// Counts finished tasks and fires the terminal callback once.
///
/// The first failure fires the callback and latches `errored`; success fires
/// when the last task finishes without a prior failure. Tasks still running
/// after a failure are not cancelled.
struct Completion {
    state: Mutex<CompletionState>,
}

struct CompletionState {
    remaining: usize,
    errored: bool,
    callback: Option<Callback>,
}

impl Completion {
    fn new(count: usize, callback: Callback) -> Self {
        Self {
            state: Mutex::new(CompletionState {
                remaining: count,
                errored: false,
                callback: Some(callback),
            }),
        }
    }

    /// Record one task outcome.
    ///
    /// Returns `true` if the outcome reached the callback.
    fn complete(&self, result: Result<(), RenderError>) -> bool {
        let mut state = self.state.lock();
        state.remaining = state.remaining.saturating_sub(1);
        let fire = match &result {
            Err(_) if !state.errored => {
                state.errored = true;
                true
            }
            Err(_) => false,
            Ok(()) => state.remaining == 0 && !state.errored,
        };
        let callback = if fire { state.callback.take() } else { None };
        drop(state);

        match callback {
            Some(callback) => {
                callback(result);
                true
            }
            None => false,
        }
    }

    /// Settle a batch that had nothing to do.
    fn complete_empty(&self) {
        let callback = self.state.lock().callback.take();
        if let Some(callback) = callback {
            callback(Ok(()));
        }
    }
}

// =============================================================================
// RenderHandle
// =============================================================================

/// Handle to a running batch.
///
/// Dropping the handle detaches the batch; it keeps running and the
/// terminal callback still fires.
#[derive(Debug)]
pub struct RenderHandle {
    notifications: Notifications,
    dispatcher: Option<JoinHandle<()>>,
}

impl RenderHandle {
    /// Progress notifications of this batch.
    ///
    /// Iterating blocks and ends once every task has finished.
    pub fn notifications(&mut self) -> &mut Notifications {
        &mut self.notifications
    }

    /// Check if the dispatcher and all its tasks have finished.
    pub fn is_finished(&self) -> bool {
        self.dispatcher.as_ref().is_none_or(|d| d.is_finished())
    }

    /// Wait for every task to finish.
    ///
    /// Returns `Err` with the panic payload if a task panicked, e.g. under
    /// [`ReadErrorPolicy::Panic`].
    pub fn wait(mut self) -> thread::Result<()> {
        match self.dispatcher.take() {
            Some(dispatcher) => dispatcher.join(),
            None => Ok(()),
        }
    }
}

// =============================================================================
// BatchCompiler
// =============================================================================

/// Renders lists of stylesheets with one set of options.
///
/// # Example
///
/// ```ignore
/// let compiler = BatchCompiler::new(RenderOptions::new("assets"));
/// let handle = compiler.render("main.scss", |result| println!("{result:?}"));
/// handle.wait().ok();
/// ```
#[derive(Debug, Clone)]
pub struct BatchCompiler {
    options: RenderOptions,
}

impl BatchCompiler {
    /// Create a compiler with the given options.
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Options this compiler renders with.
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render a batch of stylesheets.
    ///
    /// Returns before any file is touched. `callback` fires exactly once:
    /// with the first task error, or with `Ok(())` after every task
    /// succeeded (immediately for an empty list). It runs on a worker thread.
    pub fn render<S, F>(&self, stylesheets: S, callback: F) -> RenderHandle
    where
        S: Into<Stylesheets>,
        F: FnOnce(Result<(), RenderError>) + Send + 'static,
    {
        let entries = stylesheets.into().into_inner();
        let (notifier, notifications) = Notifier::channel();
        notifier.debug(format!("Found {} stylesheet(s)", entries.len()));

        let options = &self.options;
        let compile = match &options.compile {
            Some(compile) => compile.clone(),
            None => default_compile(
                options.compiler_options.clone(),
                options.filters.clone(),
                options.defines.clone(),
            ),
        };

        let batch = Arc::new(Batch {
            src: options.src_root().to_path_buf(),
            dest: options.dest_root().to_path_buf(),
            completion: Completion::new(entries.len(), Box::new(callback)),
            entries,
            compile,
            read_errors: options.read_errors,
            create_dirs: options.create_dirs,
            jobs: options.jobs,
            notifier,
        });

        let worker = Arc::clone(&batch);
        let dispatcher = thread::Builder::new()
            .name("style-batch".into())
            .spawn(move || dispatch(&worker));

        let dispatcher = match dispatcher {
            Ok(handle) => Some(handle),
            Err(e) => {
                batch
                    .notifier
                    .warn(format!("Could not start dispatcher ({e}), rendering inline"));
                dispatch(&batch);
                None
            }
        };

        RenderHandle {
            notifications,
            dispatcher,
        }
    }
}

/// Render `stylesheets` with `options`, reporting through `callback`.
///
/// Shorthand for `BatchCompiler::new(options).render(stylesheets, callback)`.
pub fn render<S, F>(stylesheets: S, options: RenderOptions, callback: F) -> RenderHandle
where
    S: Into<Stylesheets>,
    F: FnOnce(Result<(), RenderError>) + Send + 'static,
{
    BatchCompiler::new(options).render(stylesheets, callback)
}

// =============================================================================
// Dispatch
// =============================================================================

/// Everything the tasks of one batch share.
struct Batch {
    src: PathBuf,
    dest: PathBuf,
    entries: Vec<PathBuf>,
    compile: CompileFn,
    read_errors: ReadErrorPolicy,
    create_dirs: bool,
    #[cfg_attr(not(feature = "pool"), allow(dead_code))]
    jobs: Option<usize>,
    notifier: Notifier,
    completion: Completion,
}

fn dispatch(batch: &Batch) {
    let span = tracing::debug_span!("render", count = batch.entries.len());
    let _guard = span.enter();

    if batch.entries.is_empty() {
        batch.completion.complete_empty();
        return;
    }
    fan_out(batch);
}

#[cfg(feature = "pool")]
fn fan_out(batch: &Batch) {
    match batch.jobs {
        Some(jobs) => match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.scope(|scope| spawn_all(scope, batch)),
            Err(e) => {
                batch
                    .notifier
                    .warn(format!("Could not build a pool of {jobs} threads ({e}), using the global pool"));
                rayon::scope(|scope| spawn_all(scope, batch));
            }
        },
        None => rayon::scope(|scope| spawn_all(scope, batch)),
    }
}

#[cfg(feature = "pool")]
fn spawn_all<'scope>(scope: &rayon::Scope<'scope>, batch: &'scope Batch) {
    for entry in &batch.entries {
        batch
            .notifier
            .file(Level::Debug, entry, format!("Compiling {}", entry.display()));
        scope.spawn(move |_| run_task(batch, entry));
    }
}

#[cfg(not(feature = "pool"))]
fn fan_out(batch: &Batch) {
    thread::scope(|scope| {
        for entry in &batch.entries {
            batch
                .notifier
                .file(Level::Debug, entry, format!("Compiling {}", entry.display()));
            scope.spawn(move || run_task(batch, entry));
        }
    });
}

fn run_task(batch: &Batch, entry: &Path) {
    let task = StylesheetTask::resolve(&batch.src, &batch.dest, entry);
    let result = compile_file(&task, &batch.compile, batch.read_errors, batch.create_dirs);

    let failure = match &result {
        Ok(written) => {
            batch
                .notifier
                .file(Level::Info, written, format!("Wrote {}", written.display()));
            None
        }
        Err(e) => Some(format!("Failed to compile {}: {e}", entry.display())),
    };

    let reported = batch.completion.complete(result.map(|_| ()));
    if let Some(message) = failure {
        let level = if reported { Level::Error } else { Level::Warn };
        batch.notifier.file(level, entry, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::CompiledUnit;
    use std::fs;
    use tempfile::TempDir;

    /// Collects every callback invocation as `None` (ok) or the error text.
    fn recorder() -> (
        Arc<Mutex<Vec<Option<String>>>>,
        impl FnOnce(Result<(), RenderError>) + Send + 'static,
    ) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let callback = move |result: Result<(), RenderError>| {
            sink.lock().push(result.err().map(|e| e.to_string()));
        };
        (calls, callback)
    }

    struct Fixed(&'static str);

    impl CompiledUnit for Fixed {
        fn render(&self) -> Result<String, RenderError> {
            Ok(self.0.to_owned())
        }
    }

    #[test]
    fn test_single_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("main.scss"), "a { color: red; }").unwrap();

        let (calls, callback) = recorder();
        let handle = render("main.scss", RenderOptions::new(dir.path()), callback);
        handle.wait().unwrap();

        assert_eq!(*calls.lock(), vec![None]);
        let css = fs::read_to_string(dir.path().join("main.css")).unwrap();
        assert!(css.contains("color: red"), "{css}");
    }

    #[test]
    fn test_all_outputs_exist_before_success() {
        let src = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let names = ["a.scss", "b.scss", "c.scss", "d.scss"];
        for name in names {
            fs::write(src.path().join(name), format!(".{} {{ x: y; }}", &name[..1])).unwrap();
        }

        let expected: Vec<PathBuf> = ["a.css", "b.css", "c.css", "d.css"]
            .iter()
            .map(|n| out.path().join(n))
            .collect();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = move |result: Result<(), RenderError>| {
            let all_exist = expected.iter().all(|p| p.exists());
            sink.lock().push((result.is_ok(), all_exist));
        };

        let options = RenderOptions::new(src.path()).dest(out.path());
        render(names, options, callback).wait().unwrap();

        assert_eq!(*seen.lock(), vec![(true, true)]);
    }

    #[test]
    fn test_first_failure_reported_once() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("ok1.scss"), "a { b: c; }").unwrap();
        fs::write(dir.path().join("bad.scss"), "a { b: ; }").unwrap();
        fs::write(dir.path().join("ok2.scss"), "d { e: f; }").unwrap();

        let (calls, callback) = recorder();
        let handle = render(
            vec!["ok1.scss", "bad.scss", "ok2.scss"],
            RenderOptions::new(dir.path()),
            callback,
        );
        handle.wait().unwrap();

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        let message = calls[0].as_deref().unwrap();
        assert!(message.contains("bad.scss"), "{message}");

        assert!(dir.path().join("ok1.css").exists());
        assert!(dir.path().join("ok2.css").exists());
        assert!(!dir.path().join("bad.css").exists());
    }

    #[test]
    fn test_two_failures_single_callback() {
        let dir = TempDir::new().unwrap();
        let (calls, callback) = recorder();
        let mut handle = render(
            ["missing1.scss", "missing2.scss"],
            RenderOptions::new(dir.path()),
            callback,
        );
        let notes: Vec<_> = handle.notifications().collect();
        handle.wait().unwrap();

        assert_eq!(calls.lock().len(), 1);
        assert_eq!(notes.iter().filter(|n| n.level == Level::Error).count(), 1);
        assert_eq!(notes.iter().filter(|n| n.level == Level::Warn).count(), 1);
    }

    #[test]
    fn test_empty_batch_succeeds() {
        let dir = TempDir::new().unwrap();
        let (calls, callback) = recorder();
        let handle = render(Vec::<PathBuf>::new(), RenderOptions::new(dir.path()), callback);
        handle.wait().unwrap();

        assert_eq!(*calls.lock(), vec![None]);
    }

    #[test]
    fn test_found_notification_first() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.scss"), "a { b: c; }").unwrap();
        fs::write(dir.path().join("b.scss"), "a { b: c; }").unwrap();

        let (_calls, callback) = recorder();
        let mut handle = render(["a.scss", "b.scss"], RenderOptions::new(dir.path()), callback);

        let first = handle.notifications().next().unwrap();
        assert_eq!(first.level, Level::Debug);
        assert_eq!(first.message, "Found 2 stylesheet(s)");

        let rest: Vec<_> = handle.notifications().collect();
        assert!(rest.iter().any(|n| n.message == "Compiling a.scss"));
        assert!(rest.iter().any(|n| n.message == "Compiling b.scss"));
        assert_eq!(rest.iter().filter(|n| n.level == Level::Info).count(), 2);
        handle.wait().unwrap();
    }

    #[test]
    fn test_rooted_entry_reads_under_src() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("foo")).unwrap();
        fs::write(dir.path().join("foo/bar.styl"), "a { b: c; }").unwrap();

        let (calls, callback) = recorder();
        render("/foo/bar.styl", RenderOptions::new(dir.path()), callback)
            .wait()
            .unwrap();

        assert_eq!(*calls.lock(), vec![None]);
        assert!(dir.path().join("foo/bar.css").exists());
    }

    #[test]
    fn test_indented_syntax_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("theme.sass"), "a\n  width: $gap\n").unwrap();

        let options = RenderOptions::new(dir.path()).define("gap", serde_json::json!("4px"));
        let (calls, callback) = recorder();
        render("theme.sass", options, callback).wait().unwrap();

        assert_eq!(*calls.lock(), vec![None]);
        let css = fs::read_to_string(dir.path().join("theme.css")).unwrap();
        assert!(css.contains("width: 4px"), "{css}");
    }

    #[test]
    fn test_compile_override_used_verbatim() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.scss"), "this is not scss {{{").unwrap();

        let options = RenderOptions::new(dir.path())
            .define("ignored", serde_json::json!(1))
            .with_compile(|_: String, _: &Path| -> Box<dyn CompiledUnit> { Box::new(Fixed("ok{}")) });

        let (calls, callback) = recorder();
        render("a.scss", options, callback).wait().unwrap();

        assert_eq!(*calls.lock(), vec![None]);
        assert_eq!(fs::read_to_string(dir.path().join("a.css")).unwrap(), "ok{}");
    }

    #[test]
    fn test_defines_reach_every_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.scss"), "a { width: $w; }").unwrap();
        fs::write(dir.path().join("b.scss"), "b { width: $w * 2; }").unwrap();

        let options = RenderOptions::new(dir.path())
            .define("w", serde_json::json!("5px"))
            .define("w", serde_json::json!("10px"));

        let (calls, callback) = recorder();
        render(["a.scss", "b.scss"], options, callback).wait().unwrap();

        assert_eq!(*calls.lock(), vec![None]);
        assert!(fs::read_to_string(dir.path().join("a.css")).unwrap().contains("width: 10px"));
        assert!(fs::read_to_string(dir.path().join("b.css")).unwrap().contains("width: 20px"));
    }

    #[test]
    fn test_read_error_reported() {
        let dir = TempDir::new().unwrap();
        let (calls, callback) = recorder();
        render("absent.scss", RenderOptions::new(dir.path()), callback)
            .wait()
            .unwrap();

        let calls = calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].as_deref().unwrap().starts_with("failed to read"));
    }

    #[test]
    fn test_read_error_panics() {
        let dir = TempDir::new().unwrap();
        let (calls, callback) = recorder();
        let options = RenderOptions::new(dir.path()).read_errors(ReadErrorPolicy::Panic);

        let outcome = render("absent.scss", options, callback).wait();

        assert!(outcome.is_err());
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_bounded_jobs() {
        let dir = TempDir::new().unwrap();
        let names: Vec<String> = (0..6).map(|i| format!("s{i}.scss")).collect();
        for name in &names {
            fs::write(dir.path().join(name), "a { b: c; }").unwrap();
        }

        let (calls, callback) = recorder();
        render(names, RenderOptions::new(dir.path()).jobs(1), callback)
            .wait()
            .unwrap();

        assert_eq!(*calls.lock(), vec![None]);
        for i in 0..6 {
            assert!(dir.path().join(format!("s{i}.css")).exists());
        }
    }

    #[test]
    fn test_completion_latch() {
        let (calls, callback) = recorder();
        let completion = Completion::new(3, Box::new(callback));

        assert!(!completion.complete(Ok(())));
        assert!(completion.complete(Err(RenderError::options("boom"))));
        assert!(!completion.complete(Ok(())));
        assert!(!completion.complete(Err(RenderError::options("again"))));

        assert_eq!(calls.lock().len(), 1);
    }
}
