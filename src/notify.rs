//! Progress notifications.
//!
//! A batch reports its progress through a [`Notifications`] channel returned
//! by [`render`](crate::render). The channel buffers everything it receives,
//! so a caller that starts polling after `render` returns still sees the
//! first `Found N stylesheet(s)` message.
//!
//! Every notification is mirrored to [`tracing`] at the matching level.
//! Per-file notifications carry the file as a `path` field.

use std::fmt;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use chrono::{DateTime, Utc};

// =============================================================================
// Level
// =============================================================================

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Per-file progress.
    Debug,
    /// Files written.
    Info,
    /// Failures that no longer reach the terminal callback.
    Warn,
    /// Task failures.
    Error,
}

impl Level {
    /// Lowercase label, e.g. `"debug"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "colored")]
fn paint(level: Level) -> String {
    use owo_colors::{OwoColorize, Stream};
    let label = level.as_str();
    match level {
        Level::Debug => label.if_supports_color(Stream::Stderr, |t| t.dimmed()).to_string(),
        Level::Info => label.if_supports_color(Stream::Stderr, |t| t.green()).to_string(),
        Level::Warn => label.if_supports_color(Stream::Stderr, |t| t.yellow()).to_string(),
        Level::Error => label.if_supports_color(Stream::Stderr, |t| t.red()).to_string(),
    }
}

#[cfg(not(feature = "colored"))]
fn paint(level: Level) -> String {
    level.as_str().to_owned()
}

// =============================================================================
// Notification
// =============================================================================

/// A single progress message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Human-readable message.
    pub message: String,
    /// Severity.
    pub level: Level,
    /// When the notification was emitted.
    pub at: DateTime<Utc>,
}

impl Notification {
    /// Create a notification stamped with the current time.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            at: Utc::now(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", paint(self.level), self.message)
    }
}

// =============================================================================
// Notifier - sending side
// =============================================================================

/// Sending side of the notification channel.
///
/// Cloned into every task. Sends never fail loudly: once the caller drops
/// its [`Notifications`], messages only go to `tracing`.
#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: Sender<Notification>,
}

impl Notifier {
    pub(crate) fn channel() -> (Self, Notifications) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, Notifications { rx })
    }

    pub(crate) fn emit(&self, level: Level, path: Option<&Path>, message: impl Into<String>) {
        let notification = Notification::new(level, message);
        let path = path.map(|p| p.display().to_string());
        let path = path.as_deref();
        match level {
            Level::Debug => tracing::debug!(target: "style_batch", path, "{}", notification.message),
            Level::Info => tracing::info!(target: "style_batch", path, "{}", notification.message),
            Level::Warn => tracing::warn!(target: "style_batch", path, "{}", notification.message),
            Level::Error => tracing::error!(target: "style_batch", path, "{}", notification.message),
        }
        let _ = self.tx.send(notification);
    }

    /// Notification about one file.
    pub(crate) fn file(&self, level: Level, path: &Path, message: impl Into<String>) {
        self.emit(level, Some(path), message);
    }

    pub(crate) fn debug(&self, message: impl Into<String>) {
        self.emit(Level::Debug, None, message);
    }

    pub(crate) fn warn(&self, message: impl Into<String>) {
        self.emit(Level::Warn, None, message);
    }
}

// =============================================================================
// Notifications - receiving side
// =============================================================================

/// Receiving side of the notification channel.
///
/// Iterating blocks until the next notification arrives and ends once the
/// batch has finished and every task dropped its sender.
#[derive(Debug)]
pub struct Notifications {
    rx: Receiver<Notification>,
}

impl Notifications {
    /// Next notification without blocking, if one is queued.
    pub fn try_next(&self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued right now without blocking.
    pub fn try_iter(&self) -> impl Iterator<Item = Notification> + '_ {
        self.rx.try_iter()
    }

    /// Wait up to `timeout` for the next notification.
    ///
    /// Returns `None` on timeout or once the batch has finished.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Notification> {
        match self.rx.recv_timeout(timeout) {
            Ok(n) => Some(n),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Iterator for Notifications {
    type Item = Notification;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}
