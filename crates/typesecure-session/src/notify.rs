//! User notifications (toasts).
//!
//! Every public session operation that fails produces exactly one
//! [`Notice`], and the notable successes produce one too. The manager
//! hands notices to a [`Notifier`], which decides how to show them.

use std::sync::Arc;

use crate::ErrorKind;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// One user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
    /// Error kind behind an error notice.
    pub kind: Option<ErrorKind>,
}

impl Notice {
    /// A success notice.
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.into(),
            message: message.into(),
            kind: None,
        }
    }

    /// An error notice for an error of `kind`.
    pub fn error(
        kind: ErrorKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            message: message.into(),
            kind: Some(kind),
        }
    }
}

/// Shows notices to the user.
///
/// Called synchronously from manager methods, so implementations
/// should hand off rather than block.
pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notice: Notice);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice);
    }
}

/// Default notifier: writes notices to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => {
                tracing::info!(title = %notice.title, "{}", notice.message);
            }
            NoticeLevel::Error => {
                tracing::warn!(
                    title = %notice.title,
                    kind = ?notice.kind,
                    "{}",
                    notice.message
                );
            }
        }
    }
}
