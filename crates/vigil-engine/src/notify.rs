//! User-notification seam. Holds, escalations, and approvals are surfaced
//! here instead of terminating the process.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Urgent,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, title: &str, body: &str);
}

/// Default notifier: routes notices into the tracing log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NoticeLevel, title: &str, body: &str) {
        match level {
            NoticeLevel::Info => tracing::info!(title, body, "notice"),
            NoticeLevel::Warning => tracing::warn!(title, body, "notice"),
            NoticeLevel::Urgent => tracing::error!(title, body, "notice"),
        }
    }
}

/// Discards all notices. For tests and headless runs.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _level: NoticeLevel, _title: &str, _body: &str) {}
}
