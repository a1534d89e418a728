//! Status and error notices raised while serving the posts page.

use std::sync::Mutex;

use tracing::{error, info};

use crate::cache::mutex_lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Status,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Sink for user-facing notices.
pub trait Notifier: Send + Sync {
    fn status(&self, message: &str);
    fn error(&self, message: &str);
}

/// Emits notices as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn status(&self, message: &str) {
        info!(target: "cachet::notice", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "cachet::notice", "{message}");
    }
}

/// Keeps notices in memory, in the order they were raised.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        mutex_lock(&self.notices, "application::notify", "notices").clone()
    }

    /// Returns and forgets everything collected so far.
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *mutex_lock(&self.notices, "application::notify", "drain"))
    }

    pub fn messages(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .map(|notice| notice.message)
            .collect()
    }

    fn push(&self, level: NoticeLevel, message: &str) {
        mutex_lock(&self.notices, "application::notify", "push").push(Notice {
            level,
            message: message.to_string(),
        });
    }
}

impl Notifier for CollectingNotifier {
    fn status(&self, message: &str) {
        self.push(NoticeLevel::Status, message);
    }

    fn error(&self, message: &str) {
        self.push(NoticeLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_in_order_and_drains() {
        let notifier = CollectingNotifier::new();
        notifier.status("From remote");
        notifier.error("No posts in cache.");

        assert_eq!(
            notifier.drain(),
            vec![
                Notice {
                    level: NoticeLevel::Status,
                    message: "From remote".to_string(),
                },
                Notice {
                    level: NoticeLevel::Error,
                    message: "No posts in cache.".to_string(),
                },
            ]
        );
        assert!(notifier.notices().is_empty());
    }
}
