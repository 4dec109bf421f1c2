use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A short message surfaced to the operator after a store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, message: message.into() }
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Success, message: message.into() }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, message: message.into() }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Receives notices emitted by store operations.
/// Implementations must not block; they are called inline on the submit path.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Forwards notices to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: &Notice) {
        match notice.level {
            NoticeLevel::Info | NoticeLevel::Success => {
                tracing::info!(level = ?notice.level, "{}", notice.message);
            }
            NoticeLevel::Error => tracing::error!("{}", notice.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_level() {
        assert_eq!(Notice::info("a").level, NoticeLevel::Info);
        assert_eq!(Notice::success("b").level, NoticeLevel::Success);
        assert_eq!(Notice::error("c").level, NoticeLevel::Error);
        assert_eq!(Notice::error("boom").to_string(), "boom");
    }

    #[test]
    fn notifier_is_object_safe() {
        let notifier: Box<dyn Notifier> = Box::new(TracingNotifier);
        notifier.notify(&Notice::info("participant P1 had no changes."));
    }
}
