use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A transient, user-facing message. Never carries raw internal errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Success, message.into(), None);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Warning, message.into(), None);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(NoticeLevel::Error, message.into(), None);
    }

    pub fn error_with(&self, message: impl Into<String>, description: impl Into<String>) {
        self.emit(NoticeLevel::Error, message.into(), Some(description.into()));
    }

    /// The standard failure wording for a user action, e.g. "create folder".
    pub fn action_failed(&self, action: &str) {
        self.error(format!("Something went wrong! Unable to {}.", action));
    }

    fn emit(&self, level: NoticeLevel, message: String, description: Option<String>) {
        // No subscriber means nobody is rendering notices right now.
        let _ = self.sender.send(Notice {
            level,
            message,
            description,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{NoticeLevel, Notifier};

    #[test]
    fn subscribers_receive_action_failures() {
        let notifier = Notifier::new();
        let mut receiver = notifier.subscribe();
        notifier.action_failed("delete file");
        let notice = receiver.try_recv().expect("notice");
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, "Something went wrong! Unable to delete file.");
    }

    #[test]
    fn emitting_without_subscribers_is_harmless() {
        let notifier = Notifier::new();
        notifier.success("Folder created.");
    }
}
