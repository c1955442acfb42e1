use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationType {
    Loading,
    Success,
    Error,
}

/// A user-facing message. Notifications sharing a `key` replace each other,
/// so one purchase shows a single line moving from loading to its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppNotification {
    pub id: String,
    pub key: Option<String>,
    pub notification_type: NotificationType,
    pub message: String,
    /// Optional link rendered next to the message (e.g. a block-explorer URL).
    pub link: Option<String>,
    /// How long the message should stay visible, in seconds. `None` keeps it
    /// until replaced.
    pub duration_secs: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl AppNotification {
    pub fn new(notification_type: NotificationType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key: None,
            notification_type,
            message: message.into(),
            link: None,
            duration_secs: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_duration(mut self, secs: u64) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// In-memory notification store, newest first.
#[derive(Debug)]
pub struct NotificationStore {
    notifications: Vec<AppNotification>,
    max_notifications: usize,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self {
            notifications: Vec::new(),
            max_notifications: 100,
        }
    }

    /// Push a notification. A keyed notification replaces any earlier one with
    /// the same key and moves to the front.
    pub fn push(&mut self, notification: AppNotification) {
        if let Some(key) = &notification.key {
            self.notifications
                .retain(|n| n.key.as_deref() != Some(key.as_str()));
        }
        self.notifications.insert(0, notification);
        if self.notifications.len() > self.max_notifications {
            self.notifications.truncate(self.max_notifications);
        }
    }

    /// Current notification for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&AppNotification> {
        self.notifications
            .iter()
            .find(|n| n.key.as_deref() == Some(key))
    }

    pub fn all(&self) -> &[AppNotification] {
        &self.notifications
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_push_replaces_previous() {
        let mut store = NotificationStore::new();
        store.push(AppNotification::new(NotificationType::Loading, "Waiting").with_key("buy"));
        store.push(AppNotification::new(NotificationType::Success, "Done").with_key("buy"));

        assert_eq!(store.all().len(), 1);
        let current = store.get("buy").unwrap();
        assert_eq!(current.notification_type, NotificationType::Success);
        assert_eq!(current.message, "Done");
    }

    #[test]
    fn unkeyed_push_accumulates_newest_first() {
        let mut store = NotificationStore::new();
        store.push(AppNotification::new(NotificationType::Error, "first"));
        store.push(AppNotification::new(NotificationType::Error, "second"));
        assert_eq!(store.all().len(), 2);
        assert_eq!(store.all()[0].message, "second");
    }

    #[test]
    fn different_keys_coexist() {
        let mut store = NotificationStore::new();
        store.push(AppNotification::new(NotificationType::Loading, "a").with_key("a"));
        store.push(AppNotification::new(NotificationType::Loading, "b").with_key("b"));
        store.push(AppNotification::new(NotificationType::Error, "a failed").with_key("a"));

        assert_eq!(store.all().len(), 2);
        assert_eq!(store.all()[0].message, "a failed");
        assert_eq!(store.get("b").unwrap().message, "b");
    }

    #[test]
    fn store_truncates_at_max() {
        let mut store = NotificationStore::new();
        store.max_notifications = 3;
        for i in 0..5 {
            store.push(AppNotification::new(NotificationType::Success, format!("msg{i}")));
        }
        assert_eq!(store.all().len(), 3);
        assert_eq!(store.all()[0].message, "msg4");
    }

    #[test]
    fn builder_sets_link_and_duration() {
        let n = AppNotification::new(NotificationType::Success, "ok")
            .with_link("https://kovan.etherscan.io/tx/0x1")
            .with_duration(5);
        assert_eq!(n.link.as_deref(), Some("https://kovan.etherscan.io/tx/0x1"));
        assert_eq!(n.duration_secs, Some(5));
    }
}
