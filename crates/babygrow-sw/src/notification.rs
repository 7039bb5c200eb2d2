//! Push payloads and the notifications they produce.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

/// Notification center shared between the runtime and every controller version.
pub type SharedNotifications = Arc<RwLock<NotificationCenter>>;

/// Action id for the "open" button.
pub const ACTION_OPEN: &str = "open";
/// Action id for the "dismiss" button.
pub const ACTION_DISMISS: &str = "dismiss";

/// Decoded push message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    /// Decode push data. Missing or undecodable data yields an empty payload.
    pub fn parse(data: Option<&[u8]>) -> Self {
        let Some(bytes) = data else {
            return Self::default();
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Self::default();
        }
        match serde_json::from_slice::<PushPayload>(bytes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Push payload is not a JSON object, using defaults");
                Self::default()
            }
        }
    }
}

/// Defaults applied when a push payload leaves a field out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub url: String,
    pub icon: String,
    pub badge: String,
    /// Vibration pattern in milliseconds (on, off, on, ...).
    pub vibrate: Vec<u32>,
    pub open_title: String,
    pub dismiss_title: String,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "BabyGrow".to_string(),
            body: "Ada pembaruan dari BabyGrow!".to_string(),
            url: "/".to_string(),
            icon: "/static/icons/icon-192x192.png".to_string(),
            badge: "/static/icons/icon-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            open_title: "Buka".to_string(),
            dismiss_title: "Tutup".to_string(),
        }
    }
}

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Everything a shown notification carries besides its title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
    /// Target URL opened or focused on click.
    pub url: String,
}

/// Pick `value` unless it is missing or empty.
fn or_default(value: &Option<String>, default: &str) -> String {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

impl NotificationOptions {
    /// Build the title and options for a push payload.
    pub fn from_payload(payload: &PushPayload, defaults: &NotificationDefaults) -> (String, Self) {
        let title = or_default(&payload.title, &defaults.title);
        let options = Self {
            body: or_default(&payload.body, &defaults.body),
            icon: defaults.icon.clone(),
            badge: defaults.badge.clone(),
            vibrate: defaults.vibrate.clone(),
            actions: vec![
                NotificationAction {
                    action: ACTION_OPEN.to_string(),
                    title: defaults.open_title.clone(),
                },
                NotificationAction {
                    action: ACTION_DISMISS.to_string(),
                    title: defaults.dismiss_title.clone(),
                },
            ],
            url: or_default(&payload.url, &defaults.url),
        };
        (title, options)
    }
}

/// Notification identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A shown notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub options: NotificationOptions,
}

/// What the user did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
    Open,
    Dismiss,
}

impl ClickAction {
    /// `dismiss` dismisses; anything else, including a plain body click, opens.
    pub fn from_action(action: Option<&str>) -> Self {
        match action {
            Some(ACTION_DISMISS) => Self::Dismiss,
            _ => Self::Open,
        }
    }
}

/// Notifications currently on screen.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    shown: HashMap<NotificationId, Notification>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in the shared handle.
    pub fn shared() -> SharedNotifications {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn show(&mut self, title: String, options: NotificationOptions) -> Notification {
        let notification = Notification {
            id: NotificationId::new(),
            title,
            options,
        };
        self.shown.insert(notification.id, notification.clone());
        notification
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.get(&id)
    }

    /// Close a notification, handing back what it carried.
    pub fn close(&mut self, id: NotificationId) -> Option<Notification> {
        self.shown.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }
}
