//! Outbound notifications. Delivery is somebody else's problem: a
//! [`Notifier`] only has to accept the message.
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    GameApproved,
    GameAutoApproved,
    GameDeclined,
    GameDisputed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::GameApproved => "game_approved",
            NotificationKind::GameAutoApproved => "game_auto_approved",
            NotificationKind::GameDeclined => "game_declined",
            NotificationKind::GameDisputed => "game_disputed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient_id: String,
    pub sender_id: Option<String>, // None when the system acted
    pub message: String,
    pub kind: NotificationKind,
    pub game_id: String,
    /// Stable per (game, kind, recipient) so consumers can drop redeliveries
    pub dedupe_key: String,
}

impl Notification {
    pub fn new(
        recipient_id: &str,
        sender_id: Option<&str>,
        kind: NotificationKind,
        game_id: &str,
        message: String,
    ) -> Self {
        let seed = format!("{game_id}/{}/{recipient_id}", kind.as_str());
        let dedupe_key = sha256::digest(seed.as_bytes());
        Self {
            recipient_id: recipient_id.to_string(),
            sender_id: sender_id.map(str::to_string),
            message,
            kind,
            game_id: game_id.to_string(),
            dedupe_key,
        }
    }
}

pub trait Notifier: Send + Sync {
    /// Fire and forget
    fn notify(&self, notification: Notification);
}

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            recipient = %notification.recipient_id,
            sender = notification.sender_id.as_deref().unwrap_or("system"),
            kind = notification.kind.as_str(),
            game = %notification.game_id,
            "{}",
            notification.message
        );
    }
}
