//! Runtime messages
//!
//! Inbound messages come from content scripts and the popup. They are queued
//! and handled by a single dispatcher, so a report never changes the verdict of
//! a request that was already answered. Outbound notifications go to a frame
//! through a [`Messenger`].

use parking_lot::Mutex;
use possum_tabs::{FrameId, TabId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::Result;

pub const FIRSTPARTY_FINGERPRINTING: &str = "firstparty-fingerprinting";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// A content script saw `url` fingerprinting; the sender identifies the frame
    Fingerprinting { url: String },
    #[serde(rename_all = "camelCase")]
    UserUrlDeactivate { url: String, tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    UserHostDeactivate { tab_id: TabId },
}

impl Message {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Fingerprinting { .. } => "FINGERPRINTING",
            Message::UserUrlDeactivate { .. } => "USER_URL_DEACTIVATE",
            Message::UserHostDeactivate { .. } => "USER_HOST_DEACTIVATE",
        }
    }
}

/// Where a message came from. Popup messages have no tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    pub tab_id: Option<TabId>,
    pub frame_id: Option<FrameId>,
}

impl MessageSender {
    pub fn frame(tab_id: TabId, frame_id: FrameId) -> Self {
        Self {
            tab_id: Some(tab_id),
            frame_id: Some(frame_id),
        }
    }

    pub fn popup() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl Notification {
    pub fn first_party_fingerprinting(url: &str) -> Self {
        Self {
            kind: FIRSTPARTY_FINGERPRINTING.to_string(),
            url: url.to_string(),
        }
    }
}

/// Delivers notifications to frames. Implemented by the host runtime.
pub trait Messenger: Send + Sync {
    fn send_to_frame(&self, tab_id: TabId, frame_id: FrameId, notification: Notification);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub tab_id: TabId,
    pub notification: Notification,
    pub frame_id: FrameId,
}

/// Messenger that keeps everything it was asked to send
#[derive(Clone, Default)]
pub struct Outbox {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn last(&self) -> Option<OutboundMessage> {
        self.sent.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl Messenger for Outbox {
    fn send_to_frame(&self, tab_id: TabId, frame_id: FrameId, notification: Notification) {
        tracing::debug!(tab_id, frame_id, kind = %notification.kind, "Sending notification");
        self.sent.lock().push(OutboundMessage {
            tab_id,
            notification,
            frame_id,
        });
    }
}

/// Inbound queue drained by the dispatcher
pub struct MessageQueue {
    tx: mpsc::UnboundedSender<(Message, MessageSender)>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<(Message, MessageSender)>>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn post(&self, message: Message, sender: MessageSender) {
        // The receiver lives as long as the queue, so this can't fail
        let _ = self.tx.send((message, sender));
    }

    /// Take everything queued so far, in arrival order
    pub fn drain(&self) -> Vec<(Message, MessageSender)> {
        let mut rx = self.rx.lock();
        let mut drained = Vec::new();
        while let Ok(item) = rx.try_recv() {
            drained.push(item);
        }
        drained
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageQueue {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: Arc::clone(&self.rx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let msg = Message::from_json(r#"{"type": "USER_URL_DEACTIVATE", "url": "https://t.test/a.js", "tabId": 3}"#)
            .unwrap();
        assert_eq!(
            msg,
            Message::UserUrlDeactivate {
                url: "https://t.test/a.js".to_string(),
                tab_id: 3
            }
        );

        let msg = Message::from_json(r#"{"type": "USER_HOST_DEACTIVATE", "tabId": 3}"#).unwrap();
        assert_eq!(msg.kind(), "USER_HOST_DEACTIVATE");

        let msg = Message::from_json(r#"{"type": "FINGERPRINTING", "url": "https://t.test/fp.js"}"#)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({"type": "FINGERPRINTING", "url": "https://t.test/fp.js"})
        );

        assert!(Message::from_json(r#"{"type": "SOMETHING_ELSE"}"#).is_err());
    }

    #[test]
    fn test_notification_wire_format() {
        let notification = Notification::first_party_fingerprinting("https://first.test/fp.js");
        assert_eq!(
            serde_json::to_value(&notification).unwrap(),
            serde_json::json!({"type": "firstparty-fingerprinting", "url": "https://first.test/fp.js"})
        );
    }

    #[test]
    fn test_queue_preserves_order() {
        let queue = MessageQueue::new();
        queue.post(
            Message::UserHostDeactivate { tab_id: 1 },
            MessageSender::popup(),
        );
        queue.post(
            Message::Fingerprinting {
                url: "https://t.test/fp.js".to_string(),
            },
            MessageSender::frame(1, 0),
        );

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0.kind(), "USER_HOST_DEACTIVATE");
        assert_eq!(drained[1].1, MessageSender::frame(1, 0));
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_outbox_records() {
        let outbox = Outbox::new();
        let shared = outbox.clone();
        shared.send_to_frame(4, 2, Notification::first_party_fingerprinting("https://a.test/"));

        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox.last().unwrap().frame_id, 2);
    }
}
