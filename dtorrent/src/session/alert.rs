//! Typed, severity-tagged notifications the session emits for its caller
//! to `pop_alert()`. Modeled on the `logger` crate's channel-sender shape
//! (a cheap-to-clone `Sender` side plus a consuming side), but carrying a
//! structured payload rather than a pre-formatted line, since a caller
//! polling alerts needs to branch on kind and severity.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Fatal,
}

#[derive(Debug, Clone)]
pub enum Alert {
    ListenFailed { message: String },
    PeerError { message: String },
    FileError { info_hash: [u8; 20], message: String },
    FastresumeRejected { info_hash: [u8; 20], message: String },
    TorrentFinished { info_hash: [u8; 20] },
    TrackerAnnounce { info_hash: [u8; 20], message: String },
}

impl Alert {
    pub fn severity(&self) -> Severity {
        match self {
            Alert::ListenFailed { .. } => Severity::Fatal,
            Alert::PeerError { .. } => Severity::Debug,
            Alert::FileError { .. } => Severity::Fatal,
            Alert::FastresumeRejected { .. } => Severity::Warning,
            Alert::TorrentFinished { .. } => Severity::Info,
            Alert::TrackerAnnounce { .. } => Severity::Info,
        }
    }
}

/// Sending half, cheap to clone and hand to the reactor and checker
/// threads, same way `LoggerSender` is handed out.
#[derive(Debug, Clone)]
pub struct AlertSink {
    sender: Sender<Alert>,
    min_severity: Severity,
}

impl AlertSink {
    pub fn post(&self, alert: Alert) {
        if alert.severity() < self.min_severity {
            return;
        }
        let _ = self.sender.send(alert);
    }

    pub fn set_severity_level(&mut self, severity: Severity) {
        self.min_severity = severity;
    }
}

/// Consuming half the public façade drains via `pop_alert`. Wrapped in a
/// mutex because `Session` hands out clones of this across caller threads,
/// and `mpsc::Receiver` is `Send` but not `Sync`.
pub struct AlertSource {
    receiver: Mutex<Receiver<Alert>>,
}

impl AlertSource {
    pub fn pop(&self) -> Option<Alert> {
        self.receiver.lock().expect("alert receiver mutex poisoned").try_recv().ok()
    }
}

pub fn alert_channel() -> (AlertSink, AlertSource) {
    let (sender, receiver) = channel();
    (
        AlertSink {
            sender,
            min_severity: Severity::Debug,
        },
        AlertSource { receiver: Mutex::new(receiver) },
    )
}
