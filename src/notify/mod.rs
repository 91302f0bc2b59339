pub mod email;
pub mod slack;

use log::{error, warn};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use email::SmtpMailer;
pub use slack::SlackNotifier;

/// Email delivery gets this many immediate attempts before giving up.
pub const EMAIL_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("message build failed: {0}")]
    Build(String),
    #[error("attachment unreadable: {0}")]
    Attachment(#[from] std::io::Error),
    #[error("email transport error: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
    #[error("chat transport error: {0}")]
    Chat(#[from] reqwest::Error),
    #[error("slack rejected the message: {0}")]
    ChatRejected(String),
    #[error("delivery failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// One episode's outgoing message. Subject and body carry the same detection
/// phrase plus the closing timestamp; the composite rides along as an
/// attachment. Immutable once built.
#[derive(Debug, Clone)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub attachment: PathBuf,
}

impl Notification {
    pub fn new(stamp: &str, attachment: &Path) -> Self {
        let text = format!("Detect something change!!....{stamp}");
        Self {
            subject: text.clone(),
            body: text,
            attachment: attachment.to_path_buf(),
        }
    }
}

pub trait EmailSink: Send {
    fn send(&self, note: &Notification) -> Result<(), NotifyError>;
}

pub trait ChatSink: Send {
    fn post(&self, text: &str) -> Result<(), NotifyError>;
}

/// Runs `op` up to `attempts` times, returning the first success. No backoff;
/// failures retry immediately.
pub fn with_retries<T>(
    attempts: u32,
    mut op: impl FnMut() -> Result<T, NotifyError>,
) -> Result<T, NotifyError> {
    let mut last = String::new();
    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!("delivery attempt {attempt}/{attempts} failed: {err}");
                last = err.to_string();
            }
        }
    }
    Err(NotifyError::RetriesExhausted { attempts, last })
}

pub struct DispatchOutcome {
    pub email: Result<(), NotifyError>,
    pub chat: Result<(), NotifyError>,
}

/// Fans one notification out to both channels. The channels are independent:
/// email exhausting its retries never stops the chat attempt, and vice versa.
pub struct Dispatcher {
    email: Box<dyn EmailSink>,
    chat: Box<dyn ChatSink>,
}

impl Dispatcher {
    pub fn new(email: Box<dyn EmailSink>, chat: Box<dyn ChatSink>) -> Self {
        Self { email, chat }
    }

    pub fn dispatch(&self, artifact: &Path, stamp: &str) -> DispatchOutcome {
        let note = Notification::new(stamp, artifact);

        let email = with_retries(EMAIL_ATTEMPTS, || self.email.send(&note));
        if let Err(err) = &email {
            error!("email delivery gave up: {err}");
        }

        let chat = self.chat.post(&note.body);
        if let Err(err) = &chat {
            error!("chat delivery failed: {err}");
        }

        DispatchOutcome { email, chat }
    }
}
