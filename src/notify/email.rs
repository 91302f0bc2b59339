use lettre::message::{header::ContentType, Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::EmailSettings;

use super::{EmailSink, Notification, NotifyError};

/// STARTTLS-authenticated SMTP delivery with the composite attached as
/// image/jpeg.
pub struct SmtpMailer {
    settings: EmailSettings,
}

impl SmtpMailer {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    fn build_message(&self, note: &Notification) -> Result<Message, NotifyError> {
        let bytes = std::fs::read(&note.attachment)?;
        let filename = note
            .attachment
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "episode.jpg".to_string());
        let content_type =
            ContentType::parse("image/jpeg").map_err(|err| NotifyError::Build(err.to_string()))?;

        Message::builder()
            .from(
                self.settings
                    .from_addr
                    .parse()
                    .map_err(|err: lettre::address::AddressError| {
                        NotifyError::Build(err.to_string())
                    })?,
            )
            .to(self
                .settings
                .to_addr
                .parse()
                .map_err(|err: lettre::address::AddressError| {
                    NotifyError::Build(err.to_string())
                })?)
            .subject(note.subject.clone())
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(note.body.clone()))
                    .singlepart(Attachment::new(filename).body(bytes, content_type)),
            )
            .map_err(|err| NotifyError::Build(err.to_string()))
    }
}

impl EmailSink for SmtpMailer {
    fn send(&self, note: &Notification) -> Result<(), NotifyError> {
        let message = self.build_message(note)?;

        let transport = SmtpTransport::starttls_relay(&self.settings.smtp_host)?
            .port(self.settings.smtp_port)
            .credentials(Credentials::new(
                self.settings.smtp_user.clone(),
                self.settings.smtp_pass.clone(),
            ))
            .build();

        transport.send(&message)?;
        Ok(())
    }
}
