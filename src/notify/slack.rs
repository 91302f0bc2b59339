use serde_json::json;

use crate::config::SlackSettings;

use super::{ChatSink, NotifyError};

const POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";

/// Single-attempt Slack delivery via `chat.postMessage`.
pub struct SlackNotifier {
    client: reqwest::blocking::Client,
    settings: SlackSettings,
}

impl SlackNotifier {
    pub fn new(settings: SlackSettings) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            settings,
        }
    }
}

impl ChatSink for SlackNotifier {
    fn post(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(POST_MESSAGE_URL)
            .bearer_auth(&self.settings.token)
            .json(&json!({
                "channel": self.settings.channel,
                "text": text,
            }))
            .send()?;

        // Slack reports API-level failures in the body, not the status code.
        let body: serde_json::Value = response.error_for_status()?.json()?;
        if body["ok"].as_bool().unwrap_or(false) {
            Ok(())
        } else {
            let reason = body["error"].as_str().unwrap_or("unknown").to_string();
            Err(NotifyError::ChatRejected(reason))
        }
    }
}
