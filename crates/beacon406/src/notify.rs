//! Telegram alerting
//!
//! One fixed-template message per decoded frame, delivered with a
//! blocking form POST to the Bot API. Delivery is fire-and-forget:
//! the response body is never inspected, and a transport failure is
//! logged and reported as `false`, never raised.

use log::error;

/// Sink for decode alerts
pub trait AlertSink {
    /// Announce a successful decode
    ///
    /// `timestamp` is the scan session's recorded start time. Returns
    /// false if the alert could not be delivered.
    fn notify(&mut self, timestamp: &str) -> bool;
}

/// Posts alerts to a Telegram chat
pub struct TelegramNotifier {
    token: String,
    chat_id: String,
    client: reqwest::blocking::Client,
}

impl TelegramNotifier {
    /// Build a notifier if both credentials are usable
    ///
    /// Returns `None` when either credential is absent or empty;
    /// alerting is then silently disabled.
    pub fn from_credentials(token: Option<String>, chat_id: Option<String>) -> Option<Self> {
        match (token, chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => {
                Some(Self {
                    token,
                    chat_id,
                    client: reqwest::blocking::Client::new(),
                })
            }
            _ => None,
        }
    }
}

impl AlertSink for TelegramNotifier {
    fn notify(&mut self, timestamp: &str) -> bool {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let text = alert_text(timestamp);
        let form = [("chat_id", self.chat_id.as_str()), ("text", text.as_str())];

        match self.client.post(&url).form(&form).send() {
            Ok(_) => true,
            Err(err) => {
                error!("{}", err);
                false
            }
        }
    }
}

// Message template. Kept in French to match the historical alert
// wording operators expect.
fn alert_text(timestamp: &str) -> String {
    format!(
        "Alerte Balise 406\nDate et Heure (UTC) du decodage: {}",
        timestamp
    )
}
