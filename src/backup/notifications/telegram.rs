use crate::backup::function_path;
use crate::backup::notifications::{Notification, HTTP_TIMEOUT};
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use bon::Builder;
use function_name::named;
use getset::Getters;
use validator::Validate;

/// Telegram bot message (`NOTIFY_METHOD=telegram`).
#[derive(Clone, Debug, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct TelegramNotificationConfig {
    #[validate(nested)]
    #[builder(into)]
    bot_token: RedactedString,
    #[validate(length(min = 1))]
    #[builder(into)]
    chat_id: String,
    #[builder(default = "https://api.telegram.org".to_string(), into)]
    api_base: String,
}

impl Notification for TelegramNotificationConfig {
    #[named]
    fn send(&self, topic: &str, msg: &str) -> Result<()> {
        tracing::info!("Sending telegram notification to chat {}", self.chat_id);
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.bot_token.inner()
        );
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": format!("{topic}\n\n{msg}"),
        });
        // The request url carries the token, keep it out of error messages.
        match agent.post(&url).send_json(body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => {
                Err(Error::notification_status(self.api_base.clone(), code))
            }
            Err(ureq::Error::Transport(t)) => Err(Error::from(std::io::Error::other(format!(
                "telegram request to {} failed: {}",
                self.api_base,
                t.kind()
            )))),
        }
        .add_fn_name(function_path!())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::notifications::http_stub::serve_once;

    #[test]
    fn test_send_message() {
        let (base, handle) = serve_once(200);
        let config = TelegramNotificationConfig::builder()
            .bot_token("123456:ABC")
            .chat_id("-100200300")
            .api_base(base)
            .build();
        config.send("[blog] restore FAILURE", "Extract failed").unwrap();

        let (request_line, body) = handle.join().unwrap();
        assert_eq!(request_line, "POST /bot123456:ABC/sendMessage HTTP/1.1");
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["chat_id"], "-100200300");
        assert_eq!(json["text"], "[blog] restore FAILURE\n\nExtract failed");
    }

    #[test]
    fn test_error_does_not_leak_token() {
        let (base, handle) = serve_once(401);
        let config = TelegramNotificationConfig::builder()
            .bot_token("123456:hunter2xyz")
            .chat_id("1")
            .api_base(base)
            .build();
        let err = config.send("t", "m").unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err.root(), Error::NotificationStatus(_, 401)));
        assert!(!err.to_string().contains("hunter2xyz"));
        assert!(!format!("{:?}", config).contains("hunter2xyz"));
    }
}
