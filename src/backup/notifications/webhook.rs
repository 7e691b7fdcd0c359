use crate::backup::function_path;
use crate::backup::notifications::{Notification, HTTP_TIMEOUT};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddFunctionName;
use bon::Builder;
use function_name::named;
use getset::Getters;
use validator::Validate;

/// Chat webhook (`NOTIFY_METHOD=webhook` or `slack`), posts `{"text": ...}`.
#[derive(Clone, Debug, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct WebhookNotificationConfig {
    #[validate(url)]
    #[builder(into)]
    url: String,
}

impl Notification for WebhookNotificationConfig {
    #[named]
    fn send(&self, topic: &str, msg: &str) -> Result<()> {
        tracing::info!("Posting webhook notification to {}", self.url);
        let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
        let body = serde_json::json!({ "text": format!("*{topic}*\n{msg}") });
        match agent.post(&self.url).send_json(body) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => {
                Err(Error::notification_status(self.url.clone(), code))
            }
            Err(e) => Err(Error::from(e)),
        }
        .add_fn_name(function_path!())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::notifications::http_stub::serve_once;

    #[test]
    fn test_posts_text_payload() {
        let (base, handle) = serve_once(200);
        let config = WebhookNotificationConfig::builder()
            .url(format!("{base}/hooks/abc"))
            .build();
        config.send("[blog] backup SUCCESS", "Backup completed").unwrap();

        let (request_line, body) = handle.join().unwrap();
        assert_eq!(request_line, "POST /hooks/abc HTTP/1.1");
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["text"], "*[blog] backup SUCCESS*\nBackup completed");
    }

    #[test]
    fn test_error_status() {
        let (base, handle) = serve_once(500);
        let config = WebhookNotificationConfig::builder().url(base).build();
        let err = config.send("t", "m").unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err.root(), Error::NotificationStatus(_, 500)));
    }

    #[test]
    fn test_url_validation() {
        let config = WebhookNotificationConfig::builder().url("not a url").build();
        assert!(config.validate().is_err());
    }
}
