use crate::backup::function_path;
use crate::backup::notifications::Notification;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use validator::Validate;

/// Email notification over SMTP (`NOTIFY_METHOD=email`).
///
/// Credentials are optional, some relays accept unauthenticated mail from
/// the local network. The password is a `RedactedString` so it never shows
/// up in logs.
#[derive(Clone, Debug, Validate, Builder, Getters)]
#[getset(get = "pub")]
pub struct SmtpNotificationConfig {
    #[builder(into)]
    host: String,
    /// Overrides the default port of `smtp_mode`.
    port: Option<u16>,
    #[builder(default)]
    smtp_mode: SmtpMode,
    from: Mailbox,
    #[validate(length(min = 1))]
    to: Vec<Mailbox>,
    #[builder(into)]
    username: Option<String>,
    #[builder(into)]
    password: Option<RedactedString>,
}

/// SMTP connection security, `SMTP_MODE` in the project config.
///
/// - `Unsecured`: plain text connection
/// - `Ssl`: TLS from the first byte
/// - `StartTls`: plain text upgraded with STARTTLS
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub enum SmtpMode {
    Unsecured,
    Ssl,
    #[default]
    StartTls,
}

impl Display for SmtpMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SmtpMode::Unsecured => "unsecured",
            SmtpMode::Ssl => "ssl",
            SmtpMode::StartTls => "starttls",
        })
    }
}

impl FromStr for SmtpMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unsecured" | "none" | "plain" => Ok(SmtpMode::Unsecured),
            "ssl" | "tls" => Ok(SmtpMode::Ssl),
            "starttls" => Ok(SmtpMode::StartTls),
            other => Err(format!(
                "unknown smtp mode {other:?}, expected ssl, starttls or unsecured"
            )),
        }
    }
}

impl Notification for SmtpNotificationConfig {
    #[named]
    fn send(&self, topic: &str, msg: &str) -> Result<()> {
        tracing::info!(
            "Started smtp email notification from {:?} to {:?}",
            self.from,
            self.to
        );
        let email = self
            .to
            .iter()
            .fold(Message::builder(), |email, send_to| {
                email.to(send_to.clone())
            })
            .from(self.from.clone())
            .subject(topic)
            .header(ContentType::TEXT_PLAIN)
            .body(msg.to_string())
            .map_err(Error::from)
            .add_msg(format!(
                "Fail to build notification email from {:?} to {:?}",
                self.from, self.to
            ))
            .add_fn_name(function_path!())?;

        let builder = match self.smtp_mode {
            SmtpMode::Unsecured => Ok(SmtpTransport::builder_dangerous(self.host.as_str())),
            SmtpMode::Ssl => SmtpTransport::relay(self.host.as_str()),
            SmtpMode::StartTls => SmtpTransport::starttls_relay(self.host.as_str()),
        }
        .map_err(Error::from)
        .add_msg(format!(
            "Failed to build smtp client for host: {:?} with mode {}",
            self.host, self.smtp_mode
        ))
        .add_fn_name(function_path!())?;

        let builder = match self.port {
            Some(port) => builder.port(port),
            None => builder,
        };
        let mailer = match (&self.username, &self.password) {
            (Some(username), Some(password)) => builder
                .credentials(Credentials::new(username.clone(), password.inner().clone())),
            _ => builder,
        }
        .build();

        tracing::info!("Sending email...");
        let response = mailer
            .send(&email)
            .map_err(Error::from)
            .add_fn_name(function_path!())?;
        if response.is_positive() {
            Ok(())
        } else {
            let error_vec = response
                .message()
                .map(|m| Error::smtp_send_error(m.to_owned()))
                .collect_vec();
            Err(Error::lots_of_error(error_vec))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    fn test_smtp_notification_send() {
        use std::env;

        // Skip if running in CI or without network
        if env::var("CI").is_ok() {
            return;
        }

        let server = maik::MockServer::builder().no_verify_credentials().build();

        let config = SmtpNotificationConfig::builder()
            .host(server.host().to_string())
            .port(server.port())
            .smtp_mode(SmtpMode::Unsecured)
            .from("wp-backup@example.com".parse::<Mailbox>().unwrap())
            .to(vec!["admin@example.com".parse::<Mailbox>().unwrap()])
            .username("testuser")
            .password(RedactedString::from("testpass"))
            .build();

        server.start();
        std::thread::sleep(std::time::Duration::from_millis(100));

        let result = config.send("[blog] backup SUCCESS", "Backup completed");

        std::thread::sleep(std::time::Duration::from_millis(200));

        if result.is_ok() {
            let assertion = maik::MailAssertion::new()
                .recipients_are(["admin@example.com"])
                .body_is("Backup completed");
            assert!(server.assert(assertion));
        }
    }

    #[test]
    fn test_smtp_notification_validation() {
        let valid_config = SmtpNotificationConfig::builder()
            .host("smtp.example.com")
            .smtp_mode(SmtpMode::Ssl)
            .from("test@example.com".parse::<Mailbox>().unwrap())
            .to(vec!["recipient@example.com".parse::<Mailbox>().unwrap()])
            .build();

        assert!(valid_config.validate().is_ok());
        assert!(valid_config.username().is_none());

        let invalid_config = SmtpNotificationConfig::builder()
            .host("smtp.example.com")
            .from("test@example.com".parse::<Mailbox>().unwrap())
            .to(vec![])
            .build();

        assert!(invalid_config.validate().is_err());
        assert_eq!(*invalid_config.smtp_mode(), SmtpMode::StartTls);
    }

    #[test]
    fn test_smtp_mode_from_config_value() {
        let modes = vec![
            ("unsecured", SmtpMode::Unsecured),
            ("SSL", SmtpMode::Ssl),
            (" starttls ", SmtpMode::StartTls),
        ];

        for (value, expected) in modes {
            assert_eq!(value.parse::<SmtpMode>().unwrap(), expected);
        }
        assert!("smtps-ish".parse::<SmtpMode>().is_err());
        assert_eq!(SmtpMode::StartTls.to_string(), "starttls");
    }
}
