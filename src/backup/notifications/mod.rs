use crate::backup::notifications::smtp::SmtpNotificationConfig;
use crate::backup::notifications::telegram::TelegramNotificationConfig;
use crate::backup::notifications::webhook::WebhookNotificationConfig;
use crate::backup::result_error::result::Result;
use derive_more::From;
use std::result;
use validator::{Validate, ValidationErrors};

pub mod smtp;
pub mod telegram;
pub mod webhook;

/// One configured channel of `NOTIFY_METHOD`.
#[derive(Clone, From, Debug)]
pub enum NotificationConfig {
    Smtp(SmtpNotificationConfig),
    Webhook(WebhookNotificationConfig),
    Telegram(TelegramNotificationConfig),
}

impl NotificationConfig {
    pub fn channel(&self) -> &'static str {
        match self {
            Self::Smtp(_) => "email",
            Self::Webhook(_) => "webhook",
            Self::Telegram(_) => "telegram",
        }
    }
}

impl Validate for NotificationConfig {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            Self::Smtp(inner) => inner.validate(),
            Self::Webhook(inner) => inner.validate(),
            Self::Telegram(inner) => inner.validate(),
        }
    }
}

impl Notification for NotificationConfig {
    fn send(&self, topic: &str, msg: &str) -> Result<()> {
        match self {
            Self::Smtp(inner) => inner.send(topic, msg),
            Self::Webhook(inner) => inner.send(topic, msg),
            Self::Telegram(inner) => inner.send(topic, msg),
        }
    }
}

pub trait Notification {
    fn send(&self, topic: &str, msg: &str) -> Result<()>;
}

/// Request timeout shared by the HTTP based channels.
pub(crate) const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
