//! Credentials that never show up in logs.
//!
//! SMTP passwords and bot tokens are loaded from the project config and kept
//! in a `RedactedString`: its `Debug` output and serialized form are a fixed
//! placeholder, and the buffer is zeroed when dropped.

use bon::Builder;
use derive_more::From;
use getset::Getters;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::result;
use validator::Validate;
use zeroize::Zeroize;

pub static REDACTED_SECRET: &str = "###REDACTED_SECRET###";

#[derive(Validate, Clone, Zeroize, From, Builder, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct RedactedString {
    #[validate(length(min = 1))]
    #[builder(into)]
    inner: String,
}

impl From<&str> for RedactedString {
    fn from(value: &str) -> Self {
        Self::builder().inner(value).build()
    }
}

impl Debug for RedactedString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", REDACTED_SECRET)
    }
}

impl Serialize for RedactedString {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED_SECRET)
    }
}

impl<'de> Deserialize<'de> for RedactedString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(RedactedStringVisitor)
    }
}

impl Drop for RedactedString {
    fn drop(&mut self) {
        self.zeroize();
    }
}

struct RedactedStringVisitor;

impl Visitor<'_> for RedactedStringVisitor {
    type Value = RedactedString;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a secret string")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(RedactedString::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let secret = RedactedString::from("hunter22");
        assert_eq!(format!("{:?}", secret), REDACTED_SECRET);
        assert_eq!(secret.inner(), "hunter22");
    }

    #[test]
    fn test_serialize_is_redacted() {
        let secret = RedactedString::from("123456:ABC-token");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, format!("\"{}\"", REDACTED_SECRET));

        let back: RedactedString = serde_json::from_str("\"123456:ABC-token\"").unwrap();
        assert_eq!(back, secret);
    }

    #[test]
    fn test_empty_secret_fails_validation() {
        assert!(RedactedString::from("").validate().is_err());
        assert!(RedactedString::from("x").validate().is_ok());
    }
}
