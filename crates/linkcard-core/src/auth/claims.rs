//! Decoding and validation of signed bearer tokens.
//!
//! Tokens are three dot-separated segments; only the middle (payload)
//! segment is read. Signatures are never verified here - that is the
//! server's job. Every function is pure and never panics: anything that does
//! not decode into a complete [`Claims`] is treated as malformed.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// base64url, accepting payloads with or without `=` padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded token payload. Subject, issued-at and expiry are required.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user) identifier. Numeric subjects are kept as their decimal text.
    #[serde(deserialize_with = "subject")]
    pub sub: String,
    /// Issued-at, seconds since epoch
    #[serde(deserialize_with = "epoch_seconds")]
    pub iat: i64,
    /// Expiry, seconds since epoch
    #[serde(deserialize_with = "epoch_seconds")]
    pub exp: i64,
    /// Any other fields carried by the token
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }

    fn expiry_millis(&self) -> i64 {
        self.exp.saturating_mul(1000)
    }

    /// Time left before expiry, negative once expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        // i64::MIN milliseconds is outside the range TimeDelta accepts
        let millis = self.expiry_millis().saturating_sub(now.timestamp_millis());
        Duration::milliseconds(millis.max(-i64::MAX))
    }
}

fn subject<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid subject: {}", other))),
    }
}

fn epoch_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let n = serde_json::Number::deserialize(deserializer)?;
    n.as_i64()
        .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
        .filter(|secs| DateTime::from_timestamp(*secs, 0).is_some())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", n)))
}

/// Decode the payload of `token`. Returns `None` for anything malformed.
pub fn decode(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let bytes = PAYLOAD_ENGINE.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// True if the token cannot be decoded or its expiry is strictly before now.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// [`is_expired`] evaluated against an explicit `now`.
///
/// A token whose expiry equals `now` to the millisecond is still valid.
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode(token) {
        Some(claims) => claims.expiry_millis() < now.timestamp_millis(),
        None => true,
    }
}

/// True if the token expires within `window` of now, or cannot be decoded.
pub fn will_expire_within(token: &str, window: Duration) -> bool {
    will_expire_within_at(token, window, Utc::now())
}

/// [`will_expire_within`] evaluated against an explicit `now`.
pub fn will_expire_within_at(token: &str, window: Duration, now: DateTime<Utc>) -> bool {
    match decode(token) {
        Some(claims) => claims.time_until_expiry(now) <= window,
        None => true,
    }
}

/// True if the token decodes with subject, issued-at and expiry present.
pub fn is_valid_structure(token: &str) -> bool {
    decode(token).is_some()
}
