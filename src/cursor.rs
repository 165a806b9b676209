//! # Timeline Cursor
//!
//! Opaque pagination cursor for ranked timelines. The cursor pins the instant
//! the ranking was computed at, so later pages score posts identically, and
//! records the last item's sort key.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, field_error};

const MAX_CURSOR_LEN: usize = 1000;
const MAX_DECODED_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineCursor {
    /// Instant all scores on every page are computed at
    pub as_of: DateTime<Utc>,
    /// Sort key of the last item on the previous page
    pub score: f64,
    pub published_at: DateTime<Utc>,
    pub id: Uuid,
}

impl TimelineCursor {
    /// URL-safe base64 of the JSON form; safe to pass in a query string as is.
    pub fn encode(&self) -> String {
        let json = serde_json::json!({
            "as_of": self.as_of,
            "score": self.score,
            "published_at": self.published_at,
            "id": self.id,
        });
        URL_SAFE_NO_PAD.encode(json.to_string().as_bytes())
    }

    /// Decodes and sanity-checks a cursor; every failure is a 422 on `cursor`.
    pub fn decode(cursor: &str) -> Result<Self, ApiError> {
        if cursor.is_empty() {
            return Err(invalid("The cursor cannot be empty."));
        }

        if cursor.len() > MAX_CURSOR_LEN {
            return Err(invalid("The cursor is too long."));
        }

        if !cursor
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid("The cursor contains invalid characters."));
        }

        let decoded = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|_| invalid("The cursor is not valid base64."))?;

        if decoded.len() > MAX_DECODED_LEN {
            return Err(invalid("The decoded cursor is too large."));
        }

        let json = String::from_utf8(decoded)
            .map_err(|_| invalid("The cursor contains invalid UTF-8 data."))?;

        let parsed: TimelineCursor = serde_json::from_str(&json)
            .map_err(|_| invalid("The cursor has an invalid structure."))?;

        let now = Utc::now();
        if parsed.as_of > now + Duration::minutes(5) {
            return Err(invalid("The cursor timestamp is in the future."));
        }
        if parsed.as_of < now - Duration::days(365) {
            return Err(invalid("The cursor timestamp is too old."));
        }

        if !parsed.score.is_finite() {
            return Err(invalid("The cursor score is invalid."));
        }

        if parsed.id.is_nil() {
            return Err(invalid("The cursor contains an invalid ID."));
        }

        Ok(parsed)
    }
}

fn invalid(message: &str) -> ApiError {
    field_error("cursor", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn sample() -> TimelineCursor {
        let now = Utc::now();
        TimelineCursor {
            as_of: now,
            score: 87.1234,
            published_at: now - Duration::hours(3),
            id: Uuid::new_v4(),
        }
    }

    #[test]
    fn encoded_cursor_decodes_to_the_same_position() {
        let cursor = sample();
        let encoded = cursor.encode();

        assert!(!encoded.contains('+') && !encoded.contains('/') && !encoded.contains('='));
        assert_eq!(TimelineCursor::decode(&encoded).unwrap(), cursor);
    }

    #[test]
    fn garbage_is_rejected_with_422() {
        let err = TimelineCursor::decode("not a cursor!").unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.details.unwrap()["cursor"][0]
            .as_str()
            .unwrap()
            .contains("invalid characters"));
    }

    #[test]
    fn empty_and_oversized_cursors_are_rejected() {
        assert!(TimelineCursor::decode("").is_err());
        assert!(TimelineCursor::decode(&"a".repeat(1001)).is_err());
    }

    #[test]
    fn non_json_payload_is_rejected() {
        let encoded = URL_SAFE_NO_PAD.encode(b"invalid json");
        let err = TimelineCursor::decode(&encoded).unwrap_err();
        assert!(err.details.unwrap()["cursor"][0]
            .as_str()
            .unwrap()
            .contains("invalid structure"));
    }

    #[test]
    fn stale_or_future_as_of_is_rejected() {
        let mut cursor = sample();
        cursor.as_of = Utc::now() - Duration::days(400);
        assert!(TimelineCursor::decode(&cursor.encode()).is_err());

        let mut cursor = sample();
        cursor.as_of = Utc::now() + Duration::days(1);
        assert!(TimelineCursor::decode(&cursor.encode()).is_err());
    }

    #[test]
    fn nil_id_is_rejected() {
        let mut cursor = sample();
        cursor.id = Uuid::nil();
        assert!(TimelineCursor::decode(&cursor.encode()).is_err());
    }
}
