use derive_more::{Display, FromStr};
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

///
/// Timestamp
/// (in seconds)
///

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    FromStr,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const EPOCH: Self = Self(u64::MIN);

    /// Construct from seconds.
    #[must_use]
    pub const fn from_seconds(secs: u64) -> Self {
        Self(secs)
    }

    /// Construct from milliseconds (truncate to seconds).
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms / 1_000)
    }

    #[allow(clippy::cast_sign_loss)]
    pub fn parse_rfc3339(s: &str) -> Result<Self, String> {
        let dt = OffsetDateTime::parse(s, &Rfc3339)
            .map_err(|e| format!("timestamp parse error: {e}"))?;
        let ts = dt.unix_timestamp();
        if ts < 0 {
            return Err("timestamp before epoch".to_string());
        }

        Ok(Self(ts as u64))
    }

    pub fn parse_flexible(s: &str) -> Result<Self, String> {
        // Try integer seconds
        if let Ok(n) = s.parse::<u64>() {
            return Ok(Self(n));
        }

        // Try RFC3339
        Self::parse_rfc3339(s)
    }

    /// Render as RFC 3339 in UTC.
    pub fn to_rfc3339(self) -> Result<String, String> {
        let secs = i64::try_from(self.0).map_err(|_| "timestamp out of range".to_string())?;
        let dt = OffsetDateTime::from_unix_timestamp(secs)
            .map_err(|e| format!("timestamp out of range: {e}"))?;

        dt.format(&Rfc3339)
            .map_err(|e| format!("timestamp format error: {e}"))
    }

    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    /// Current wall-clock timestamp in seconds.
    pub fn now() -> Self {
        let secs = OffsetDateTime::now_utc().unix_timestamp();

        Self(secs.max(0) as u64)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

///
/// TESTS
///
