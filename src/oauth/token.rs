//! Usage: Access token record (validity rules + on-disk JSON shape).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "empty_as_none"
    )]
    pub refresh_token: Option<String>,
    /// `None` means the provider gave no expiry; such a token never goes stale on its own.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "expiry_format")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Token {
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.trim().is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry > now,
            None => true,
        }
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|v| !v.trim().is_empty()))
}

mod expiry_format {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(expiry) => {
                serializer.serialize_str(&expiry.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        let parsed = DateTime::parse_from_rfc3339(raw.trim())
            .map_err(serde::de::Error::custom)?
            .with_timezone(&Utc);
        // Other writers of this file format store "no expiry" as 0001-01-01T00:00:00Z.
        if parsed.year() <= 1 {
            return Ok(None);
        }
        Ok(Some(parsed))
    }
}
