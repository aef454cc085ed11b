//! Serde helpers for optional RFC 3339 timestamps.
//!
//! Use with `#[serde(default, with = "crate::utils::time")]` on an
//! `Option<OffsetDateTime>` field. Missing and `null` values both read as `None`.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Deserialize an optional RFC 3339 formatted string into an `OffsetDateTime`.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(s) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    OffsetDateTime::parse(&s, &Rfc3339)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Serialize an optional `OffsetDateTime` as an RFC 3339 formatted string.
pub fn serialize<S>(datetime: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match datetime {
        Some(datetime) => {
            let s = datetime
                .format(&Rfc3339)
                .map_err(serde::ser::Error::custom)?;
            serializer.serialize_str(&s)
        }
        None => serializer.serialize_none(),
    }
}
