use std::collections::HashMap;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::core::time::to_primitive_utc;

pub(crate) mod access;
pub(crate) mod attempt;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) docs_url: String,
}

fn parse_datetime_flexible(raw: &str) -> Option<PrimitiveDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(to_primitive_utc(value));
    }

    // datetime-local inputs arrive without an offset; treat them as UTC.
    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value);
    }
    PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )
    .ok()
}

/// Optional timestamp in RFC 3339 (or offset-less local form), normalized to UTC.
pub(crate) fn deserialize_option_datetime<'de, D>(
    deserializer: D,
) -> Result<Option<PrimitiveDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_datetime_flexible(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
            .map(Some),
        None => Ok(None),
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn flexible_datetimes_normalize_to_utc() {
        assert_eq!(
            parse_datetime_flexible("2026-03-02T13:00:00+03:00"),
            Some(datetime!(2026-03-02 10:00:00))
        );
        assert_eq!(parse_datetime_flexible("2026-03-02T10:00"), Some(datetime!(2026-03-02 10:00:00)));
        assert_eq!(
            parse_datetime_flexible("2026-03-02T10:00:30"),
            Some(datetime!(2026-03-02 10:00:30))
        );
        assert_eq!(parse_datetime_flexible("tomorrow"), None);
    }
}
