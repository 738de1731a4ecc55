// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entity model: accounts, API tokens, sessions.

pub mod account;
pub mod session;
pub mod token;

pub use account::{Account, AccountStatus};
pub use session::Session;
pub use token::{ApiToken, TokenRole, TokenStatus};

/// RFC 3339 timestamps that also accept Unix seconds on read.
///
/// Older snapshot files store epoch seconds; everything written now is
/// RFC 3339.
pub(crate) mod time_format {
    use std::fmt;

    use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // AutoSi keeps sub-second precision exact, so load(save(x)) == x.
        ser.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D>(de: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        de.deserialize_any(TimeVisitor)
    }

    pub(super) struct TimeVisitor;

    impl<'de> Visitor<'de> for TimeVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an RFC 3339 string or Unix seconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            DateTime::parse_from_rfc3339(v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(E::custom)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Utc.timestamp_opt(v, 0)
                .single()
                .ok_or_else(|| E::custom(format!("timestamp {v} out of range")))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            self.visit_i64(v as i64)
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
            self.visit_i64(v as i64)
        }
    }
}

/// Optional variant of [`time_format`].
pub(crate) mod time_format_opt {
    use std::fmt;

    use chrono::{DateTime, Utc};
    use serde::de::Visitor;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(dt: &Option<DateTime<Utc>>, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match dt {
            Some(dt) => super::time_format::serialize(dt, ser),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(de: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        de.deserialize_option(OptVisitor)
    }

    struct OptVisitor;

    impl<'de> Visitor<'de> for OptVisitor {
        type Value = Option<DateTime<Utc>>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional RFC 3339 string or Unix seconds")
        }

        fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D>(self, de: D) -> Result<Self::Value, D::Error>
        where
            D: Deserializer<'de>,
        {
            de.deserialize_any(super::time_format::TimeVisitor).map(Some)
        }
    }
}
