//! # Relative Time
//!
//! Turns a message timestamp into "5 min ago" style labels. Pure: the caller
//! passes `now`, so rendering and tests agree on the clock.
//!
//! ```text
//! elapsed < 60 s      → just now
//! elapsed < 60 min    → N min ago
//! elapsed < 24 h      → N h ago
//! elapsed < 7 d       → N d ago
//! otherwise           → 3 Mar
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Display language for relative timestamps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl Locale {
    /// Parses a config/env value such as `"fr"` or `"fr-FR"`.
    pub fn parse(value: &str) -> Option<Self> {
        let lang = value.trim().to_ascii_lowercase();
        match lang.split(['-', '_']).next() {
            Some("en") => Some(Locale::En),
            Some("fr") => Some(Locale::Fr),
            _ => None,
        }
    }
}

/// Bucket a relative label falls into. Ordering follows elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Bucket {
    JustNow,
    Minutes(i64),
    Hours(i64),
    Days(i64),
    Date,
}

/// Classifies the whole seconds elapsed between `then` and `now`.
/// Timestamps in the future count as "just now".
pub fn bucket(then: DateTime<Utc>, now: DateTime<Utc>) -> Bucket {
    let seconds = now.signed_duration_since(then).num_seconds();
    if seconds < MINUTE {
        Bucket::JustNow
    } else if seconds < HOUR {
        Bucket::Minutes(seconds / MINUTE)
    } else if seconds < DAY {
        Bucket::Hours(seconds / HOUR)
    } else if seconds < WEEK {
        Bucket::Days(seconds / DAY)
    } else {
        Bucket::Date
    }
}

/// Human label for `then` as seen at `now`.
pub fn format_relative(then: DateTime<Utc>, now: DateTime<Utc>, locale: Locale) -> String {
    match (bucket(then, now), locale) {
        (Bucket::JustNow, Locale::En) => "just now".to_string(),
        (Bucket::JustNow, Locale::Fr) => "à l'instant".to_string(),
        (Bucket::Minutes(n), Locale::En) => format!("{n} min ago"),
        (Bucket::Minutes(n), Locale::Fr) => format!("il y a {n} min"),
        (Bucket::Hours(n), Locale::En) => format!("{n} h ago"),
        (Bucket::Hours(n), Locale::Fr) => format!("il y a {n}h"),
        (Bucket::Days(n), Locale::En) => format!("{n} d ago"),
        (Bucket::Days(n), Locale::Fr) => format!("il y a {n}j"),
        (Bucket::Date, Locale::En) => then.format("%-d %b").to_string(),
        (Bucket::Date, Locale::Fr) => then
            .format_localized("%-d %b", chrono::Locale::fr_FR)
            .to_string(),
    }
}
