//! Record validation and normalization.
//!
//! Turns raw upstream items into canonical [`Record`]s. Everything here is pure: the caller
//! supplies the processing time, so the same input and clock always give the same output.
//!
//! An item is dropped (never an error) when, after trimming:
//! - its natural key is empty
//! - its title is empty
//! - its natural key is shorter than [`MIN_KEY_LEN`] characters
//! - its natural key contains whitespace
//!
//! Accepted items get `source_name` forced to the owning source, whatever the payload claimed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use source_ingestor::models::raw_item::RawItem;

use crate::records::Record;

/// Minimum natural key length, in characters.
pub const MIN_KEY_LEN: usize = 3;

/// Why an item was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Missing or blank natural key.
    EmptyKey,
    /// Missing or blank title.
    EmptyTitle,
    /// Natural key shorter than [`MIN_KEY_LEN`].
    KeyTooShort,
    /// Natural key contains a whitespace character.
    KeyHasWhitespace,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Rejection::EmptyKey => "natural key is empty",
            Rejection::EmptyTitle => "title is empty",
            Rejection::KeyTooShort => "natural key is too short",
            Rejection::KeyHasWhitespace => "natural key contains whitespace",
        };
        f.write_str(msg)
    }
}

/// Tally of one [`normalize_items`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Items turned into records.
    pub accepted: usize,
    /// Dropped for [`Rejection::EmptyKey`].
    pub empty_key: usize,
    /// Dropped for [`Rejection::EmptyTitle`].
    pub empty_title: usize,
    /// Dropped for [`Rejection::KeyTooShort`].
    pub key_too_short: usize,
    /// Dropped for [`Rejection::KeyHasWhitespace`].
    pub key_whitespace: usize,
}

impl ValidationReport {
    /// Total number of dropped items.
    pub fn rejected(&self) -> usize {
        self.empty_key + self.empty_title + self.key_too_short + self.key_whitespace
    }

    fn count(&mut self, why: Rejection) {
        match why {
            Rejection::EmptyKey => self.empty_key += 1,
            Rejection::EmptyTitle => self.empty_title += 1,
            Rejection::KeyTooShort => self.key_too_short += 1,
            Rejection::KeyHasWhitespace => self.key_whitespace += 1,
        }
    }
}

fn trimmed(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Validate and normalize one item for `source`.
///
/// `now` becomes the provisional `inserted_at`/`updated_at` and stands in for a missing
/// upstream creation time.
pub fn normalize_item(raw: &RawItem, source: &str, now: DateTime<Utc>) -> Result<Record, Rejection> {
    let key = raw.id.as_deref().map(str::trim).unwrap_or_default();
    let title = raw.title.as_deref().map(str::trim).unwrap_or_default();

    if key.is_empty() {
        return Err(Rejection::EmptyKey);
    }
    if title.is_empty() {
        return Err(Rejection::EmptyTitle);
    }
    if key.chars().count() < MIN_KEY_LEN {
        return Err(Rejection::KeyTooShort);
    }
    if key.chars().any(char::is_whitespace) {
        return Err(Rejection::KeyHasWhitespace);
    }

    Ok(Record {
        natural_key: key.to_string(),
        title: title.to_string(),
        body: trimmed(raw.body.as_deref()),
        author: trimmed(raw.author.as_deref()),
        url: trimmed(raw.url.as_deref()),
        flair: trimmed(raw.flair.as_deref()),
        score: raw.score.unwrap_or_default(),
        source_name: source.to_string(),
        origin_created_at: raw.created_at.unwrap_or(now),
        inserted_at: now,
        updated_at: now,
    })
}

/// Normalize a fetched batch, dropping invalid items and counting why.
pub fn normalize_items(
    items: &[RawItem],
    source: &str,
    now: DateTime<Utc>,
) -> (Vec<Record>, ValidationReport) {
    let mut report = ValidationReport::default();
    let mut out = Vec::with_capacity(items.len());

    for item in items {
        match normalize_item(item, source, now) {
            Ok(rec) => {
                report.accepted += 1;
                out.push(rec);
            }
            Err(why) => report.count(why),
        }
    }
    (out, report)
}
