// ABOUTME: Tolerant readers for provider JSON: numbers as strings, naive timestamps, nested paths
// ABOUTME: Absent or unparseable fields read as None, never as zero
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use healthsync_core::constants::limits::SECONDS_PER_MINUTE;
use serde_json::Value;

/// Naive timestamp layouts seen in ROOK payloads, interpreted as UTC
const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Read-only view over a JSON object with typed, tolerant accessors
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    root: &'a Value,
}

impl<'a> FieldReader<'a> {
    /// Wrap a JSON value
    #[must_use]
    pub const fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Value at a nested object path; `null` counts as absent
    #[must_use]
    pub fn get(&self, path: &[&str]) -> Option<&'a Value> {
        path.iter()
            .try_fold(self.root, |value, key| value.get(key))
            .filter(|value| !value.is_null())
    }

    /// Reader positioned at a nested object
    #[must_use]
    pub fn child(&self, path: &[&str]) -> Option<Self> {
        self.get(path).filter(|v| v.is_object()).map(Self::new)
    }

    /// Finite number, from a JSON number or a numeric string
    #[must_use]
    pub fn float(&self, path: &[&str]) -> Option<f64> {
        self.get(path).and_then(number)
    }

    /// Non-negative integer rounded from a number, `None` when out of range
    #[must_use]
    pub fn uint<T: TryFrom<u64>>(&self, path: &[&str]) -> Option<T> {
        self.float(path).and_then(round_unsigned)
    }

    /// Duration in seconds converted to whole minutes, rounded to nearest
    #[must_use]
    pub fn minutes_from_seconds(&self, path: &[&str]) -> Option<u32> {
        self.float(path)
            .and_then(|seconds| round_unsigned(seconds / SECONDS_PER_MINUTE))
    }

    /// Timestamp, RFC 3339 or naive (assumed UTC)
    #[must_use]
    pub fn datetime(&self, path: &[&str]) -> Option<DateTime<Utc>> {
        self.get(path).and_then(Value::as_str).and_then(parse_datetime)
    }

    /// Calendar date, `YYYY-MM-DD` or the date part of a timestamp
    #[must_use]
    pub fn date(&self, path: &[&str]) -> Option<NaiveDate> {
        let raw = self.get(path).and_then(Value::as_str)?.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| parse_datetime(raw).map(|dt| dt.date_naive()))
    }

    /// Non-empty trimmed string
    #[must_use]
    pub fn text(&self, path: &[&str]) -> Option<String> {
        self.get(path)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    }

    /// Boolean, from a JSON bool or `"true"`/`"false"`
    #[must_use]
    pub fn boolean(&self, path: &[&str]) -> Option<bool> {
        match self.get(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().to_ascii_lowercase().parse().ok(),
            _ => None,
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn round_unsigned<T: TryFrom<u64>>(value: f64) -> Option<T> {
    let rounded = value.round();
    if rounded < 0.0 || rounded > u64::MAX as f64 {
        return None;
    }
    T::try_from(rounded as u64).ok()
}

/// Parse an RFC 3339 timestamp, or a naive one interpreted as UTC
#[must_use]
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
