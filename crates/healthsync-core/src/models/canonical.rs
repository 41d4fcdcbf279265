// ABOUTME: Canonical, provider-agnostic health records for sleep, physical, body, and events
// ABOUTME: Every metric is optional because "not reported" differs from zero
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health data category stored per (user, device)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCategory {
    /// Nightly sleep summary
    Sleep,
    /// Daily physical activity summary
    Physical,
    /// Body composition and vitals
    Body,
    /// Discrete workouts, most recent first
    ActivityEvents,
}

impl HealthCategory {
    /// All categories in document order
    pub const ALL: [Self; 4] = [Self::Sleep, Self::Physical, Self::Body, Self::ActivityEvents];

    /// Key of this category inside a device's `data` sub-document
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sleep => "sleep",
            Self::Physical => "physical",
            Self::Body => "body",
            Self::ActivityEvents => "activity_events",
        }
    }
}

impl fmt::Display for HealthCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour shared by the summary categories (sleep, physical, body)
pub trait SummaryRecord: Clone + PartialEq + Default {
    /// Provider timestamp of the data this record was built from
    fn last_updated(&self) -> Option<DateTime<Utc>>;

    /// Field-by-field `self.field.or(existing.field)`
    #[must_use]
    fn coalesce(self, existing: &Self) -> Self;

    /// True when no metric is present (`last_updated` alone does not count)
    fn is_empty(&self) -> bool;
}

macro_rules! impl_summary_record {
    ($record:ty { $($field:ident),+ $(,)? }) => {
        impl SummaryRecord for $record {
            fn last_updated(&self) -> Option<DateTime<Utc>> {
                self.last_updated
            }

            fn coalesce(self, existing: &Self) -> Self {
                Self {
                    $($field: self.$field.or(existing.$field),)+
                    last_updated: self.last_updated.or(existing.last_updated),
                }
            }

            fn is_empty(&self) -> bool {
                $(self.$field.is_none())&&+
            }
        }
    };
}

/// Canonical sleep summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    /// When the user fell asleep
    pub sleep_start: Option<DateTime<Utc>>,
    /// When the user woke up
    pub sleep_end: Option<DateTime<Utc>>,
    /// Calendar date the sleep is attributed to
    pub sleep_date: Option<NaiveDate>,
    /// Total time asleep
    pub duration_minutes: Option<u32>,
    /// Total time in bed
    pub time_in_bed_minutes: Option<u32>,
    /// Light sleep stage duration
    pub light_sleep_minutes: Option<u32>,
    /// Deep sleep stage duration
    pub deep_sleep_minutes: Option<u32>,
    /// REM sleep stage duration
    pub rem_sleep_minutes: Option<u32>,
    /// Time awake between sleep start and end
    pub awake_minutes: Option<u32>,
    /// Sleep latency
    pub time_to_fall_asleep_minutes: Option<u32>,
    /// Sleep efficiency score (1-100)
    pub efficiency_score: Option<u8>,
    /// Sleep quality rating (1-5)
    pub quality_score: Option<u8>,
    /// Minimum heart rate during sleep
    pub hr_min_bpm: Option<u16>,
    /// Maximum heart rate during sleep
    pub hr_max_bpm: Option<u16>,
    /// Average heart rate during sleep
    pub hr_avg_bpm: Option<u16>,
    /// Resting heart rate
    pub hr_resting_bpm: Option<u16>,
    /// Average HRV (RMSSD, milliseconds)
    pub hrv_avg_rmssd: Option<f64>,
    /// Average breathing rate
    pub breaths_avg_per_min: Option<f64>,
    /// Average blood oxygen saturation
    pub saturation_avg_percentage: Option<f64>,
    /// Skin temperature deviation from baseline
    pub temperature_delta_celsius: Option<f64>,
    /// Provider timestamp used for recency ordering
    pub last_updated: Option<DateTime<Utc>>,
}

impl_summary_record!(SleepRecord {
    sleep_start,
    sleep_end,
    sleep_date,
    duration_minutes,
    time_in_bed_minutes,
    light_sleep_minutes,
    deep_sleep_minutes,
    rem_sleep_minutes,
    awake_minutes,
    time_to_fall_asleep_minutes,
    efficiency_score,
    quality_score,
    hr_min_bpm,
    hr_max_bpm,
    hr_avg_bpm,
    hr_resting_bpm,
    hrv_avg_rmssd,
    breaths_avg_per_min,
    saturation_avg_percentage,
    temperature_delta_celsius,
});

/// Canonical daily physical activity summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalRecord {
    /// Total steps
    pub steps: Option<u32>,
    /// Steps taken while active
    pub active_steps: Option<u32>,
    /// Distance travelled
    pub distance_meters: Option<f64>,
    /// Floors climbed
    pub floors_climbed: Option<u32>,
    /// Total energy expenditure
    pub calories_expenditure_kcal: Option<f64>,
    /// Active (net) energy expenditure
    pub calories_active_kcal: Option<f64>,
    /// Time spent active
    pub active_minutes: Option<u32>,
    /// Time spent sedentary
    pub sedentary_minutes: Option<u32>,
    /// Minimum heart rate
    pub hr_min_bpm: Option<u16>,
    /// Maximum heart rate
    pub hr_max_bpm: Option<u16>,
    /// Average heart rate
    pub hr_avg_bpm: Option<u16>,
    /// Resting heart rate
    pub hr_resting_bpm: Option<u16>,
    /// Average blood oxygen saturation
    pub saturation_avg_percentage: Option<f64>,
    /// Average stress level (0-100)
    pub stress_avg_level: Option<u8>,
    /// Provider timestamp used for recency ordering
    pub last_updated: Option<DateTime<Utc>>,
}

impl_summary_record!(PhysicalRecord {
    steps,
    active_steps,
    distance_meters,
    floors_climbed,
    calories_expenditure_kcal,
    calories_active_kcal,
    active_minutes,
    sedentary_minutes,
    hr_min_bpm,
    hr_max_bpm,
    hr_avg_bpm,
    hr_resting_bpm,
    saturation_avg_percentage,
    stress_avg_level,
});

/// Canonical body composition and vitals summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyRecord {
    /// Body weight
    pub weight_kg: Option<f64>,
    /// Height
    pub height_cm: Option<f64>,
    /// Body mass index
    pub bmi: Option<f64>,
    /// Body fat percentage
    pub body_fat_percentage: Option<f64>,
    /// Muscle mass
    pub muscle_mass_kg: Option<f64>,
    /// Average systolic blood pressure
    pub blood_pressure_systolic_mmhg: Option<u16>,
    /// Average diastolic blood pressure
    pub blood_pressure_diastolic_mmhg: Option<u16>,
    /// Average blood glucose
    pub blood_glucose_avg_mg_per_dl: Option<f64>,
    /// Resting heart rate
    pub hr_resting_bpm: Option<u16>,
    /// Average blood oxygen saturation
    pub saturation_avg_percentage: Option<f64>,
    /// Average body temperature
    pub temperature_avg_celsius: Option<f64>,
    /// Provider timestamp used for recency ordering
    pub last_updated: Option<DateTime<Utc>>,
}

impl_summary_record!(BodyRecord {
    weight_kg,
    height_cm,
    bmi,
    body_fat_percentage,
    muscle_mass_kg,
    blood_pressure_systolic_mmhg,
    blood_pressure_diastolic_mmhg,
    blood_glucose_avg_mg_per_dl,
    hr_resting_bpm,
    saturation_avg_percentage,
    temperature_avg_celsius,
});

/// A single workout or activity session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Session start; also the deduplication key
    pub start_time: DateTime<Utc>,
    /// Session end
    pub end_time: Option<DateTime<Utc>>,
    /// Provider activity label, lowercased (e.g. "running")
    pub activity_type: Option<String>,
    /// Session duration
    pub duration_minutes: Option<u32>,
    /// Energy expenditure
    pub calories_kcal: Option<f64>,
    /// Distance travelled
    pub distance_meters: Option<f64>,
    /// Steps during the session
    pub steps: Option<u32>,
    /// Average heart rate
    pub hr_avg_bpm: Option<u16>,
    /// Maximum heart rate
    pub hr_max_bpm: Option<u16>,
    /// Provider timestamp of the event document
    pub last_updated: Option<DateTime<Utc>>,
}

impl ActivityEvent {
    /// Field-by-field `self.field.or(existing.field)` for two reports of the same session
    #[must_use]
    pub fn coalesce(self, existing: &Self) -> Self {
        Self {
            start_time: self.start_time,
            end_time: self.end_time.or(existing.end_time),
            activity_type: self
                .activity_type
                .or_else(|| existing.activity_type.clone()),
            duration_minutes: self.duration_minutes.or(existing.duration_minutes),
            calories_kcal: self.calories_kcal.or(existing.calories_kcal),
            distance_meters: self.distance_meters.or(existing.distance_meters),
            steps: self.steps.or(existing.steps),
            hr_avg_bpm: self.hr_avg_bpm.or(existing.hr_avg_bpm),
            hr_max_bpm: self.hr_max_bpm.or(existing.hr_max_bpm),
            last_updated: self.last_updated.or(existing.last_updated),
        }
    }
}

/// A canonical record fragment for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "data", rename_all = "snake_case")]
pub enum CanonicalRecord {
    /// Sleep summary
    Sleep(SleepRecord),
    /// Physical summary
    Physical(PhysicalRecord),
    /// Body summary
    Body(BodyRecord),
    /// Activity events
    ActivityEvents(Vec<ActivityEvent>),
}

impl CanonicalRecord {
    /// Category this record belongs to
    #[must_use]
    pub const fn category(&self) -> HealthCategory {
        match self {
            Self::Sleep(_) => HealthCategory::Sleep,
            Self::Physical(_) => HealthCategory::Physical,
            Self::Body(_) => HealthCategory::Body,
            Self::ActivityEvents(_) => HealthCategory::ActivityEvents,
        }
    }

    /// True when the record carries no metric at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Sleep(record) => record.is_empty(),
            Self::Physical(record) => record.is_empty(),
            Self::Body(record) => record.is_empty(),
            Self::ActivityEvents(events) => events.is_empty(),
        }
    }

    /// The category payload as stored under `data.<category>`
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_category_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::Sleep(record) => serde_json::to_value(record),
            Self::Physical(record) => serde_json::to_value(record),
            Self::Body(record) => serde_json::to_value(record),
            Self::ActivityEvents(events) => serde_json::to_value(events),
        }
    }

    /// Rebuild a record from a stored `data.<category>` value
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value does not match the category shape
    pub fn from_category_value(
        category: HealthCategory,
        value: serde_json::Value,
    ) -> serde_json::Result<Self> {
        Ok(match category {
            HealthCategory::Sleep => Self::Sleep(serde_json::from_value(value)?),
            HealthCategory::Physical => Self::Physical(serde_json::from_value(value)?),
            HealthCategory::Body => Self::Body(serde_json::from_value(value)?),
            HealthCategory::ActivityEvents => {
                Self::ActivityEvents(serde_json::from_value(value)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coalesce_prefers_self() {
        let incoming = SleepRecord {
            duration_minutes: Some(420),
            ..Default::default()
        };
        let existing = SleepRecord {
            duration_minutes: Some(480),
            hr_resting_bpm: Some(52),
            ..Default::default()
        };

        let merged = incoming.coalesce(&existing);
        assert_eq!(merged.duration_minutes, Some(420));
        assert_eq!(merged.hr_resting_bpm, Some(52));
    }

    #[test]
    fn test_last_updated_alone_is_empty() {
        let record = BodyRecord {
            last_updated: Some(Utc::now()),
            ..Default::default()
        };
        assert!(record.is_empty());
        assert!(!BodyRecord {
            weight_kg: Some(70.5),
            ..Default::default()
        }
        .is_empty());
    }

    #[test]
    fn test_category_value_round_trip_keeps_category() {
        let record = CanonicalRecord::Physical(PhysicalRecord {
            steps: Some(9000),
            ..Default::default()
        });
        let value = record.to_category_value().unwrap_or_default();
        let restored = CanonicalRecord::from_category_value(HealthCategory::Physical, value).ok();
        assert_eq!(restored, Some(record));
    }
}
