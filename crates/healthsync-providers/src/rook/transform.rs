// ABOUTME: Converts ROOK payloads into canonical sleep, physical, body, and activity event records
// ABOUTME: Extracts only reported fields and converts provider units at this boundary
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! ROOK to canonical record converters
//!
//! Each `data_structure` has one converter reading from its nested location
//! (for example `sleep_health.summary.sleep_summary`). Converters never
//! default a metric: a heart rate of zero and an unreported heart rate are
//! different things downstream.

use super::constants::{
    ACTIVITY_EVENT_PATH, AUTHORIZATION_STATUS, AUTHORIZED, BODY_SUMMARY_PATH, DATETIME_STRING,
    METADATA, PHYSICAL_SUMMARY_PATH, SLEEP_SUMMARY_PATH, TIMESTAMP,
};
use super::fields::FieldReader;
use chrono::{DateTime, Utc};
use healthsync_core::models::{
    ActivityEvent, BodyRecord, CanonicalRecord, ConnectionAction, ConnectionUpdate, DataStructure,
    PhysicalRecord, SleepRecord,
};
use serde_json::Value;
use tracing::debug;

/// Converter utilities for ROOK payloads
pub struct RookTransformer;

impl RookTransformer {
    /// Transform a payload by its `data_structure` tag.
    ///
    /// Returns `None` for unknown tags, for notification payloads, and when
    /// the recognised structure carries no metric at all.
    #[must_use]
    pub fn transform(data_structure: &str, payload: &Value) -> Option<CanonicalRecord> {
        let Some(structure) = DataStructure::parse(data_structure) else {
            debug!(data_structure, "Unknown ROOK data structure, nothing to transform");
            return None;
        };
        Self::transform_structure(structure, payload)
    }

    /// Transform a payload of a recognised structure
    #[must_use]
    pub fn transform_structure(
        structure: DataStructure,
        payload: &Value,
    ) -> Option<CanonicalRecord> {
        let root = FieldReader::new(payload);
        let record = match structure {
            DataStructure::SleepSummary => {
                CanonicalRecord::Sleep(Self::sleep(&root.child(&SLEEP_SUMMARY_PATH)?))
            }
            DataStructure::PhysicalSummary => {
                CanonicalRecord::Physical(Self::physical(&root.child(&PHYSICAL_SUMMARY_PATH)?))
            }
            DataStructure::BodySummary => {
                CanonicalRecord::Body(Self::body(&root.child(&BODY_SUMMARY_PATH)?))
            }
            DataStructure::ActivityEvent => {
                CanonicalRecord::ActivityEvents(Self::activity_events(payload))
            }
            DataStructure::ConnectionUpdate => return None,
        };

        if record.is_empty() {
            debug!(data_structure = %structure, "ROOK payload carried no extractable data");
            return None;
        }
        Some(record)
    }

    fn last_updated(summary: &FieldReader<'_>) -> Option<DateTime<Utc>> {
        summary.datetime(&[METADATA, DATETIME_STRING])
    }

    /// Convert `sleep_health.summary.sleep_summary`
    #[must_use]
    pub fn sleep(summary: &FieldReader<'_>) -> SleepRecord {
        SleepRecord {
            sleep_start: summary.datetime(&["duration", "sleep_start_datetime_string"]),
            sleep_end: summary.datetime(&["duration", "sleep_end_datetime_string"]),
            sleep_date: summary.date(&["duration", "sleep_date_string"]),
            duration_minutes: summary
                .minutes_from_seconds(&["duration", "sleep_duration_seconds_int"]),
            time_in_bed_minutes: summary
                .minutes_from_seconds(&["duration", "time_in_bed_seconds_int"]),
            light_sleep_minutes: summary
                .minutes_from_seconds(&["duration", "light_sleep_duration_seconds_int"]),
            deep_sleep_minutes: summary
                .minutes_from_seconds(&["duration", "deep_sleep_duration_seconds_int"]),
            rem_sleep_minutes: summary
                .minutes_from_seconds(&["duration", "rem_sleep_duration_seconds_int"]),
            awake_minutes: summary
                .minutes_from_seconds(&["duration", "time_awake_during_sleep_seconds_int"]),
            time_to_fall_asleep_minutes: summary
                .minutes_from_seconds(&["duration", "time_to_fall_asleep_seconds_int"]),
            efficiency_score: summary.uint(&["scores", "sleep_efficiency_1_100_score_int"]),
            quality_score: summary.uint(&["scores", "sleep_quality_rating_1_5_score_int"]),
            hr_min_bpm: summary.uint(&["heart_rate", "hr_minimum_bpm_int"]),
            hr_max_bpm: summary.uint(&["heart_rate", "hr_maximum_bpm_int"]),
            hr_avg_bpm: summary.uint(&["heart_rate", "hr_avg_bpm_int"]),
            hr_resting_bpm: summary.uint(&["heart_rate", "hr_resting_bpm_int"]),
            hrv_avg_rmssd: summary.float(&["heart_rate", "hrv_avg_rmssd_float"]),
            breaths_avg_per_min: summary.float(&["breathing", "breaths_avg_per_min_int"]),
            saturation_avg_percentage: summary
                .float(&["breathing", "saturation_avg_percentage_int"]),
            temperature_delta_celsius: summary
                .float(&["temperature", "temperature_delta_celsius_float"]),
            last_updated: Self::last_updated(summary),
        }
    }

    /// Convert `physical_health.summary.physical_summary`
    #[must_use]
    pub fn physical(summary: &FieldReader<'_>) -> PhysicalRecord {
        PhysicalRecord {
            steps: summary.uint(&["distance", "steps_int"]),
            active_steps: summary.uint(&["distance", "active_steps_int"]),
            distance_meters: summary.float(&["distance", "traveled_distance_meters_float"]),
            floors_climbed: summary.uint(&["distance", "floors_climbed_float"]),
            calories_expenditure_kcal: summary
                .float(&["calories", "calories_expenditure_kcal_float"]),
            calories_active_kcal: summary.float(&["calories", "calories_net_active_kcal_float"]),
            active_minutes: summary.minutes_from_seconds(&["activity", "active_seconds_int"]),
            sedentary_minutes: summary.minutes_from_seconds(&["activity", "sedentary_seconds_int"]),
            hr_min_bpm: summary.uint(&["heart_rate", "hr_minimum_bpm_int"]),
            hr_max_bpm: summary.uint(&["heart_rate", "hr_maximum_bpm_int"]),
            hr_avg_bpm: summary.uint(&["heart_rate", "hr_avg_bpm_int"]),
            hr_resting_bpm: summary.uint(&["heart_rate", "hr_resting_bpm_int"]),
            saturation_avg_percentage: summary
                .float(&["oxygenation", "saturation_avg_percentage_int"]),
            stress_avg_level: summary.uint(&["stress", "stress_avg_level_int"]),
            last_updated: Self::last_updated(summary),
        }
    }

    /// Convert `body_health.summary.body_summary`
    #[must_use]
    pub fn body(summary: &FieldReader<'_>) -> BodyRecord {
        BodyRecord {
            weight_kg: summary.float(&["body_metrics", "weight_kg_float"]),
            height_cm: summary.float(&["body_metrics", "height_cm_int"]),
            bmi: summary.float(&["body_metrics", "bmi_float"]),
            body_fat_percentage: summary.float(&["body_metrics", "body_fat_percentage_float"]),
            muscle_mass_kg: summary.float(&["body_metrics", "muscle_mass_kg_float"]),
            blood_pressure_systolic_mmhg: summary.uint(&[
                "blood_pressure",
                "blood_pressure_avg_object",
                "systolic_mmHg_int",
            ]),
            blood_pressure_diastolic_mmhg: summary.uint(&[
                "blood_pressure",
                "blood_pressure_avg_object",
                "diastolic_mmHg_int",
            ]),
            blood_glucose_avg_mg_per_dl: summary
                .float(&["blood_glucose", "blood_glucose_avg_mg_per_dL_int"]),
            hr_resting_bpm: summary.uint(&["heart_rate", "hr_resting_bpm_int"]),
            saturation_avg_percentage: summary
                .float(&["oxygenation", "saturation_avg_percentage_int"]),
            temperature_avg_celsius: summary.float(&[
                "temperature",
                "temperature_avg_object",
                "temperature_celsius_float",
            ]),
            last_updated: Self::last_updated(summary),
        }
    }

    /// Convert `physical_health.events.activity_event[]`; events without a
    /// start time are skipped
    #[must_use]
    pub fn activity_events(payload: &Value) -> Vec<ActivityEvent> {
        let Some(events) = FieldReader::new(payload)
            .get(&ACTIVITY_EVENT_PATH)
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        events
            .iter()
            .filter_map(|event| {
                let converted = Self::activity_event(&FieldReader::new(event));
                if converted.is_none() {
                    debug!("Skipping ROOK activity event without a start time");
                }
                converted
            })
            .collect()
    }

    fn activity_event(event: &FieldReader<'_>) -> Option<ActivityEvent> {
        Some(ActivityEvent {
            start_time: event.datetime(&["activity", "activity_start_datetime_string"])?,
            end_time: event.datetime(&["activity", "activity_end_datetime_string"]),
            activity_type: event
                .text(&["activity", "activity_type_name_string"])
                .map(|name| name.to_lowercase()),
            duration_minutes: event
                .minutes_from_seconds(&["activity", "activity_duration_seconds_int"]),
            calories_kcal: event.float(&["calories", "calories_expenditure_kcal_float"]),
            distance_meters: event.float(&["distance", "traveled_distance_meters_float"]),
            steps: event.uint(&["distance", "steps_int"]),
            hr_avg_bpm: event.uint(&["heart_rate", "hr_avg_bpm_int"]),
            hr_max_bpm: event.uint(&["heart_rate", "hr_maximum_bpm_int"]),
            last_updated: Self::last_updated(event),
        })
    }

    /// Read a connect/revoke notification.
    ///
    /// `fallback_at` (the ingress time) is used when the notification has no
    /// usable timestamp. Returns `None` when the authorization flag is absent.
    #[must_use]
    pub fn connection_update(
        payload: &Value,
        fallback_at: DateTime<Utc>,
    ) -> Option<ConnectionUpdate> {
        let fields = FieldReader::new(payload);
        let authorized = fields
            .boolean(&[AUTHORIZED])
            .or_else(|| fields.boolean(&[AUTHORIZATION_STATUS]))?;
        let at = fields
            .datetime(&[TIMESTAMP])
            .or_else(|| fields.datetime(&[METADATA, DATETIME_STRING]))
            .unwrap_or(fallback_at);

        Some(ConnectionUpdate {
            action: if authorized {
                ConnectionAction::Connected
            } else {
                ConnectionAction::Revoked
            },
            at,
        })
    }
}
