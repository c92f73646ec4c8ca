// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-detector configuration. One [`DetectionSettings`] bundle is
//! assembled per event and passed by reference to the driver; detectors
//! never mutate it. Every struct deserializes with defaults so a
//! missing or unknown key degrades to the default rather than failing.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsecutiveDbSettings {
    pub detection_enabled: bool,
    pub consecutive_count_threshold: usize,
    /// Every independent query must be at least this slow on its own.
    pub span_duration_threshold_ms: f64,
    pub min_time_saved_ms: f64,
    /// `time_saved / total_run_duration` floor.
    pub time_saved_ratio: f64,
    pub allowed_span_ops: Vec<String>,
}

impl Default for ConsecutiveDbSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            consecutive_count_threshold: 2,
            span_duration_threshold_ms: 30.0,
            min_time_saved_ms: 100.0,
            time_saved_ratio: 0.1,
            allowed_span_ops: vec!["db".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsecutiveHttpSettings {
    pub detection_enabled: bool,
    pub consecutive_count_threshold: usize,
    pub span_duration_threshold_ms: f64,
    /// Idle gap allowed between two members of a run.
    pub max_duration_between_spans_ms: f64,
    pub min_time_saved_ms: f64,
    pub allowed_span_ops: Vec<String>,
}

impl Default for ConsecutiveHttpSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            consecutive_count_threshold: 3,
            span_duration_threshold_ms: 500.0,
            max_duration_between_spans_ms: 1000.0,
            min_time_saved_ms: 2000.0,
            allowed_span_ops: vec!["http.client".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NPlusOneDbSettings {
    pub detection_enabled: bool,
    /// Minimum number of repeated queries.
    pub count: usize,
    /// Minimum summed duration of the repeats.
    pub duration_threshold_ms: f64,
}

impl Default for NPlusOneDbSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            count: 5,
            duration_threshold_ms: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MNPlusOneDbSettings {
    pub detection_enabled: bool,
    /// Sliding-window capacity while searching, and therefore the
    /// longest recognizable pattern.
    pub max_sequence_length: usize,
    pub minimum_occurrences_of_pattern: usize,
    /// Minimum summed duration of the DB spans among the offenders.
    pub total_duration_threshold_ms: f64,
}

impl Default for MNPlusOneDbSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            max_sequence_length: 10,
            minimum_occurrences_of_pattern: 3,
            total_duration_threshold_ms: 100.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NPlusOneApiCallsSettings {
    pub detection_enabled: bool,
    pub count: usize,
    pub span_duration_threshold_ms: f64,
    /// Two spans are concurrent when their starts differ by at most
    /// this much.
    pub concurrency_threshold_ms: f64,
    pub allowed_span_ops: Vec<String>,
}

impl Default for NPlusOneApiCallsSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            count: 10,
            span_duration_threshold_ms: 50.0,
            concurrency_threshold_ms: 5.0,
            allowed_span_ops: vec!["http.client".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlowDbQuerySettings {
    pub detection_enabled: bool,
    pub duration_threshold_ms: f64,
    pub allowed_span_ops: Vec<String>,
}

impl Default for SlowDbQuerySettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            duration_threshold_ms: 1000.0,
            allowed_span_ops: vec!["db".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LargeHttpPayloadSettings {
    pub detection_enabled: bool,
    pub payload_size_threshold_bytes: f64,
}

impl Default for LargeHttpPayloadSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            payload_size_threshold_bytes: 300_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UncompressedAssetSettings {
    pub detection_enabled: bool,
    pub size_threshold_bytes: f64,
    pub duration_threshold_ms: f64,
    pub allowed_span_ops: Vec<String>,
}

impl Default for UncompressedAssetSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            size_threshold_bytes: 512_000.0,
            duration_threshold_ms: 300.0,
            allowed_span_ops: vec![
                "resource.script".to_string(),
                "resource.css".to_string(),
                "resource.link".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderBlockingAssetSettings {
    pub detection_enabled: bool,
    /// FCP must fall inside `[minimum, maximum]` for the event to be
    /// considered at all.
    pub fcp_minimum_threshold_ms: f64,
    pub fcp_maximum_threshold_ms: f64,
    /// The asset must account for at least this share of FCP.
    pub fcp_ratio_threshold: f64,
    pub minimum_size_bytes: f64,
}

impl Default for RenderBlockingAssetSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            fcp_minimum_threshold_ms: 2000.0,
            fcp_maximum_threshold_ms: 10_000.0,
            fcp_ratio_threshold: 0.33,
            minimum_size_bytes: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MainThreadIoSettings {
    pub detection_enabled: bool,
    /// One UI frame at 60fps.
    pub duration_threshold_ms: f64,
}

impl Default for MainThreadIoSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            duration_threshold_ms: 16.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpOverheadSettings {
    pub detection_enabled: bool,
    pub http_request_delay_threshold_ms: f64,
}

impl Default for HttpOverheadSettings {
    fn default() -> Self {
        Self {
            detection_enabled: true,
            http_request_delay_threshold_ms: 500.0,
        }
    }
}

/// The full settings bundle for one detection pass.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub consecutive_db: ConsecutiveDbSettings,
    pub consecutive_http: ConsecutiveHttpSettings,
    pub n_plus_one_db: NPlusOneDbSettings,
    /// Broader-compatibility shadow of `n_plus_one_db`; metrics-only,
    /// its findings never surface to users.
    pub n_plus_one_db_extended: NPlusOneDbSettings,
    pub mn_plus_one_db: MNPlusOneDbSettings,
    pub n_plus_one_api_calls: NPlusOneApiCallsSettings,
    pub slow_db_query: SlowDbQuerySettings,
    pub large_http_payload: LargeHttpPayloadSettings,
    pub uncompressed_asset: UncompressedAssetSettings,
    pub render_blocking_asset: RenderBlockingAssetSettings,
    pub file_io_main_thread: MainThreadIoSettings,
    pub db_main_thread: MainThreadIoSettings,
    pub http_overhead: HttpOverheadSettings,
}

impl DetectionSettings {
    /// Parse a settings bundle from JSON supplied by the configuration
    /// store. Unknown keys are ignored, missing keys take defaults.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = DetectionSettings::default();
        assert!(settings.n_plus_one_db.detection_enabled);
        assert_eq!(settings.n_plus_one_db.count, 5);
        assert_eq!(settings.http_overhead.http_request_delay_threshold_ms, 500.0);
        assert_eq!(settings.file_io_main_thread.duration_threshold_ms, 16.0);
    }

    #[test]
    fn test_partial_json_degrades_to_defaults() {
        let settings = DetectionSettings::from_json(
            r#"{"n_plus_one_db": {"count": 3}, "unknown_detector": {"x": 1}}"#,
        )
        .unwrap();
        assert_eq!(settings.n_plus_one_db.count, 3);
        // untouched keys keep their defaults
        assert_eq!(settings.n_plus_one_db.duration_threshold_ms, 100.0);
        assert_eq!(settings.consecutive_http.consecutive_count_threshold, 3);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(DetectionSettings::from_json("not json").is_err());
    }
}
