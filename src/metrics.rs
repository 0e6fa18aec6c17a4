//! Pipeline health metrics
//!
//! Turns the raw aggregates returned by the warehouse into API payloads.

use crate::models::{LoadSummaryCounts, QualityCounts};
use serde::Serialize;

/// `GET /api/metrics/summary` payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_pipelines: i64,
    pub successful_pipelines: i64,
    pub total_records: i64,
    pub avg_duration_minutes: f64,
    pub success_rate: f64,
}

impl From<LoadSummaryCounts> for MetricsSummary {
    fn from(counts: LoadSummaryCounts) -> Self {
        Self {
            total_pipelines: counts.total,
            successful_pipelines: counts.successful,
            total_records: counts.total_records,
            avg_duration_minutes: round2(counts.avg_duration_minutes),
            success_rate: success_rate(counts.successful, counts.total),
        }
    }
}

/// `GET /api/data-quality/score` payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityScore {
    pub quality_score: f64,
    pub total_checks: i64,
    pub passed_checks: i64,
    pub failed_checks: i64,
}

impl From<QualityCounts> for QualityScore {
    fn from(counts: QualityCounts) -> Self {
        Self {
            quality_score: quality_score(counts.passed, counts.total),
            total_checks: counts.total,
            passed_checks: counts.passed,
            failed_checks: counts.total - counts.passed,
        }
    }
}

/// Percentage of successful loads; no loads means 0.
pub fn success_rate(successful: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(successful as f64 / total as f64 * 100.0)
}

/// Percentage of passed checks; no checks is a vacuous pass of 100.
pub fn quality_score(passed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 100.0;
    }
    round2(passed as f64 / total as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
