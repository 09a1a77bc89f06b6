use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct TechnicianRow {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct CriterionRow {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub target_pass_rate: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TranscriptRow {
    pub id: Uuid,
    pub technician_id: Option<Uuid>,
    pub source: String,
    pub service_type: Option<String>,
    pub eval_status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct EvalResultRow {
    pub id: Uuid,
    pub transcript_id: Uuid,
    pub criterion_id: Uuid,
    pub passed: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// Everything fetched for one time window. The aggregator never goes back to
/// the store once it holds the current and comparison `PeriodData`.
#[derive(Debug, Clone, Default)]
pub struct PeriodData {
    pub transcripts: Vec<TranscriptRow>,
    pub results: Vec<EvalResultRow>,
}

// Response payload. Field names follow the JSON contract, hence camelCase.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub overview: Overview,
    pub criteria_pass_rates: Vec<CriterionPassRate>,
    pub heatmap_data: Vec<HeatmapCell>,
    pub trend_data: Vec<TrendPoint>,
    pub needs_attention: Vec<AttentionItem>,
    pub sparkline_data: Vec<SparklinePoint>,
    pub available_technicians: Vec<TechnicianRow>,
    pub available_criteria: Vec<CriterionRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_transcripts: usize,
    pub total_evaluations: usize,
    pub overall_pass_rate: Option<f64>,
    pub pass_rate_change: Option<f64>,
    pub most_improved_technician: Option<MostImproved>,
    pub weakest_criterion: Option<WeakestCriterion>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MostImproved {
    pub id: Uuid,
    pub name: String,
    pub improvement: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakestCriterion {
    pub id: Uuid,
    pub name: String,
    pub fail_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionPassRate {
    pub criteria_id: Uuid,
    pub criteria_name: String,
    pub category: String,
    pub pass_rate: Option<f64>,
    pub total_evals: usize,
    pub target_pass_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapCell {
    pub technician_id: Uuid,
    pub technician_name: String,
    pub criteria_id: Uuid,
    pub criteria_name: String,
    pub pass_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// Bucket start date, `YYYY-MM-DD`.
    pub period: String,
    pub overall_pass_rate: Option<f64>,
    pub technician_trends: Vec<TechnicianTrend>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianTrend {
    pub technician_id: Uuid,
    pub name: String,
    pub pass_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionItem {
    pub transcript_id: Uuid,
    pub technician_name: String,
    pub date: DateTime<Utc>,
    pub service_type: Option<String>,
    pub pass_rate: Option<f64>,
    pub passed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SparklinePoint {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub pass_rate: Option<f64>,
    pub evaluations: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriterionRef {
    pub id: Uuid,
    pub name: String,
}
