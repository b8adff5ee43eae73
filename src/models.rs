use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::weighting::AttendanceLevel;

/// One anonymous feedback submission. Carries no student id; only the
/// attendance snapshot and the weight frozen at submission time survive.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub id: Uuid,
    pub form_id: Uuid,
    pub course_id: Uuid,
    pub student_attendance_percentage: f64,
    /// question id -> answer (number, free text, or choice list)
    pub answers: Map<String, Value>,
    /// Computed once when the response is stored, never recomputed.
    pub weight_factor: f64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationResult {
    pub average_score: f64,
    pub total_responses: usize,
    pub weighted_average: f64,
    pub attendance_distribution: Vec<BracketSlice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BracketSlice {
    pub range: &'static str,
    pub count: usize,
    pub avg_score: f64,
    /// Raw percentage of the last response seen in this bracket.
    pub percentage: f64,
    pub weight: f64,
    pub level: AttendanceLevel,
}

#[derive(Debug, Clone)]
pub struct QuestionSummary {
    pub question_id: String,
    pub count: usize,
    pub avg_score: f64,
}
