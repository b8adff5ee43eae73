//! Attendance-weighted feedback scoring.
//!
//! A respondent's feedback counts in proportion to how often they showed up:
//! every score is multiplied by a weight derived from their attendance
//! percentage, and aggregate views break responses down by attendance bracket.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{AggregationResult, BracketSlice, ResponseRecord};

/// Semantic attendance category, one per weighting bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceLevel {
    Full,
    High,
    Moderate,
    Limited,
    Low,
    Minimal,
}

impl AttendanceLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceLevel::Full => "full",
            AttendanceLevel::High => "high",
            AttendanceLevel::Moderate => "moderate",
            AttendanceLevel::Limited => "limited",
            AttendanceLevel::Low => "low",
            AttendanceLevel::Minimal => "minimal",
        }
    }
}

impl std::fmt::Display for AttendanceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Weight and category derived from a single attendance percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttendanceWeight {
    pub weight: f64,
    pub level: AttendanceLevel,
}

struct Bracket {
    threshold: f64,
    weight: f64,
    level: AttendanceLevel,
    range_label: &'static str,
}

/// The weighting table, highest threshold first.
///
/// | Attendance | Weight | Level    |
/// |------------|--------|----------|
/// | >= 90%     | 1.0    | full     |
/// | >= 75%     | 0.9    | high     |
/// | >= 60%     | 0.7    | moderate |
/// | >= 40%     | 0.5    | limited  |
/// | >= 25%     | 0.3    | low      |
/// | < 25%      | 0.1    | minimal  |
///
/// Thresholds are tested top down; the last entry is the fallthrough.
/// Weight, level, and range label for a given percentage must always come
/// from the same row, so this table is the only place they are defined.
static BRACKETS: [Bracket; 6] = [
    Bracket {
        threshold: 90.0,
        weight: 1.0,
        level: AttendanceLevel::Full,
        range_label: "90%+",
    },
    Bracket {
        threshold: 75.0,
        weight: 0.9,
        level: AttendanceLevel::High,
        range_label: "75-89%",
    },
    Bracket {
        threshold: 60.0,
        weight: 0.7,
        level: AttendanceLevel::Moderate,
        range_label: "60-74%",
    },
    Bracket {
        threshold: 40.0,
        weight: 0.5,
        level: AttendanceLevel::Limited,
        range_label: "40-59%",
    },
    Bracket {
        threshold: 25.0,
        weight: 0.3,
        level: AttendanceLevel::Low,
        range_label: "25-39%",
    },
    Bracket {
        threshold: f64::NEG_INFINITY,
        weight: 0.1,
        level: AttendanceLevel::Minimal,
        range_label: "<25%",
    },
];

fn bracket_for(percentage: f64) -> &'static Bracket {
    BRACKETS
        .iter()
        .find(|bracket| percentage >= bracket.threshold)
        // Only NaN falls through every comparison; treat it as minimal.
        .unwrap_or(&BRACKETS[BRACKETS.len() - 1])
}

/// Maps an attendance percentage to its weight and level.
///
/// Total over all finite inputs. Callers are expected to supply values in
/// [0, 100]; anything below 25 (including out-of-range negatives) lands in
/// the minimal bracket.
pub fn classify(percentage: f64) -> AttendanceWeight {
    let bracket = bracket_for(percentage);
    AttendanceWeight {
        weight: bracket.weight,
        level: bracket.level,
    }
}

/// The multiplier stored on a response at submission time.
pub fn weight_factor(percentage: f64) -> f64 {
    bracket_for(percentage).weight
}

/// Display label for the bracket a percentage falls into, used as the
/// grouping key in aggregation.
pub fn bracket_label(percentage: f64) -> &'static str {
    bracket_for(percentage).range_label
}

/// Mean of the numeric answers in one response. Free-text and choice answers
/// are not ratings and are skipped; a response with no numeric answers
/// scores 0.
pub fn average_numeric_score(answers: &Map<String, Value>) -> f64 {
    let scores: Vec<f64> = answers.values().filter_map(Value::as_f64).collect();
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

struct BracketGroup {
    range: &'static str,
    count: usize,
    total_score: f64,
    percentage: f64,
    weight: f64,
}

/// Aggregates a response set into summary statistics: unweighted average,
/// attendance-weighted average, and a per-bracket distribution.
///
/// Brackets appear in the distribution in the order they are first
/// encountered. Each bracket retains the percentage and weight of the last
/// response seen in it; all responses in a bracket share one weight by
/// construction, so only the displayed percentage is sensitive to input
/// order.
pub fn aggregate(responses: &[ResponseRecord]) -> AggregationResult {
    if responses.is_empty() {
        return AggregationResult {
            average_score: 0.0,
            total_responses: 0,
            weighted_average: 0.0,
            attendance_distribution: Vec::new(),
        };
    }

    let mut total_score = 0.0;
    let mut total_weighted_score = 0.0;
    let mut total_weight = 0.0;
    // Vec instead of a map: keeps first-encounter order, and there are at
    // most six groups.
    let mut groups: Vec<BracketGroup> = Vec::new();

    for response in responses {
        let average_score = average_numeric_score(&response.answers);
        total_score += average_score;
        total_weighted_score += average_score * response.weight_factor;
        total_weight += response.weight_factor;

        let range = bracket_label(response.student_attendance_percentage);
        let index = match groups.iter().position(|group| group.range == range) {
            Some(index) => index,
            None => {
                groups.push(BracketGroup {
                    range,
                    count: 0,
                    total_score: 0.0,
                    percentage: 0.0,
                    weight: 0.0,
                });
                groups.len() - 1
            }
        };

        let group = &mut groups[index];
        group.count += 1;
        group.total_score += average_score;
        group.percentage = response.student_attendance_percentage;
        group.weight = response.weight_factor;
    }

    let attendance_distribution = groups
        .into_iter()
        .map(|group| BracketSlice {
            range: group.range,
            count: group.count,
            avg_score: group.total_score / group.count as f64,
            percentage: group.percentage,
            weight: group.weight,
            level: classify(group.percentage).level,
        })
        .collect();

    AggregationResult {
        average_score: total_score / responses.len() as f64,
        total_responses: responses.len(),
        weighted_average: if total_weight > 0.0 {
            total_weighted_score / total_weight
        } else {
            0.0
        },
        attendance_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn sample_response(percentage: f64, answers: Value) -> ResponseRecord {
        let answers = match answers {
            Value::Object(map) => map,
            other => panic!("answers fixture must be a JSON object, got {other}"),
        };
        ResponseRecord {
            id: Uuid::new_v4(),
            form_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            student_attendance_percentage: percentage,
            answers,
            weight_factor: weight_factor(percentage),
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn weights_follow_expected_tiers() {
        assert_eq!(classify(95.0).weight, 1.0);
        assert_eq!(classify(80.0).weight, 0.9);
        assert_eq!(classify(65.0).weight, 0.7);
        assert_eq!(classify(50.0).weight, 0.5);
        assert_eq!(classify(30.0).weight, 0.3);
        assert_eq!(classify(10.0).weight, 0.1);
    }

    #[test]
    fn thresholds_are_exact_at_bracket_edges() {
        assert_eq!(classify(90.0).weight, 1.0);
        assert_eq!(classify(89.999).weight, 0.9);
        assert_eq!(classify(75.0).weight, 0.9);
        assert_eq!(classify(74.999).weight, 0.7);
        assert_eq!(classify(60.0).weight, 0.7);
        assert_eq!(classify(40.0).weight, 0.5);
        assert_eq!(classify(25.0).weight, 0.3);
        assert_eq!(classify(24.999).weight, 0.1);
        assert_eq!(classify(0.0).weight, 0.1);
    }

    #[test]
    fn weight_never_increases_as_attendance_drops() {
        let samples = [
            100.0, 95.0, 90.0, 89.9, 80.0, 75.0, 70.0, 60.0, 55.0, 40.0, 30.0, 25.0, 10.0, 0.0,
        ];
        for pair in samples.windows(2) {
            assert!(
                classify(pair[0]).weight >= classify(pair[1]).weight,
                "weight increased between {} and {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn weight_level_and_label_agree_on_the_bracket() {
        let cases = [
            (97.0, 1.0, AttendanceLevel::Full, "90%+"),
            (82.0, 0.9, AttendanceLevel::High, "75-89%"),
            (61.5, 0.7, AttendanceLevel::Moderate, "60-74%"),
            (45.0, 0.5, AttendanceLevel::Limited, "40-59%"),
            (25.0, 0.3, AttendanceLevel::Low, "25-39%"),
            (12.0, 0.1, AttendanceLevel::Minimal, "<25%"),
        ];
        for (percentage, weight, level, label) in cases {
            let classified = classify(percentage);
            assert_eq!(classified.weight, weight, "weight at {percentage}");
            assert_eq!(classified.level, level, "level at {percentage}");
            assert_eq!(bracket_label(percentage), label, "label at {percentage}");
        }
    }

    #[test]
    fn empty_input_yields_all_zeroes() {
        let result = aggregate(&[]);
        assert_eq!(result.average_score, 0.0);
        assert_eq!(result.total_responses, 0);
        assert_eq!(result.weighted_average, 0.0);
        assert!(result.attendance_distribution.is_empty());
    }

    #[test]
    fn single_response_matches_hand_computation() {
        let responses = vec![sample_response(80.0, json!({ "q1": 4, "q2": 5 }))];
        let result = aggregate(&responses);

        assert!((result.average_score - 4.5).abs() < 0.001);
        assert_eq!(result.total_responses, 1);
        assert!((result.weighted_average - 4.5).abs() < 0.001);

        assert_eq!(result.attendance_distribution.len(), 1);
        let slice = &result.attendance_distribution[0];
        assert_eq!(slice.range, "75-89%");
        assert_eq!(slice.count, 1);
        assert!((slice.avg_score - 4.5).abs() < 0.001);
        assert!((slice.weight - 0.9).abs() < 0.001);
        assert_eq!(slice.level, AttendanceLevel::High);
    }

    #[test]
    fn same_bracket_responses_share_one_group() {
        let responses = vec![
            sample_response(95.0, json!({ "q1": 4 })),
            sample_response(95.0, json!({ "q1": 6 })),
        ];
        let result = aggregate(&responses);

        assert!((result.average_score - 5.0).abs() < 0.001);
        assert!((result.weighted_average - 5.0).abs() < 0.001);
        assert_eq!(result.attendance_distribution.len(), 1);
        assert_eq!(result.attendance_distribution[0].count, 2);
        assert!((result.attendance_distribution[0].avg_score - 5.0).abs() < 0.001);
    }

    #[test]
    fn text_only_response_scores_zero_but_still_counts() {
        let responses = vec![
            sample_response(95.0, json!({ "q1": "very engaging", "q2": ["pace", "slides"] })),
            sample_response(95.0, json!({ "q1": 4 })),
        ];
        let result = aggregate(&responses);

        assert_eq!(result.total_responses, 2);
        assert!((result.average_score - 2.0).abs() < 0.001);
        assert_eq!(result.attendance_distribution[0].count, 2);
    }

    #[test]
    fn mixed_answer_types_average_only_the_ratings() {
        let answers = json!({
            "q1": 4,
            "q2": "could use more examples",
            "q3": ["lectures", "labs"],
            "q4": 5
        });
        let responses = vec![sample_response(70.0, answers)];
        let result = aggregate(&responses);
        assert!((result.average_score - 4.5).abs() < 0.001);
    }

    #[test]
    fn group_counts_cover_every_response() {
        let responses = vec![
            sample_response(95.0, json!({ "q1": 5 })),
            sample_response(80.0, json!({ "q1": 4 })),
            sample_response(80.0, json!({ "q1": 3 })),
            sample_response(30.0, json!({ "q1": 2 })),
            sample_response(10.0, json!({ "q1": 1 })),
        ];
        let result = aggregate(&responses);

        let grouped: usize = result
            .attendance_distribution
            .iter()
            .map(|slice| slice.count)
            .sum();
        assert_eq!(grouped, responses.len());
        assert_eq!(result.total_responses, responses.len());
    }

    #[test]
    fn brackets_keep_first_encounter_order() {
        let responses = vec![
            sample_response(95.0, json!({ "q1": 5 })),
            sample_response(30.0, json!({ "q1": 2 })),
            sample_response(80.0, json!({ "q1": 4 })),
            sample_response(92.0, json!({ "q1": 5 })),
        ];
        let result = aggregate(&responses);

        let ranges: Vec<&str> = result
            .attendance_distribution
            .iter()
            .map(|slice| slice.range)
            .collect();
        assert_eq!(ranges, vec!["90%+", "25-39%", "75-89%"]);
    }

    #[test]
    fn bracket_retains_last_seen_percentage() {
        let responses = vec![
            sample_response(92.0, json!({ "q1": 5 })),
            sample_response(97.0, json!({ "q1": 4 })),
        ];
        let result = aggregate(&responses);

        assert_eq!(result.attendance_distribution.len(), 1);
        let slice = &result.attendance_distribution[0];
        assert!((slice.percentage - 97.0).abs() < 0.001);
        assert!((slice.weight - 1.0).abs() < 0.001);
        assert_eq!(slice.level, AttendanceLevel::Full);
    }

    #[test]
    fn weighted_average_favors_high_attendance_voices() {
        let responses = vec![
            sample_response(95.0, json!({ "q1": 5 })),
            sample_response(10.0, json!({ "q1": 1 })),
        ];
        let result = aggregate(&responses);

        assert!((result.average_score - 3.0).abs() < 0.001);
        let expected = (5.0 * 1.0 + 1.0 * 0.1) / 1.1;
        assert!((result.weighted_average - expected).abs() < 0.001);
        assert!(result.weighted_average > result.average_score);
    }

    #[test]
    fn aggregation_is_deterministic() {
        let responses = vec![
            sample_response(95.0, json!({ "q1": 5, "q2": "solid" })),
            sample_response(55.0, json!({ "q1": 3 })),
            sample_response(80.0, json!({ "q1": 4 })),
        ];
        let first = serde_json::to_string(&aggregate(&responses)).unwrap();
        let second = serde_json::to_string(&aggregate(&responses)).unwrap();
        assert_eq!(first, second);
    }
}
