use std::fmt::Write;

use crate::models::{QuestionSummary, ResponseRecord};
use crate::weighting;

/// Per-question rating stats. Only numeric answers count; free-text and
/// choice answers never reach the averages.
pub fn summarize_questions(responses: &[ResponseRecord]) -> Vec<QuestionSummary> {
    let mut map: std::collections::HashMap<String, (usize, f64)> =
        std::collections::HashMap::new();

    for response in responses {
        for (question_id, answer) in &response.answers {
            if let Some(score) = answer.as_f64() {
                let entry = map.entry(question_id.clone()).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += score;
            }
        }
    }

    let mut summaries: Vec<QuestionSummary> = map
        .into_iter()
        .map(|(question_id, (count, total_score))| QuestionSummary {
            question_id,
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                total_score / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.question_id.cmp(&b.question_id))
    });
    summaries
}

pub fn build_report(scope: Option<&str>, responses: &[ResponseRecord]) -> String {
    let result = weighting::aggregate(responses);
    let questions = summarize_questions(responses);

    let mut output = String::new();
    let scope_label = scope.unwrap_or("all courses");

    let _ = writeln!(output, "# Course Feedback Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} responses)",
        scope_label, result.total_responses
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if result.total_responses == 0 {
        let _ = writeln!(output, "No responses recorded for this scope.");
    } else {
        let _ = writeln!(
            output,
            "- Average score: {:.2}",
            result.average_score
        );
        let _ = writeln!(
            output,
            "- Attendance-weighted average: {:.2}",
            result.weighted_average
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Attendance Distribution");

    if result.attendance_distribution.is_empty() {
        let _ = writeln!(output, "No responses recorded for this scope.");
    } else {
        for slice in result.attendance_distribution.iter() {
            let _ = writeln!(
                output,
                "- {}: {} responses (avg score {:.2}, weight {:.1}, {})",
                slice.range, slice.count, slice.avg_score, slice.weight, slice.level
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Question Ratings");

    if questions.is_empty() {
        let _ = writeln!(output, "No rated questions in this scope.");
    } else {
        for summary in questions.iter() {
            let _ = writeln!(
                output,
                "- {}: {} ratings (avg {:.2})",
                summary.question_id, summary.count, summary.avg_score
            );
        }
    }

    let mut recent = responses.to_vec();
    recent.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Submissions");

    if recent.is_empty() {
        let _ = writeln!(output, "No responses recorded for this scope.");
    } else {
        for response in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {}: attendance {:.1}% (weight {:.1}), avg score {:.2}",
                response.submitted_at.date_naive(),
                response.student_attendance_percentage,
                response.weight_factor,
                weighting::average_numeric_score(&response.answers)
            );
        }
    }

    output
}
