use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::ResponseRecord;
use crate::weighting;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Attendance percentage from raw class counts. A course with no recorded
/// classes yet counts as zero attendance.
pub fn attendance_percentage(total_classes: i32, attended_classes: i32) -> f64 {
    if total_classes > 0 {
        f64::from(attended_classes) / f64::from(total_classes) * 100.0
    } else {
        0.0
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        (
            Uuid::parse_str("7b1c9a4e-5f2d-4a38-9c61-0d8f3b2e6a17")?,
            "Jane Student",
            "jane.student@college.edu",
        ),
        (
            Uuid::parse_str("2e84d7f3-1b6a-4c95-8d20-67f4a9c1e5b8")?,
            "Avi Raman",
            "avi.raman@college.edu",
        ),
        (
            Uuid::parse_str("c5f02b88-9e41-47d3-b6a9-14e7d82c3f50")?,
            "Mei Chen",
            "mei.chen@college.edu",
        ),
        (
            Uuid::parse_str("91a6e3d2-4c78-4f1b-a05e-b83f29d617c4")?,
            "Omar Diallo",
            "omar.diallo@college.edu",
        ),
    ];

    for (id, name, email) in students {
        sqlx::query(
            r#"
            INSERT INTO course_feedback.students (id, full_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        (
            "CS101",
            "Introduction to Computer Science",
            "Computer Science",
            "Fall 2026",
        ),
        (
            "CS201",
            "Data Structures and Algorithms",
            "Computer Science",
            "Fall 2026",
        ),
    ];

    for (code, name, department, semester) in courses {
        sqlx::query(
            r#"
            INSERT INTO course_feedback.courses (id, code, name, department, semester)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO UPDATE
            SET name = EXCLUDED.name,
                department = EXCLUDED.department,
                semester = EXCLUDED.semester
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(name)
        .bind(department)
        .bind(semester)
        .execute(pool)
        .await?;
    }

    // One attendance record per student for CS101, spread across brackets.
    let attendance = vec![
        ("jane.student@college.edu", "CS101", 24, 23),
        ("avi.raman@college.edu", "CS101", 24, 20),
        ("mei.chen@college.edu", "CS101", 24, 16),
        ("omar.diallo@college.edu", "CS101", 24, 7),
    ];

    for (email, code, total, attended) in attendance {
        upsert_attendance(pool, email, code, total, attended).await?;
    }

    let questions = serde_json::json!([
        { "id": "q-clarity", "type": "rating", "text": "How clear were the lectures?" },
        { "id": "q-pace", "type": "rating", "text": "How well did the pace suit you?" },
        { "id": "q-comments", "type": "text", "text": "Anything else you want to share?" }
    ]);

    let course_id: Uuid =
        sqlx::query("SELECT id FROM course_feedback.courses WHERE code = $1")
            .bind("CS101")
            .fetch_one(pool)
            .await?
            .get("id");

    let form_id: Uuid = sqlx::query(
        r#"
        INSERT INTO course_feedback.feedback_forms (id, course_id, title, questions, is_active)
        VALUES ($1, $2, $3, $4, TRUE)
        ON CONFLICT (course_id, title) DO UPDATE
        SET questions = EXCLUDED.questions, is_active = TRUE
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(course_id)
    .bind("Mid-semester feedback")
    .bind(Json(&questions))
    .fetch_one(pool)
    .await?
    .get("id");

    // Attendance snapshots and weights exactly as a live submission would
    // have stored them.
    let responses = vec![
        (
            "seed-101",
            95.8,
            serde_json::json!({ "q-clarity": 5, "q-pace": 4, "q-comments": "Best course this term." }),
        ),
        (
            "seed-102",
            83.3,
            serde_json::json!({ "q-clarity": 4, "q-pace": 4 }),
        ),
        (
            "seed-103",
            66.7,
            serde_json::json!({ "q-clarity": 3, "q-pace": 4, "q-comments": "More worked examples please." }),
        ),
        (
            "seed-104",
            29.2,
            serde_json::json!({ "q-clarity": 2, "q-pace": 2, "q-comments": "Hard to follow." }),
        ),
        (
            "seed-105",
            10.0,
            serde_json::json!({ "q-comments": "Only attended the first week." }),
        ),
    ];

    for (source_key, percentage, answers) in responses {
        sqlx::query(
            r#"
            INSERT INTO course_feedback.feedback_responses
            (id, form_id, course_id, student_attendance_percentage, answers, weight_factor, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(form_id)
        .bind(course_id)
        .bind(percentage)
        .bind(Json(&answers))
        .bind(weighting::weight_factor(percentage))
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn upsert_attendance(
    pool: &PgPool,
    student_email: &str,
    course_code: &str,
    total_classes: i32,
    attended_classes: i32,
) -> anyhow::Result<f64> {
    let student_id: Uuid =
        sqlx::query("SELECT id FROM course_feedback.students WHERE email = $1")
            .bind(student_email)
            .fetch_optional(pool)
            .await?
            .with_context(|| format!("no student with email {student_email}"))?
            .get("id");

    let course_id: Uuid = sqlx::query("SELECT id FROM course_feedback.courses WHERE code = $1")
        .bind(course_code)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no course with code {course_code}"))?
        .get("id");

    let percentage = attendance_percentage(total_classes, attended_classes);

    sqlx::query(
        r#"
        INSERT INTO course_feedback.attendance_records
        (id, student_id, course_id, total_classes, attended_classes, attendance_percentage)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_id, course_id) DO UPDATE
        SET total_classes = EXCLUDED.total_classes,
            attended_classes = EXCLUDED.attended_classes,
            attendance_percentage = EXCLUDED.attendance_percentage,
            updated_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(course_id)
    .bind(total_classes)
    .bind(attended_classes)
    .bind(percentage)
    .execute(pool)
    .await?;

    debug!(student_email, course_code, percentage, "attendance updated");
    Ok(percentage)
}

/// Stores one anonymous response. The student's current attendance for the
/// form's course is looked up here and frozen onto the row together with the
/// derived weight; later attendance changes never touch stored responses.
pub async fn submit_response(
    pool: &PgPool,
    form_id: Uuid,
    student_email: &str,
    answers: Map<String, Value>,
) -> anyhow::Result<ResponseRecord> {
    let course_id: Uuid = sqlx::query(
        "SELECT course_id FROM course_feedback.feedback_forms WHERE id = $1 AND is_active",
    )
    .bind(form_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no active feedback form {form_id}"))?
    .get("course_id");

    let student_id: Uuid =
        sqlx::query("SELECT id FROM course_feedback.students WHERE email = $1")
            .bind(student_email)
            .fetch_optional(pool)
            .await?
            .with_context(|| format!("no student with email {student_email}"))?
            .get("id");

    // No attendance record yet counts as zero attendance.
    let percentage = sqlx::query(
        "SELECT attendance_percentage FROM course_feedback.attendance_records \
         WHERE student_id = $1 AND course_id = $2",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_optional(pool)
    .await?
    .map(|row| row.get::<f64, _>("attendance_percentage"))
    .unwrap_or(0.0);

    let weight_factor = weighting::weight_factor(percentage);
    let id = Uuid::new_v4();
    let submitted_at = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO course_feedback.feedback_responses
        (id, form_id, course_id, student_attendance_percentage, answers, weight_factor, submitted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(form_id)
    .bind(course_id)
    .bind(percentage)
    .bind(Json(&answers))
    .bind(weight_factor)
    .bind(submitted_at)
    .execute(pool)
    .await?;

    info!(%form_id, percentage, weight_factor, "response stored");

    Ok(ResponseRecord {
        id,
        form_id,
        course_id,
        student_attendance_percentage: percentage,
        answers,
        weight_factor,
        submitted_at,
    })
}

/// Responses for one form, one course, or everything, in submission order.
pub async fn fetch_responses(
    pool: &PgPool,
    form: Option<Uuid>,
    course_code: Option<&str>,
) -> anyhow::Result<Vec<ResponseRecord>> {
    let mut query = String::from(
        "SELECT r.id, r.form_id, r.course_id, r.student_attendance_percentage, \
         r.answers, r.weight_factor, r.submitted_at \
         FROM course_feedback.feedback_responses r \
         JOIN course_feedback.courses c ON c.id = r.course_id",
    );

    if form.is_some() {
        query.push_str(" WHERE r.form_id = $1");
    } else if course_code.is_some() {
        query.push_str(" WHERE c.code = $1");
    }
    query.push_str(" ORDER BY r.submitted_at");

    let mut rows = sqlx::query(&query);

    if let Some(form_id) = form {
        rows = rows.bind(form_id);
    } else if let Some(code) = course_code {
        rows = rows.bind(code);
    }

    let records = rows.fetch_all(pool).await?;
    let mut responses = Vec::new();

    for row in records {
        let Json(answers) = row.get::<Json<Map<String, Value>>, _>("answers");
        responses.push(ResponseRecord {
            id: row.get("id"),
            form_id: row.get("form_id"),
            course_id: row.get("course_id"),
            student_attendance_percentage: row.get("student_attendance_percentage"),
            answers,
            weight_factor: row.get("weight_factor"),
            submitted_at: row.get("submitted_at"),
        });
    }

    debug!(count = responses.len(), "responses fetched");
    Ok(responses)
}

pub async fn import_csv(
    pool: &PgPool,
    form_id: Uuid,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        attendance_percentage: f64,
        answers: String,
        submitted_at: Option<DateTime<Utc>>,
        source_key: Option<String>,
    }

    let course_id: Uuid = sqlx::query(
        "SELECT course_id FROM course_feedback.feedback_forms WHERE id = $1",
    )
    .bind(form_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("no feedback form {form_id}"))?
    .get("course_id");

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let answers: Map<String, Value> = serde_json::from_str(&row.answers)
            .context("answers column must hold a JSON object")?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let result = sqlx::query(
            r#"
            INSERT INTO course_feedback.feedback_responses
            (id, form_id, course_id, student_attendance_percentage, answers,
             weight_factor, submitted_at, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(form_id)
        .bind(course_id)
        .bind(row.attendance_percentage)
        .bind(Json(&answers))
        .bind(weighting::weight_factor(row.attendance_percentage))
        .bind(row.submitted_at.unwrap_or_else(Utc::now))
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    info!(%form_id, inserted, "csv import finished");
    Ok(inserted)
}
