use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod db;
mod models;
mod report;
mod weighting;

#[derive(Parser)]
#[command(name = "feedback-insights")]
#[command(about = "Attendance-weighted course feedback analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic demo data
    Seed,
    /// Show the weight and level for one attendance percentage
    Classify {
        #[arg(long)]
        percentage: f64,
    },
    /// Record a student's attendance for a course
    Attendance {
        #[arg(long)]
        student: String,
        #[arg(long)]
        course: String,
        #[arg(long)]
        total: i32,
        #[arg(long)]
        attended: i32,
    },
    /// Submit one feedback response through the weighting engine
    Submit {
        #[arg(long)]
        form: Uuid,
        #[arg(long)]
        student: String,
        /// JSON object mapping question ids to answers
        #[arg(long)]
        answers: String,
    },
    /// Import responses for a form from a CSV file
    Import {
        #[arg(long)]
        form: Uuid,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Aggregate responses into weighted summary statistics
    #[command(group(
        ArgGroup::new("scope")
            .args(["form", "course"])
            .multiple(false)
    ))]
    Aggregate {
        #[arg(long)]
        form: Option<Uuid>,
        #[arg(long)]
        course: Option<String>,
        /// Emit the aggregation result as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    #[command(group(
        ArgGroup::new("scope")
            .args(["form", "course"])
            .multiple(false)
    ))]
    Report {
        #[arg(long)]
        form: Option<Uuid>,
        #[arg(long)]
        course: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Classification is pure; no database needed.
    if let Commands::Classify { percentage } = &cli.command {
        let percentage = *percentage;
        let classified = weighting::classify(percentage);
        println!(
            "{:.1}% attendance -> weight {:.1} ({}, bracket {})",
            percentage,
            classified.weight,
            classified.level,
            weighting::bracket_label(percentage)
        );
        return Ok(());
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::Classify { .. } => unreachable!("handled before pool setup"),
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Attendance {
            student,
            course,
            total,
            attended,
        } => {
            let percentage =
                db::upsert_attendance(&pool, &student, &course, total, attended).await?;
            let classified = weighting::classify(percentage);
            println!(
                "Attendance recorded: {:.1}% (weight {:.1}, {}).",
                percentage, classified.weight, classified.level
            );
        }
        Commands::Submit {
            form,
            student,
            answers,
        } => {
            let answers: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&answers)
                    .context("--answers must be a JSON object keyed by question id")?;
            let response = db::submit_response(&pool, form, &student, answers).await?;
            println!(
                "Response {} stored with attendance {:.1}% and weight {:.1}.",
                response.id, response.student_attendance_percentage, response.weight_factor
            );
        }
        Commands::Import { form, csv } => {
            let inserted = db::import_csv(&pool, form, &csv).await?;
            println!("Inserted {inserted} responses from {}.", csv.display());
        }
        Commands::Aggregate { form, course, json } => {
            let responses = db::fetch_responses(&pool, form, course.as_deref()).await?;
            let result = weighting::aggregate(&responses);

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.total_responses == 0 {
                println!("No responses found for this scope.");
            } else {
                println!("Responses: {}", result.total_responses);
                println!("Average score: {:.2}", result.average_score);
                println!(
                    "Attendance-weighted average: {:.2}",
                    result.weighted_average
                );
                println!("Attendance distribution:");
                for slice in result.attendance_distribution.iter() {
                    println!(
                        "- {}: {} responses (avg score {:.2}, weight {:.1}, {})",
                        slice.range, slice.count, slice.avg_score, slice.weight, slice.level
                    );
                }
            }
        }
        Commands::Report { form, course, out } => {
            let scope_label = course
                .clone()
                .or_else(|| form.map(|form_id| format!("form {form_id}")));
            let responses = db::fetch_responses(&pool, form, course.as_deref()).await?;
            let report = report::build_report(scope_label.as_deref(), &responses);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
