use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod db;
mod error;
mod level;
#[cfg(test)]
mod memory;
mod models;
mod report;
mod sequencer;
mod store;
mod topic;
mod vocab;

use config::Config;
use db::PgStore;
use level::LevelResolver;
use sequencer::TaskSequencer;
use store::ProgressStore;
use topic::TopicName;

#[derive(Parser)]
#[command(name = "unity-voice")]
#[command(about = "Learner level and task progression for Unity Voice", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo learners, tasks and words
    Seed,
    /// Import task history from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Resolve a learner's level in a topic
    ResolveLevel {
        #[arg(long)]
        user: String,
        #[arg(long)]
        topic: String,
        /// Also print where the level came from and whether it was stored
        #[arg(long)]
        explain: bool,
    },
    /// Store a learner's level in a topic
    UpdateLevel {
        #[arg(long)]
        user: String,
        #[arg(long)]
        topic: String,
        #[arg(long)]
        level: i32,
        #[arg(long)]
        score: Option<i32>,
    },
    /// Pick the next activity for a learner in a topic
    NextTask {
        #[arg(long)]
        user: String,
        #[arg(long)]
        topic: String,
        #[arg(long)]
        json: bool,
    },
    /// Mark an activity finished
    CompleteTask {
        #[arg(long)]
        task_id: Uuid,
        #[arg(long, default_value_t = 0)]
        score: i32,
    },
    /// Sample words of a topic the learner has not learned yet
    Words {
        #[arg(long)]
        user: String,
        #[arg(long)]
        topic: String,
        #[arg(long)]
        level: Option<i32>,
        #[arg(long, default_value_t = 10)]
        count: i64,
    },
    /// Mark words as learned
    Learn {
        #[arg(long)]
        user: String,
        #[arg(long = "word-id", required = true, num_args = 1..)]
        word_ids: Vec<Uuid>,
    },
    /// Generate a markdown progress report for a learner
    Report {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PgStore::new(pool);
    let policy = config.level_policy;

    match cli.command {
        Commands::InitDb => {
            db::init_db(store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(store.pool()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(store.pool(), &csv).await?;
            println!("Inserted {inserted} tasks from {}.", csv.display());
        }
        Commands::ResolveLevel {
            user,
            topic,
            explain,
        } => {
            let resolver = LevelResolver::new(&store, policy);
            if explain {
                let resolution = resolver.resolve(&user, &topic).await;
                println!(
                    "Level {} (from {}, {})",
                    resolution.level,
                    resolution.source.as_str(),
                    resolution.write
                );
            } else {
                println!("{}", resolver.resolve_level(&user, &topic).await);
            }
        }
        Commands::UpdateLevel {
            user,
            topic,
            level,
            score,
        } => {
            if !LevelResolver::new(&store, policy)
                .update_level(&user, &topic, level, score)
                .await
            {
                anyhow::bail!("level was not updated");
            }
            println!("Level {level} stored for {user} in {topic}.");
        }
        Commands::NextTask { user, topic, json } => {
            let topic = TopicName::parse(&topic)?;
            let next = TaskSequencer::new(&store, policy)
                .next_for_topic(&store, &user, &topic)
                .await?;

            if json {
                let body = serde_json::json!({
                    "taskId": next.task_id,
                    "taskType": next.task_type,
                    "level": next.level,
                    "created": next.created,
                    "path": next.path(&topic),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                let verb = if next.created { "Start" } else { "Resume" };
                println!(
                    "{verb} {} at level {}: {}",
                    next.task_type,
                    next.level,
                    next.path(&topic)
                );
            }
        }
        Commands::CompleteTask { task_id, score } => {
            let completion = LevelResolver::new(&store, policy)
                .complete_task(task_id, score)
                .await?
                .with_context(|| format!("no task with id {task_id}"))?;

            let verb = if completion.already_completed {
                "Already completed"
            } else {
                "Completed"
            };
            println!(
                "{verb} {} at level {} in {}.",
                completion.task.task_type, completion.task.level, completion.task.topic_name
            );
            if let Some(level) = completion.advanced_to {
                println!("Learner moved to level {level}.");
            }
        }
        Commands::Words {
            user,
            topic,
            level,
            count,
        } => {
            let topic = TopicName::parse(&topic)?;
            let words = vocab::sample_unlearned(&store, &user, &topic, level, count).await?;

            if words.is_empty() {
                println!("No unlearned words left in {topic}.");
                return Ok(());
            }

            for word in words.iter() {
                println!(
                    "- {} ({}) level {} [{}]",
                    word.word, word.translation, word.level, word.word_id
                );
            }
        }
        Commands::Learn { user, word_ids } => {
            let marked = vocab::mark_learned(&store, &user, &word_ids).await?;
            println!("Marked {marked} words learned for {user}.");
        }
        Commands::Report { user, out } => {
            let records = store.progress_for_user(&user).await?;
            let tasks = store.tasks_for_user(&user).await?;
            let report = report::build_report(&user, &records, &tasks, &policy);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
