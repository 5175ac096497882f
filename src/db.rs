use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{FinishedTask, ProgressionRecord, Task, TaskType, Word};
use crate::store::{ProgressStore, StoreResult, TaskCreator, VocabularyStore};
use crate::topic::TopicName;

/// Matches `topic_name` against `$2` (the caller's spelling), `$3` (db form) and
/// `$4` (lowercase key with spaces and hyphens stripped).
const TOPIC_MATCH: &str = "(topic_name = $2 \
     OR topic_name = $3 \
     OR lower(topic_name) = lower($3) \
     OR regexp_replace(lower(topic_name), '[\\s-]', '', 'g') = $4)";

const TASK_COLUMNS: &str = "task_id, user_id, topic_name, level, task_type, task_score, \
     creation_date, completion_date";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn level_lookup(
        &self,
        sql: &str,
        user_id: &str,
        topic: &TopicName,
    ) -> StoreResult<Option<i32>> {
        let row = sqlx::query(sql)
            .bind(user_id)
            .bind(topic.as_given())
            .bind(topic.db_form())
            .bind(topic.match_key())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get("level")))
    }
}

fn task_from_row(row: &PgRow) -> StoreResult<Task> {
    let task_type: String = row.get("task_type");
    Ok(Task {
        task_id: row.get("task_id"),
        user_id: row.get("user_id"),
        topic_name: row.get("topic_name"),
        level: row.get("level"),
        task_type: task_type.parse()?,
        task_score: row.get("task_score"),
        creation_date: row.get("creation_date"),
        completion_date: row.get("completion_date"),
    })
}

fn record_from_row(row: &PgRow) -> ProgressionRecord {
    ProgressionRecord {
        user_id: row.get("user_id"),
        topic_name: row.get("topic_name"),
        level: row.get("level"),
        earned_score: row.get("earned_score"),
        completed_at: row.get("completed_at"),
    }
}

#[async_trait]
impl ProgressStore for PgStore {
    async fn highest_recorded_level(
        &self,
        user_id: &str,
        topic: &TopicName,
    ) -> StoreResult<Option<i32>> {
        let sql = format!(
            "SELECT level FROM unity_voice.user_in_level \
             WHERE user_id = $1 AND {TOPIC_MATCH} \
             ORDER BY level DESC LIMIT 1"
        );
        self.level_lookup(&sql, user_id, topic).await
    }

    async fn highest_completed_level(
        &self,
        user_id: &str,
        topic: &TopicName,
    ) -> StoreResult<Option<i32>> {
        let sql = format!(
            "SELECT level FROM unity_voice.tasks \
             WHERE user_id = $1 AND {TOPIC_MATCH} AND completion_date IS NOT NULL \
             ORDER BY level DESC LIMIT 1"
        );
        self.level_lookup(&sql, user_id, topic).await
    }

    async fn lowest_open_level(
        &self,
        user_id: &str,
        topic: &TopicName,
    ) -> StoreResult<Option<i32>> {
        let sql = format!(
            "SELECT level FROM unity_voice.tasks \
             WHERE user_id = $1 AND {TOPIC_MATCH} AND completion_date IS NULL \
             ORDER BY level ASC LIMIT 1"
        );
        self.level_lookup(&sql, user_id, topic).await
    }

    async fn upsert_progression(&self, record: &ProgressionRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO unity_voice.user_in_level
            (user_id, topic_name, level, earned_score, completed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, topic_name) DO UPDATE
            SET level = EXCLUDED.level,
                earned_score = EXCLUDED.earned_score,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.topic_name)
        .bind(record.level)
        .bind(record.earned_score)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await?;

        debug!(
            user_id = %record.user_id,
            topic = %record.topic_name,
            level = record.level,
            "progression record upserted"
        );
        Ok(())
    }

    async fn tasks_for_topic(&self, user_id: &str, topic: &TopicName) -> StoreResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM unity_voice.tasks \
             WHERE user_id = $1 AND {TOPIC_MATCH} \
             ORDER BY level, creation_date"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(topic.as_given())
            .bind(topic.db_form())
            .bind(topic.match_key())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(task_from_row).collect()
    }

    async fn tasks_for_user(&self, user_id: &str) -> StoreResult<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM unity_voice.tasks \
             WHERE user_id = $1 ORDER BY topic_name, level, creation_date"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(task_from_row).collect()
    }

    async fn progress_for_user(&self, user_id: &str) -> StoreResult<Vec<ProgressionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, topic_name, level, earned_score, completed_at
            FROM unity_voice.user_in_level
            WHERE user_id = $1
            ORDER BY topic_name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn complete_task(&self, task_id: Uuid, score: i32) -> StoreResult<Option<FinishedTask>> {
        let sql = format!(
            "WITH finished AS ( \
                 UPDATE unity_voice.tasks \
                 SET completion_date = now(), task_score = $2 \
                 WHERE task_id = $1 AND completion_date IS NULL \
                 RETURNING {TASK_COLUMNS}, TRUE AS newly_completed \
             ) \
             SELECT * FROM finished \
             UNION ALL \
             SELECT {TASK_COLUMNS}, FALSE AS newly_completed FROM unity_voice.tasks \
             WHERE task_id = $1 AND NOT EXISTS (SELECT 1 FROM finished)"
        );
        let row = sqlx::query(&sql)
            .bind(task_id)
            .bind(score)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(FinishedTask {
                task: task_from_row(&row)?,
                newly_completed: row.get("newly_completed"),
            })
        })
        .transpose()
    }
}

#[async_trait]
impl TaskCreator for PgStore {
    async fn create_task(
        &self,
        user_id: &str,
        topic: &TopicName,
        task_type: TaskType,
        level: i32,
    ) -> StoreResult<Task> {
        let sql = format!(
            "INSERT INTO unity_voice.tasks \
             (task_id, user_id, topic_name, level, task_type, task_score, creation_date) \
             VALUES ($1, $2, $3, $4, $5, 0, now()) \
             RETURNING {TASK_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(topic.db_form())
            .bind(level)
            .bind(task_type.as_str())
            .fetch_one(&self.pool)
            .await?;

        task_from_row(&row)
    }
}

#[async_trait]
impl VocabularyStore for PgStore {
    async fn unlearned_words(
        &self,
        user_id: &str,
        topic: &TopicName,
        level: Option<i32>,
        limit: i64,
    ) -> StoreResult<Vec<Word>> {
        let sql = format!(
            "SELECT w.word_id, w.topic_name, w.level, w.word, w.translation \
             FROM unity_voice.words w \
             WHERE {TOPIC_MATCH} \
             AND ($5::int IS NULL OR w.level = $5) \
             AND NOT EXISTS ( \
                 SELECT 1 FROM unity_voice.learned_words lw \
                 WHERE lw.user_id = $1 AND lw.word_id = w.word_id \
             ) \
             ORDER BY random() LIMIT $6"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(topic.as_given())
            .bind(topic.db_form())
            .bind(topic.match_key())
            .bind(level)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| Word {
                word_id: row.get("word_id"),
                topic_name: row.get("topic_name"),
                level: row.get("level"),
                word: row.get("word"),
                translation: row.get("translation"),
            })
            .collect())
    }

    async fn mark_learned(&self, user_id: &str, word_ids: &[Uuid]) -> StoreResult<u64> {
        let mut inserted = 0u64;
        for word_id in word_ids {
            let result = sqlx::query(
                r#"
                INSERT INTO unity_voice.learned_words (user_id, word_id, learned_at)
                VALUES ($1, $2, now())
                ON CONFLICT (user_id, word_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(word_id)
            .execute(&self.pool)
            .await?;

            inserted += result.rows_affected();
        }
        Ok(inserted)
    }
}

fn at_midnight(date: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    Ok(date
        .and_hms_opt(0, 0, 0)
        .context("invalid time of day")?
        .and_utc())
}

/// A task history row loaded by `seed` or `import_csv`.
struct HistoryRow<'a> {
    source_key: &'a str,
    user_id: &'a str,
    topic: TopicName,
    level: i32,
    task_type: TaskType,
    task_score: i32,
    creation_date: DateTime<Utc>,
    completion_date: Option<DateTime<Utc>>,
}

async fn insert_history_row(pool: &PgPool, row: &HistoryRow<'_>) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO unity_voice.tasks
        (task_id, user_id, topic_name, level, task_type, task_score,
         creation_date, completion_date, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(row.user_id)
    .bind(row.topic.db_form())
    .bind(row.level)
    .bind(row.task_type.as_str())
    .bind(row.task_score)
    .bind(row.creation_date)
    .bind(row.completion_date)
    .bind(row.source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).context("invalid date");

    let tasks = vec![
        (
            "seed-001",
            "noa.levi",
            "Holocaust And Revival",
            1,
            TaskType::Flashcard,
            90,
            d(2026, 1, 5)?,
            Some(d(2026, 1, 5)?),
        ),
        (
            "seed-002",
            "noa.levi",
            "Holocaust And Revival",
            1,
            TaskType::Quiz,
            0,
            d(2026, 1, 6)?,
            None,
        ),
        (
            "seed-003",
            "amir.cohen",
            "Iron Swords",
            1,
            TaskType::Flashcard,
            80,
            d(2026, 1, 8)?,
            Some(d(2026, 1, 8)?),
        ),
        (
            "seed-004",
            "amir.cohen",
            "Iron Swords",
            1,
            TaskType::Quiz,
            75,
            d(2026, 1, 9)?,
            Some(d(2026, 1, 10)?),
        ),
        (
            "seed-005",
            "amir.cohen",
            "Iron Swords",
            1,
            TaskType::Post,
            70,
            d(2026, 1, 11)?,
            Some(d(2026, 1, 11)?),
        ),
        (
            "seed-006",
            "amir.cohen",
            "Iron Swords",
            1,
            TaskType::Conversation,
            85,
            d(2026, 1, 12)?,
            Some(d(2026, 1, 13)?),
        ),
        (
            "seed-007",
            "dana.mizrahi",
            "Society And Politics",
            2,
            TaskType::Post,
            0,
            d(2026, 1, 20)?,
            None,
        ),
    ];

    for (source_key, user_id, topic, level, task_type, task_score, created, completed) in tasks {
        let row = HistoryRow {
            source_key,
            user_id,
            topic: TopicName::parse(topic)?,
            level,
            task_type,
            task_score,
            creation_date: at_midnight(created)?,
            completion_date: completed.map(at_midnight).transpose()?,
        };
        insert_history_row(pool, &row).await?;
    }

    let words = vec![
        ("Holocaust And Revival", 1, "זיכרון", "memory"),
        ("Holocaust And Revival", 1, "תקומה", "revival"),
        ("Holocaust And Revival", 2, "עדות", "testimony"),
        ("Iron Swords", 1, "מילואים", "reserve duty"),
        ("Iron Swords", 1, "חוסן", "resilience"),
        ("Iron Swords", 2, "התנדבות", "volunteering"),
        ("Society And Politics", 1, "בחירות", "elections"),
        ("Society And Politics", 2, "ממשלה", "government"),
    ];

    for (topic, level, word, translation) in words {
        sqlx::query(
            r#"
            INSERT INTO unity_voice.words (word_id, topic_name, level, word, translation)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (topic_name, word) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(topic)
        .bind(level)
        .bind(word)
        .bind(translation)
        .execute(pool)
        .await?;
    }

    info!("seed data loaded");
    Ok(())
}

fn row_task_type(row_number: usize, raw: &str) -> anyhow::Result<TaskType> {
    raw.parse::<TaskType>()
        .with_context(|| format!("row {row_number} has a bad task type"))
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        user_id: String,
        topic_name: String,
        level: i32,
        task_type: String,
        task_score: i32,
        creation_date: NaiveDate,
        completion_date: Option<NaiveDate>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed row {}", index + 1))?;
        let topic = TopicName::parse(&row.topic_name)
            .with_context(|| format!("row {} has no topic", index + 1))?;
        let task_type = row_task_type(index + 1, &row.task_type)?;
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        let history = HistoryRow {
            source_key: &source_key,
            user_id: &row.user_id,
            topic,
            level: row.level,
            task_type,
            task_score: row.task_score,
            creation_date: at_midnight(row.creation_date)?,
            completion_date: row.completion_date.map(at_midnight).transpose()?,
        };
        if insert_history_row(pool, &history).await? {
            inserted += 1;
        }
    }

    Ok(inserted)
}
