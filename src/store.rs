//! Storage seams for progression and vocabulary data.
//!
//! Every operation re-reads from storage; nothing here caches state between calls.
//! Topic arguments are matched tolerantly, so either spelling of a topic finds the
//! same rows.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{FinishedTask, ProgressionRecord, Task, TaskType, Word};
use crate::topic::TopicName;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Highest level among the user's progression records for the topic.
    async fn highest_recorded_level(
        &self,
        user_id: &str,
        topic: &TopicName,
    ) -> StoreResult<Option<i32>>;

    /// Highest level among the user's completed tasks for the topic.
    async fn highest_completed_level(
        &self,
        user_id: &str,
        topic: &TopicName,
    ) -> StoreResult<Option<i32>>;

    /// Lowest level among the user's open tasks for the topic.
    async fn lowest_open_level(&self, user_id: &str, topic: &TopicName)
        -> StoreResult<Option<i32>>;

    /// Insert the record, or overwrite level, score and completion time on conflict.
    async fn upsert_progression(&self, record: &ProgressionRecord) -> StoreResult<()>;

    async fn tasks_for_topic(&self, user_id: &str, topic: &TopicName) -> StoreResult<Vec<Task>>;

    async fn tasks_for_user(&self, user_id: &str) -> StoreResult<Vec<Task>>;

    async fn progress_for_user(&self, user_id: &str) -> StoreResult<Vec<ProgressionRecord>>;

    /// Marks an open task completed now with the given score. A task that is already
    /// completed is returned unchanged. `None` if no such task.
    async fn complete_task(&self, task_id: Uuid, score: i32)
        -> StoreResult<Option<FinishedTask>>;
}

#[async_trait]
pub trait TaskCreator: Send + Sync {
    async fn create_task(
        &self,
        user_id: &str,
        topic: &TopicName,
        task_type: TaskType,
        level: i32,
    ) -> StoreResult<Task>;
}

#[async_trait]
pub trait VocabularyStore: Send + Sync {
    /// Up to `limit` words of the topic, in random order, that the user has not learned.
    async fn unlearned_words(
        &self,
        user_id: &str,
        topic: &TopicName,
        level: Option<i32>,
        limit: i64,
    ) -> StoreResult<Vec<Word>>;

    /// Returns how many words were newly marked.
    async fn mark_learned(&self, user_id: &str, word_ids: &[Uuid]) -> StoreResult<u64>;
}
