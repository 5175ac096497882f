//! In-memory store for tests, with injectable read and write failures.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{FinishedTask, ProgressionRecord, Task, TaskType, Word};
use crate::store::{ProgressStore, StoreResult, TaskCreator, VocabularyStore};
use crate::topic::{are_equivalent, TopicName};

#[derive(Default)]
struct State {
    records: Vec<ProgressionRecord>,
    tasks: Vec<Task>,
    words: Vec<Word>,
    learned: HashSet<(String, Uuid)>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryStore {
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn put_record(&self, user_id: &str, topic_name: &str, level: i32) {
        self.state.lock().unwrap().records.push(ProgressionRecord {
            user_id: user_id.to_string(),
            topic_name: topic_name.to_string(),
            level,
            earned_score: 0,
            completed_at: None,
        });
    }

    pub fn record(&self, user_id: &str, topic_name: &str) -> Option<ProgressionRecord> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|r| r.user_id == user_id && are_equivalent(&r.topic_name, topic_name))
            .cloned()
    }

    pub fn records(&self) -> Vec<ProgressionRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().unwrap().tasks.clone()
    }

    pub fn add_task(
        &self,
        user_id: &str,
        topic_name: &str,
        level: i32,
        task_type: TaskType,
        completed: bool,
    ) -> Task {
        let mut state = self.state.lock().unwrap();
        let created = Utc::now() - Duration::days(30) + Duration::minutes(state.tasks.len() as i64);
        let task = Task {
            task_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            topic_name: topic_name.to_string(),
            level,
            task_type,
            task_score: if completed { 80 } else { 0 },
            creation_date: created,
            completion_date: completed.then(|| created + Duration::hours(1)),
        };
        state.tasks.push(task.clone());
        task
    }

    pub fn add_word(&self, topic_name: &str, level: i32, word: &str) -> Word {
        let word = Word {
            word_id: Uuid::new_v4(),
            topic_name: topic_name.to_string(),
            level,
            word: word.to_string(),
            translation: format!("{word} (en)"),
        };
        self.state.lock().unwrap().words.push(word.clone());
        word
    }

    fn read(&self) -> StoreResult<std::sync::MutexGuard<'_, State>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.state.lock().unwrap())
    }

    fn write(&self) -> StoreResult<std::sync::MutexGuard<'_, State>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.state.lock().unwrap())
    }
}

fn matches_topic(stored: &str, topic: &TopicName) -> bool {
    stored == topic.as_given() || are_equivalent(stored, &topic.db_form())
}

#[async_trait]
impl ProgressStore for MemoryStore {
    async fn highest_recorded_level(
        &self,
        user_id: &str,
        topic: &TopicName,
    ) -> StoreResult<Option<i32>> {
        let state = self.read()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.user_id == user_id && matches_topic(&r.topic_name, topic))
            .map(|r| r.level)
            .max())
    }

    async fn highest_completed_level(
        &self,
        user_id: &str,
        topic: &TopicName,
    ) -> StoreResult<Option<i32>> {
        let state = self.read()?;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id && matches_topic(&t.topic_name, topic))
            .filter(|t| t.is_completed())
            .map(|t| t.level)
            .max())
    }

    async fn lowest_open_level(
        &self,
        user_id: &str,
        topic: &TopicName,
    ) -> StoreResult<Option<i32>> {
        let state = self.read()?;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id && matches_topic(&t.topic_name, topic))
            .filter(|t| !t.is_completed())
            .map(|t| t.level)
            .min())
    }

    async fn upsert_progression(&self, record: &ProgressionRecord) -> StoreResult<()> {
        let mut state = self.write()?;
        let existing = state
            .records
            .iter()
            .position(|r| r.user_id == record.user_id && r.topic_name == record.topic_name);
        match existing {
            Some(index) => state.records[index] = record.clone(),
            None => state.records.push(record.clone()),
        }
        Ok(())
    }

    async fn tasks_for_topic(&self, user_id: &str, topic: &TopicName) -> StoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id && matches_topic(&t.topic_name, topic))
            .cloned()
            .collect())
    }

    async fn tasks_for_user(&self, user_id: &str) -> StoreResult<Vec<Task>> {
        let state = self.read()?;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn progress_for_user(&self, user_id: &str) -> StoreResult<Vec<ProgressionRecord>> {
        let state = self.read()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn complete_task(
        &self,
        task_id: Uuid,
        score: i32,
    ) -> StoreResult<Option<FinishedTask>> {
        let mut state = self.write()?;
        Ok(state
            .tasks
            .iter_mut()
            .find(|t| t.task_id == task_id)
            .map(|task| {
                let newly_completed = !task.is_completed();
                if newly_completed {
                    task.completion_date = Some(Utc::now());
                    task.task_score = score;
                }
                FinishedTask {
                    task: task.clone(),
                    newly_completed,
                }
            }))
    }
}

#[async_trait]
impl TaskCreator for MemoryStore {
    async fn create_task(
        &self,
        user_id: &str,
        topic: &TopicName,
        task_type: TaskType,
        level: i32,
    ) -> StoreResult<Task> {
        let mut state = self.write()?;
        let task = Task {
            task_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            topic_name: topic.db_form(),
            level,
            task_type,
            task_score: 0,
            creation_date: Utc::now(),
            completion_date: None,
        };
        state.tasks.push(task.clone());
        Ok(task)
    }
}

#[async_trait]
impl VocabularyStore for MemoryStore {
    async fn unlearned_words(
        &self,
        user_id: &str,
        topic: &TopicName,
        level: Option<i32>,
        limit: i64,
    ) -> StoreResult<Vec<Word>> {
        let state = self.read()?;
        Ok(state
            .words
            .iter()
            .filter(|w| matches_topic(&w.topic_name, topic))
            .filter(|w| level.map_or(true, |level| w.level == level))
            .filter(|w| !state.learned.contains(&(user_id.to_string(), w.word_id)))
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn mark_learned(&self, user_id: &str, word_ids: &[Uuid]) -> StoreResult<u64> {
        let mut state = self.write()?;
        let mut inserted = 0;
        for word_id in word_ids {
            if state.learned.insert((user_id.to_string(), *word_id)) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
