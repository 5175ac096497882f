//! Level resolution.
//!
//! A learner's level in a topic comes from the first source that knows about it:
//! the stored progression record, then completed tasks, then open tasks. When none
//! does, the learner starts at level 1. Every resolution that did not come from the
//! progression record writes one back, so the next lookup short-circuits.
//!
//! Resolution never fails. Missing input and storage errors both resolve to the
//! default level, and a failed write-back does not change the level returned.

use std::fmt;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{LevelPolicy, ProgressionRecord, Task, DEFAULT_LEVEL};
use crate::store::{ProgressStore, StoreResult};
use crate::topic::TopicName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    ProgressionRecord,
    CompletedTasks,
    OpenTasks,
    Default,
    /// Input was missing or a lookup failed.
    Fallback,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::ProgressionRecord => "progression_record",
            Source::CompletedTasks => "completed_tasks",
            Source::OpenTasks => "open_tasks",
            Source::Default => "default",
            Source::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    NotAttempted,
    Written,
    Failed(String),
}

impl fmt::Display for WriteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteOutcome::NotAttempted => f.write_str("not written"),
            WriteOutcome::Written => f.write_str("written back"),
            WriteOutcome::Failed(reason) => write!(f, "write-back failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub task: Task,
    /// The task had been completed before this call and was left untouched.
    pub already_completed: bool,
    /// Set when finishing the task moved the learner's stored level.
    pub advanced_to: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub level: i32,
    pub source: Source,
    pub write: WriteOutcome,
}

impl Resolution {
    fn fallback() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            source: Source::Fallback,
            write: WriteOutcome::NotAttempted,
        }
    }
}

/// One lookup in the resolution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    ProgressionRecord,
    CompletedTasks,
    OpenTasks,
}

const STRATEGIES: [Strategy; 3] = [
    Strategy::ProgressionRecord,
    Strategy::CompletedTasks,
    Strategy::OpenTasks,
];

impl Strategy {
    fn source(self) -> Source {
        match self {
            Strategy::ProgressionRecord => Source::ProgressionRecord,
            Strategy::CompletedTasks => Source::CompletedTasks,
            Strategy::OpenTasks => Source::OpenTasks,
        }
    }

    async fn lookup<S>(self, store: &S, user_id: &str, topic: &TopicName) -> StoreResult<Option<i32>>
    where
        S: ProgressStore + ?Sized,
    {
        match self {
            Strategy::ProgressionRecord => store.highest_recorded_level(user_id, topic).await,
            Strategy::CompletedTasks => store.highest_completed_level(user_id, topic).await,
            Strategy::OpenTasks => store.lowest_open_level(user_id, topic).await,
        }
    }

    /// Level implied by what the lookup found.
    fn derive(self, found: Option<i32>, policy: &LevelPolicy) -> Option<i32> {
        let found = found?;
        Some(match self {
            Strategy::ProgressionRecord | Strategy::OpenTasks => policy.clamp(found),
            Strategy::CompletedTasks => policy.next_level(found),
        })
    }

    fn writes_back(self) -> bool {
        !matches!(self, Strategy::ProgressionRecord)
    }

    /// Completed-task resolutions stamp the completion time.
    fn stamps_completion(self) -> bool {
        matches!(self, Strategy::CompletedTasks)
    }
}

pub struct LevelResolver<'a, S: ?Sized> {
    store: &'a S,
    policy: LevelPolicy,
}

impl<'a, S> LevelResolver<'a, S>
where
    S: ProgressStore + ?Sized,
{
    pub fn new(store: &'a S, policy: LevelPolicy) -> Self {
        Self { store, policy }
    }

    /// The learner's level, or 1 when it cannot be determined.
    pub async fn resolve_level(&self, user_id: &str, topic_name: &str) -> i32 {
        self.resolve(user_id, topic_name).await.level
    }

    pub async fn resolve(&self, user_id: &str, topic_name: &str) -> Resolution {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            debug!("level requested without a user id");
            return Resolution::fallback();
        }
        let topic = match TopicName::parse(topic_name) {
            Ok(topic) => topic,
            Err(err) => {
                debug!(user_id, error = %err, "level requested without a topic");
                return Resolution::fallback();
            }
        };

        for strategy in STRATEGIES {
            let found = match strategy.lookup(self.store, user_id, &topic).await {
                Ok(found) => found,
                Err(err) => {
                    warn!(
                        user_id,
                        topic = %topic,
                        source = strategy.source().as_str(),
                        error = %err,
                        "level lookup failed, using default level"
                    );
                    return Resolution::fallback();
                }
            };

            if let Some(level) = strategy.derive(found, &self.policy) {
                let write = if strategy.writes_back() {
                    self.write_back(user_id, &topic, level, strategy.stamps_completion())
                        .await
                } else {
                    WriteOutcome::NotAttempted
                };
                info!(
                    user_id,
                    topic = %topic,
                    source = strategy.source().as_str(),
                    level,
                    "level resolved"
                );
                return Resolution {
                    level,
                    source: strategy.source(),
                    write,
                };
            }
        }

        let write = self.write_back(user_id, &topic, DEFAULT_LEVEL, false).await;
        info!(
            user_id,
            topic = %topic,
            source = Source::Default.as_str(),
            level = DEFAULT_LEVEL,
            "no history for topic, starting at default level"
        );
        Resolution {
            level: DEFAULT_LEVEL,
            source: Source::Default,
            write,
        }
    }

    async fn write_back(
        &self,
        user_id: &str,
        topic: &TopicName,
        level: i32,
        stamp_completion: bool,
    ) -> WriteOutcome {
        let record = ProgressionRecord {
            user_id: user_id.to_string(),
            topic_name: topic.db_form(),
            level,
            earned_score: 0,
            completed_at: stamp_completion.then(Utc::now),
        };

        match self.store.upsert_progression(&record).await {
            Ok(()) => WriteOutcome::Written,
            Err(err) => {
                warn!(user_id, topic = %topic, level, error = %err, "progression write-back failed");
                WriteOutcome::Failed(err.to_string())
            }
        }
    }

    /// Stores a level directly. False on missing input, out-of-range level, or storage error.
    pub async fn update_level(
        &self,
        user_id: &str,
        topic_name: &str,
        level: i32,
        earned_score: Option<i32>,
    ) -> bool {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            warn!("level update without a user id");
            return false;
        }
        let topic = match TopicName::parse(topic_name) {
            Ok(topic) => topic,
            Err(err) => {
                warn!(user_id, error = %err, "level update without a topic");
                return false;
            }
        };
        if !self.policy.contains(level) {
            warn!(user_id, topic = %topic, level, "level out of range");
            return false;
        }

        let record = ProgressionRecord {
            user_id: user_id.to_string(),
            topic_name: topic.db_form(),
            level,
            earned_score: earned_score.unwrap_or(0),
            completed_at: Some(Utc::now()),
        };

        match self.store.upsert_progression(&record).await {
            Ok(()) => {
                info!(user_id, topic = %topic, level, "level updated");
                true
            }
            Err(err) => {
                warn!(user_id, topic = %topic, level, error = %err, "level update failed");
                false
            }
        }
    }

    /// Records a finished activity.
    ///
    /// Finishing a level's conversation stores the next level, but only when that is
    /// above the level already stored. Re-finishing a completed task changes nothing.
    pub async fn complete_task(&self, task_id: Uuid, score: i32) -> StoreResult<Option<Completion>> {
        let Some(finished) = self.store.complete_task(task_id, score).await? else {
            warn!(%task_id, "no task to complete");
            return Ok(None);
        };
        let task = finished.task;

        if !finished.newly_completed {
            debug!(%task_id, "task was already completed");
            return Ok(Some(Completion {
                task,
                already_completed: true,
                advanced_to: None,
            }));
        }
        info!(
            %task_id,
            user_id = %task.user_id,
            task_type = %task.task_type,
            level = task.level,
            score,
            "task completed"
        );

        let mut advanced_to = None;
        if task.task_type.is_last() {
            let level = self.policy.next_level(task.level);
            // An unparseable topic leaves `stored` empty; `update_level` rejects it.
            let stored = match TopicName::parse(&task.topic_name) {
                Ok(topic) => self.store.highest_recorded_level(&task.user_id, &topic).await?,
                Err(_) => None,
            };

            if stored.map_or(true, |stored| level > stored) {
                if self
                    .update_level(&task.user_id, &task.topic_name, level, Some(score))
                    .await
                {
                    advanced_to = Some(level);
                }
            } else {
                debug!(%task_id, level, ?stored, "stored level already at or above next level");
            }
        }

        Ok(Some(Completion {
            task,
            already_completed: false,
            advanced_to,
        }))
    }
}
