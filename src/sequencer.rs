//! Picks the next learning activity for a learner in a topic.
//!
//! Within a level the activities run flashcard, quiz, post, conversation. The
//! learner resumes the most advanced activity at their highest level if it is still
//! open, otherwise moves on to the next activity, or to the next level's flashcards
//! once the conversation is done.

use tracing::{debug, info};

use crate::error::SequenceError;
use crate::models::{LevelPolicy, NextTask, Task, TaskType, DEFAULT_LEVEL};
use crate::store::{ProgressStore, TaskCreator};
use crate::topic::{are_equivalent, TopicName};

/// The most advanced task at the highest level present.
///
/// Later task types win; between tasks of the same type an open one wins.
pub fn most_advanced(tasks: &[Task]) -> Option<&Task> {
    let highest_level = tasks.iter().map(|task| task.level).max()?;
    tasks
        .iter()
        .filter(|task| task.level == highest_level)
        .max_by_key(|task| (task.task_type.position(), !task.is_completed()))
}

/// What the learner should do next in a topic, decided from their task history.
#[derive(Debug, Clone, Copy)]
pub enum Plan<'a> {
    /// The most advanced task is still open.
    Resume(&'a Task),
    /// A new task of this type at this level is due.
    Start(TaskType, i32),
    /// The last task type at the ceiling level is done.
    Finished(&'a Task),
}

/// `None` only when a non-empty history yields no most advanced task.
pub fn plan<'a>(tasks: &'a [Task], policy: &LevelPolicy) -> Option<Plan<'a>> {
    if tasks.is_empty() {
        return Some(Plan::Start(TaskType::Flashcard, DEFAULT_LEVEL));
    }

    let current = most_advanced(tasks)?;
    if !current.is_completed() {
        return Some(Plan::Resume(current));
    }

    Some(match current.task_type.next() {
        Some(next_type) => Plan::Start(next_type, current.level),
        None if current.level < policy.ceiling => {
            Plan::Start(TaskType::Flashcard, current.level + 1)
        }
        None => Plan::Finished(current),
    })
}

pub struct TaskSequencer<'a, C: ?Sized> {
    creator: &'a C,
    policy: LevelPolicy,
}

impl<'a, C> TaskSequencer<'a, C>
where
    C: TaskCreator + ?Sized,
{
    pub fn new(creator: &'a C, policy: LevelPolicy) -> Self {
        Self { creator, policy }
    }

    /// `tasks` is the learner's full history for `topic`.
    pub async fn next_task(
        &self,
        user_id: &str,
        topic: &TopicName,
        tasks: &[Task],
    ) -> Result<NextTask, SequenceError> {
        debug_assert!(tasks.iter().all(|task| {
            task.user_id == user_id
                && (task.topic_name == topic.as_given()
                    || are_equivalent(&task.topic_name, &topic.db_form()))
        }));

        let Some(step) = plan(tasks, &self.policy) else {
            return Err(SequenceError::Undetermined {
                user_id: user_id.to_string(),
                topic: topic.db_form(),
            });
        };

        match step {
            Plan::Start(task_type, level) => self.start(user_id, topic, task_type, level).await,
            Plan::Resume(current) => {
                debug!(
                    user_id,
                    topic = %topic,
                    task_type = %current.task_type,
                    level = current.level,
                    "resuming open task"
                );
                Ok(NextTask::from_task(current, false))
            }
            Plan::Finished(current) => {
                info!(
                    user_id,
                    topic = %topic,
                    level = current.level,
                    "topic finished at top level"
                );
                Ok(NextTask::from_task(current, false))
            }
        }
    }

    /// Reads the learner's history for the topic and picks the next task from it.
    pub async fn next_for_topic<S>(
        &self,
        store: &S,
        user_id: &str,
        topic: &TopicName,
    ) -> Result<NextTask, SequenceError>
    where
        S: ProgressStore + ?Sized,
    {
        let tasks = store.tasks_for_topic(user_id, topic).await?;
        self.next_task(user_id, topic, &tasks).await
    }

    async fn start(
        &self,
        user_id: &str,
        topic: &TopicName,
        task_type: TaskType,
        level: i32,
    ) -> Result<NextTask, SequenceError> {
        let task = self
            .creator
            .create_task(user_id, topic, task_type, level)
            .await?;
        info!(
            user_id,
            topic = %topic,
            task_type = %task.task_type,
            level = task.level,
            task_id = %task.task_id,
            "created next task"
        );
        Ok(NextTask::from_task(&task, true))
    }
}
