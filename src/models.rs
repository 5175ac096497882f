use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::topic::TopicName;

pub const DEFAULT_LEVEL: i32 = 1;
pub const DEFAULT_LEVEL_CEILING: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Flashcard,
    Quiz,
    Post,
    Conversation,
}

impl TaskType {
    /// Progression order within a level.
    pub const ORDER: [TaskType; 4] = [
        TaskType::Flashcard,
        TaskType::Quiz,
        TaskType::Post,
        TaskType::Conversation,
    ];

    pub fn position(self) -> usize {
        match self {
            TaskType::Flashcard => 0,
            TaskType::Quiz => 1,
            TaskType::Post => 2,
            TaskType::Conversation => 3,
        }
    }

    pub fn next(self) -> Option<TaskType> {
        Self::ORDER.get(self.position() + 1).copied()
    }

    pub fn is_last(self) -> bool {
        self.next().is_none()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Flashcard => "flashcard",
            TaskType::Quiz => "quiz",
            TaskType::Post => "post",
            TaskType::Conversation => "conversation",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flashcard" => Ok(TaskType::Flashcard),
            "quiz" => Ok(TaskType::Quiz),
            "post" => Ok(TaskType::Post),
            "conversation" => Ok(TaskType::Conversation),
            other => Err(StoreError::UnknownTaskType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub user_id: String,
    pub topic_name: String,
    pub level: i32,
    pub task_type: TaskType,
    pub task_score: i32,
    pub creation_date: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.completion_date.is_some()
    }
}

/// Result of finishing a task; `newly_completed` is false when it was already done.
#[derive(Debug, Clone)]
pub struct FinishedTask {
    pub task: Task,
    pub newly_completed: bool,
}

/// Stored (user, topic) -> level mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionRecord {
    pub user_id: String,
    pub topic_name: String,
    pub level: i32,
    pub earned_score: i32,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextTask {
    pub task_id: Uuid,
    pub task_type: TaskType,
    pub level: i32,
    /// False when resuming an existing task.
    pub created: bool,
}

impl NextTask {
    pub fn from_task(task: &Task, created: bool) -> Self {
        Self {
            task_id: task.task_id,
            task_type: task.task_type,
            level: task.level,
            created,
        }
    }

    pub fn path(&self, topic: &TopicName) -> String {
        format!(
            "/topics/{}/tasks/{}/{}",
            topic.url_form(),
            self.task_type,
            self.level
        )
    }
}

/// Level bounds shared by level resolution and task sequencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelPolicy {
    pub ceiling: i32,
}

impl LevelPolicy {
    pub fn new(ceiling: i32) -> Self {
        Self {
            ceiling: ceiling.max(DEFAULT_LEVEL),
        }
    }

    pub fn clamp(&self, level: i32) -> i32 {
        level.clamp(DEFAULT_LEVEL, self.ceiling)
    }

    pub fn contains(&self, level: i32) -> bool {
        (DEFAULT_LEVEL..=self.ceiling).contains(&level)
    }

    pub fn next_level(&self, level: i32) -> i32 {
        self.clamp(level.saturating_add(1))
    }
}

impl Default for LevelPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL_CEILING)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub word_id: Uuid,
    pub topic_name: String,
    pub level: i32,
    pub word: String,
    pub translation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_types_follow_fixed_order() {
        assert_eq!(TaskType::Flashcard.next(), Some(TaskType::Quiz));
        assert_eq!(TaskType::Quiz.next(), Some(TaskType::Post));
        assert_eq!(TaskType::Post.next(), Some(TaskType::Conversation));
        assert_eq!(TaskType::Conversation.next(), None);
        assert!(TaskType::Conversation.is_last());
        assert!(TaskType::Flashcard < TaskType::Conversation);
    }

    #[test]
    fn task_type_parses_case_insensitively() {
        assert_eq!("Quiz".parse::<TaskType>().unwrap(), TaskType::Quiz);
        assert!("essay".parse::<TaskType>().is_err());
    }

    #[test]
    fn policy_caps_next_level() {
        let policy = LevelPolicy::default();
        assert_eq!(policy.next_level(1), 2);
        assert_eq!(policy.next_level(3), 3);
        assert_eq!(policy.clamp(0), 1);
        assert!(!policy.contains(4));
    }

    #[test]
    fn path_uses_url_form() {
        let topic = TopicName::parse("Holocaust And Revival").unwrap();
        let next = NextTask {
            task_id: Uuid::new_v4(),
            task_type: TaskType::Quiz,
            level: 2,
            created: false,
        };
        assert_eq!(next.path(&topic), "/topics/holocaust-and-revival/tasks/quiz/2");
    }
}
