use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("topic name is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unknown task type: {0}")]
    UnknownTaskType(String),
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("could not determine next task for {user_id} in {topic}")]
    Undetermined { user_id: String, topic: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}
