use tracing::debug;
use uuid::Uuid;

use crate::models::Word;
use crate::store::{StoreResult, VocabularyStore};
use crate::topic::TopicName;

pub const MAX_SAMPLE: i64 = 50;

/// A random sample of the topic's words the learner has not learned yet.
///
/// `size` is clamped to `1..=MAX_SAMPLE`.
pub async fn sample_unlearned<S>(
    store: &S,
    user_id: &str,
    topic: &TopicName,
    level: Option<i32>,
    size: i64,
) -> StoreResult<Vec<Word>>
where
    S: VocabularyStore + ?Sized,
{
    let size = size.clamp(1, MAX_SAMPLE);
    let words = store.unlearned_words(user_id, topic, level, size).await?;
    debug!(
        user_id,
        topic = %topic,
        requested = size,
        returned = words.len(),
        "sampled unlearned words"
    );
    Ok(words)
}

pub async fn mark_learned<S>(store: &S, user_id: &str, word_ids: &[Uuid]) -> StoreResult<u64>
where
    S: VocabularyStore + ?Sized,
{
    if word_ids.is_empty() {
        return Ok(0);
    }
    store.mark_learned(user_id, word_ids).await
}
