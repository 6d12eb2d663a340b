use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::MessageSender;
use crate::cache::MessageCache;
use crate::error::ClientError;

/// A message that did not go through. `unsent` holds the text so it can
/// be put back into the input box.
#[derive(Debug, Error)]
#[error("message not sent: {source}")]
pub struct SendError {
    pub unsent: String,
    #[source]
    pub source: ClientError,
}

/// Send `text` about the cache's file, updating the cache optimistically.
///
/// The user's message shows up at once and the answer grows in place as
/// fragments arrive. If the request or the stream fails, the cache is put
/// back exactly as it was. Either way it is marked stale afterwards.
/// Returns the full answer.
pub async fn send_message(
    cache: &mut MessageCache,
    sender: &dyn MessageSender,
    text: &str,
) -> Result<String, SendError> {
    let snapshot = cache.snapshot();
    cache.insert_user_message(text);

    let result = stream_answer(cache, sender, text).await;
    if let Err(e) = &result {
        warn!(file_id = cache.file_id(), "Send failed, reverting: {}", e);
        cache.restore(snapshot);
    }
    cache.mark_stale();

    result.map_err(|source| SendError {
        unsent: text.to_string(),
        source,
    })
}

async fn stream_answer(
    cache: &mut MessageCache,
    sender: &dyn MessageSender,
    text: &str,
) -> Result<String, ClientError> {
    let mut stream = sender.send_message(cache.file_id(), text).await?;

    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        cache.push_answer_fragment(&fragment);
        answer.push_str(&fragment);
    }

    debug!(file_id = cache.file_id(), len = answer.len(), "Answer received");
    Ok(answer)
}
