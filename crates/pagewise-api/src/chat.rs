use axum::{
    Extension,
    body::{Body, Bytes},
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pagewise_db::models::MessageRow;
use pagewise_services::llm::{ChatMessage, CompletionStream};
use pagewise_services::vector::ScoredPage;
use pagewise_types::api::{Claims, SendMessageRequest};

use crate::state::{AppState, with_db};

/// Previous messages fed back to the model.
pub const CHAT_HISTORY_LIMIT: u32 = 6;

/// Pages retrieved from the vector index per question.
pub const SIMILARITY_TOP_K: usize = 4;

const SYSTEM_PROMPT: &str = "Use the following pieces of context (or previous conversation if needed) to answer the users question in markdown format.";

/// POST /api/message: Ask a question about one of the caller's PDFs.
///
/// The answer is streamed back as plain text while it is generated and
/// stored as an assistant message once the model has finished.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> Result<Response, StatusCode> {
    // Parsed by hand so a missing content type is not a rejection.
    let req: SendMessageRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!("Bad message body: {}", e);
        StatusCode::BAD_REQUEST
    })?;
    let question = req.message.trim().to_string();
    if question.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user_id = claims.sub.clone();
    let file_id = req.file_id.clone();
    let history = {
        let (user_id, file_id, question) = (user_id.clone(), file_id.clone(), question.clone());
        with_db(&state, move |db| {
            if db.get_file(&file_id, &user_id)?.is_none() {
                return Ok(None);
            }
            let history = db.recent_messages(&file_id, &user_id, CHAT_HISTORY_LIMIT)?;
            let message_id = Uuid::new_v4().to_string();
            db.insert_message(&message_id, &file_id, &user_id, &question, true)?;
            Ok(Some(history))
        })
        .await?
        .ok_or(StatusCode::NOT_FOUND)?
    };

    let query_vector = state.embedder.embed_query(&question).await.map_err(|e| {
        error!("Embedding the question failed: {}", e);
        StatusCode::BAD_GATEWAY
    })?;

    let pages = state
        .vectors
        .query(&file_id, query_vector, SIMILARITY_TOP_K)
        .await
        .map_err(|e| {
            error!(file_id = %file_id, "Similarity query failed: {}", e);
            StatusCode::BAD_GATEWAY
        })?;

    let prompt = build_prompt(&history, &pages, &question);
    let completion = state.chat_model.stream_completion(prompt).await.map_err(|e| {
        error!("Chat completion request failed: {}", e);
        StatusCode::BAD_GATEWAY
    })?;

    info!(file_id = %file_id, user_id = %user_id, context_pages = pages.len(), "Streaming answer");

    let body = relay_completion(state, file_id, user_id, completion);
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response())
}

/// Assemble the conversation sent to the model.
pub fn build_prompt(history: &[MessageRow], pages: &[ScoredPage], question: &str) -> Vec<ChatMessage> {
    let previous: String = history
        .iter()
        .map(|m| {
            if m.is_user_message {
                format!("User: {}\n", m.text)
            } else {
                format!("Assistant: {}\n", m.text)
            }
        })
        .collect();

    let context = pages
        .iter()
        .map(ScoredPage::text)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    let user_turn = format!(
        "Use the following pieces of context (or previous conversation if needed) to answer the users question in markdown format. \
         \nIf you don't know the answer, just say that you don't know, don't try to make up an answer.\n\
         \n----------------\n\n\
         PREVIOUS CONVERSATION:\n{previous}\n\
         \n----------------\n\n\
         CONTEXT:\n{context}\n\n\
         USER INPUT: {question}"
    );

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user_turn)]
}

/// Forward completion fragments to the HTTP body and persist the full
/// answer when the model is done.
///
/// The upstream stream is driven by its own task, so the answer is still
/// stored if the caller disconnects halfway through. The body only ends
/// after the answer has been written.
fn relay_completion(
    state: AppState,
    file_id: String,
    user_id: String,
    mut completion: CompletionStream,
) -> Body {
    let (tx, mut rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(32);

    tokio::spawn(async move {
        let mut answer = String::new();
        let mut client_gone = false;

        while let Some(fragment) = completion.next().await {
            match fragment {
                Ok(text) => {
                    answer.push_str(&text);
                    if !client_gone && tx.send(Ok(Bytes::from(text))).await.is_err() {
                        debug!(file_id = %file_id, "Client went away; finishing answer in background");
                        client_gone = true;
                    }
                }
                Err(e) => {
                    error!(file_id = %file_id, "Completion stream failed: {}", e);
                    let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                    return;
                }
            }
        }

        if answer.is_empty() {
            warn!(file_id = %file_id, "Model returned an empty answer; nothing stored");
            return;
        }

        let message_id = Uuid::new_v4().to_string();
        let stored = with_db(&state, move |db| {
            db.insert_message(&message_id, &file_id, &user_id, &answer, false)
        })
        .await;
        if stored.is_err() {
            error!("Failed to store assistant answer");
        }
    });

    let stream = async_stream::stream! {
        while let Some(item) = rx.recv().await {
            yield item;
        }
    };
    Body::from_stream(stream)
}
