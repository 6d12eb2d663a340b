//! Local copy of a file's paginated message listing.
//!
//! Pages are kept newest first, and so are the messages inside each page,
//! matching what the listing endpoint returns. Sending a message edits the
//! copy in place before the server has answered; see [`crate::chat`].

use chrono::Utc;
use uuid::Uuid;

use pagewise_types::api::FileMessagesResponse;
use pagewise_types::models::Message;

/// Id of the assistant message being streamed in.
pub const AI_RESPONSE_ID: &str = "ai-response";

#[derive(Debug, Clone, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub next_cursor: Option<String>,
}

impl From<FileMessagesResponse> for MessagePage {
    fn from(res: FileMessagesResponse) -> Self {
        Self {
            messages: res.messages,
            next_cursor: res.next_cursor,
        }
    }
}

/// Saved cache contents, restored when a send fails.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot(Option<Vec<MessagePage>>);

#[derive(Debug, Default)]
pub struct MessageCache {
    file_id: String,
    /// `None` until the first page is loaded.
    pages: Option<Vec<MessagePage>>,
    stale: bool,
}

impl MessageCache {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            pages: None,
            stale: false,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn is_loaded(&self) -> bool {
        self.pages.is_some()
    }

    pub fn pages(&self) -> &[MessagePage] {
        self.pages.as_deref().unwrap_or_default()
    }

    /// Every cached message, newest first.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.pages().iter().flat_map(|page| page.messages.iter())
    }

    /// Cursor for the next older page, if the server reported one.
    pub fn next_cursor(&self) -> Option<&str> {
        self.pages().last().and_then(|page| page.next_cursor.as_deref())
    }

    /// Replace everything with a freshly fetched first page.
    pub fn reset(&mut self, first: FileMessagesResponse) {
        self.pages = Some(vec![first.into()]);
        self.stale = false;
    }

    /// Add the next older page.
    pub fn append_page(&mut self, page: FileMessagesResponse) {
        self.pages.get_or_insert_with(Vec::new).push(page.into());
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot(self.pages.clone())
    }

    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        self.pages = snapshot.0;
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Whether the next read should refetch from the server.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn push_front(&mut self, message: Message) {
        if let Some(first) = self.pages.as_mut().and_then(|pages| pages.first_mut()) {
            first.messages.insert(0, message);
        }
    }

    /// Show the user's message immediately, before the server has it.
    pub fn insert_user_message(&mut self, text: &str) -> Message {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            is_user_message: true,
            created_at: Utc::now(),
        };
        self.push_front(message.clone());
        message
    }

    /// Add a fragment of the assistant's answer.
    ///
    /// The first fragment creates the placeholder message; later ones are
    /// appended to it.
    pub fn push_answer_fragment(&mut self, fragment: &str) {
        let Some(first) = self.pages.as_mut().and_then(|pages| pages.first_mut()) else {
            return;
        };

        match first.messages.iter_mut().find(|m| m.id == AI_RESPONSE_ID) {
            Some(placeholder) => placeholder.text.push_str(fragment),
            None => first.messages.insert(
                0,
                Message {
                    id: AI_RESPONSE_ID.to_string(),
                    text: fragment.to_string(),
                    is_user_message: false,
                    created_at: Utc::now(),
                },
            ),
        }
    }
}
