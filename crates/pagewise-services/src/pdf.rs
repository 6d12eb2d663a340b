use lopdf::Document;
use tracing::{debug, warn};

use crate::error::{Result, ServiceError};

/// Text of a single PDF page. `number` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Load a PDF from memory and extract the text of every page, in order.
///
/// Pages whose text cannot be decoded come back empty instead of failing
/// the whole document; a document with no text at all is an error.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>> {
    let doc = Document::load_mem(bytes)?;

    let pages: Vec<PageText> = doc
        .get_pages()
        .keys()
        .map(|&number| {
            let text = doc.extract_text(&[number]).unwrap_or_else(|e| {
                warn!(page = number, "Failed to extract page text: {}", e);
                String::new()
            });
            PageText { number, text: normalize_whitespace(&text) }
        })
        .collect();

    debug!(pages = pages.len(), "Extracted PDF text");

    if pages.iter().all(|p| p.text.is_empty()) {
        return Err(ServiceError::EmptyDocument);
    }
    Ok(pages)
}

fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
