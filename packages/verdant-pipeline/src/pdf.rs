use lopdf::Document;
use verdant_chunking::PageText;

use crate::Result;

/// Extracts per-page text from a PDF. Pages whose text cannot be decoded are
/// skipped rather than failing the document; blank pages are dropped.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>> {
	let doc = Document::load_mem(bytes)?;
	let mut pages = Vec::new();

	for (page_no, _) in doc.get_pages() {
		let text = match doc.extract_text(&[page_no]) {
			Ok(text) => text,
			Err(err) => {
				tracing::warn!(page_no, error = %err, "Skipping page with unextractable text.");

				continue;
			},
		};
		let trimmed = text.trim();

		if trimmed.is_empty() {
			continue;
		}

		pages.push(PageText { page_no: page_no as i32, text: trimmed.to_string() });
	}

	Ok(pages)
}
