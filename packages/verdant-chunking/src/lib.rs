use unicode_segmentation::UnicodeSegmentation;

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
	pub max_words: u32,
	pub overlap_words: u32,
}

/// Text of a single report page, as extracted from the source PDF.
#[derive(Clone, Debug)]
pub struct PageText {
	pub page_no: i32,
	pub text: String,
}

/// A retrieval unit. `chunk_index` is unique and ascending across the whole
/// document; `page_no` is the page the chunk starts on.
#[derive(Clone, Debug)]
pub struct Chunk {
	pub chunk_index: i32,
	pub page_no: i32,
	pub text: String,
}

/// Splits page texts into sentence-bounded chunks of at most `max_words`
/// words, with `overlap_words` words carried over between adjacent chunks of
/// the same page. Chunks never span page boundaries so citations stay exact.
pub fn split_pages(pages: &[PageText], cfg: &ChunkingConfig) -> Vec<Chunk> {
	let mut chunks = Vec::new();
	let mut chunk_index = 0_i32;

	for page in pages {
		for text in split_page(&page.text, cfg) {
			chunks.push(Chunk { chunk_index, page_no: page.page_no, text });

			chunk_index += 1;
		}
	}

	chunks
}

fn split_page(text: &str, cfg: &ChunkingConfig) -> Vec<String> {
	let mut out = Vec::new();
	let mut current = String::new();
	let mut current_words = 0_usize;

	for sentence in text.split_sentence_bounds() {
		let sentence_words = word_count(sentence);

		if sentence_words == 0 {
			continue;
		}

		if current_words + sentence_words > cfg.max_words as usize && !current.is_empty() {
			let overlap = overlap_tail(&current, cfg.overlap_words as usize);

			out.push(std::mem::take(&mut current).trim().to_string());

			current_words = word_count(&overlap);
			current = overlap;
		}

		current.push_str(sentence);

		current_words += sentence_words;
	}

	let trimmed = current.trim();

	if !trimmed.is_empty() {
		out.push(trimmed.to_string());
	}

	out
}

fn word_count(text: &str) -> usize {
	text.unicode_words().count()
}

fn overlap_tail(text: &str, overlap_words: usize) -> String {
	if overlap_words == 0 {
		return String::new();
	}

	let indices: Vec<usize> = text.unicode_word_indices().map(|(idx, _)| idx).collect();
	let Some(&start) = indices.get(indices.len().saturating_sub(overlap_words)) else {
		return String::new();
	};

	text[start..].to_string()
}
