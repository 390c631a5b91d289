//! Paragraph-boundary text chunker with overlap.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` tokens
//! (approximated as 4 characters per token). Paragraphs (`\n\n`) are packed
//! greedily; a paragraph larger than a chunk is hard-split at a newline or
//! space. Each chunk after the first starts with the last `chunk_overlap`
//! tokens of its predecessor, cut at a word boundary where possible.
//!
//! All cuts land on UTF-8 character boundaries.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Splits `text` from document `source` into chunks with contiguous indices
/// starting at 0. Blank text yields no chunks.
pub fn chunk_text(source: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let max_chars = chunk_size.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = chunk_overlap.min(chunk_size.saturating_sub(1)) * CHARS_PER_TOKEN;

    let pieces = split_pieces(text, max_chars);

    let mut chunks = Vec::with_capacity(pieces.len());
    let mut previous: Option<&str> = None;
    for piece in &pieces {
        let body = match previous {
            Some(prev) if overlap_chars > 0 => {
                let tail = overlap_tail(prev, overlap_chars);
                if tail.is_empty() {
                    piece.clone()
                } else {
                    format!("{} {}", tail, piece)
                }
            }
            _ => piece.clone(),
        };
        chunks.push(make_chunk(source, chunks.len() as i64, &body));
        previous = Some(piece.as_str());
    }
    chunks
}

/// Packs paragraphs into pieces of at most `max_chars` bytes.
fn split_pieces(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current.is_empty() {
            trimmed.len()
        } else {
            current.len() + 2 + trimmed.len()
        };
        if would_be > max_chars && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }

        if trimmed.len() > max_chars {
            let mut remaining = trimmed;
            while !remaining.is_empty() {
                let split_at = floor_char_boundary(remaining, max_chars.min(remaining.len()));
                let cut = if split_at < remaining.len() {
                    remaining[..split_at]
                        .rfind('\n')
                        .or_else(|| remaining[..split_at].rfind(' '))
                        .map(|pos| pos + 1)
                        .unwrap_or(split_at)
                } else {
                    split_at
                };
                // A single character wider than max_chars
                let cut = if cut == 0 {
                    remaining
                        .char_indices()
                        .nth(1)
                        .map(|(i, _)| i)
                        .unwrap_or(remaining.len())
                } else {
                    cut
                };
                let piece = remaining[..cut].trim();
                if !piece.is_empty() {
                    pieces.push(piece.to_string());
                }
                remaining = &remaining[cut..];
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(trimmed);
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// The last `max_chars` bytes of `text`, advanced to the next word start.
fn overlap_tail(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut start = text.len() - max_chars;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let tail = &text[start..];
    match tail.find(char::is_whitespace) {
        Some(pos) if pos + 1 < tail.len() => tail[pos..].trim_start(),
        _ => tail,
    }
}

/// Largest char boundary `<= index`.
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
