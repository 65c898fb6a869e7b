//! Overlapping text chunker.
//!
//! Splits document text into chunks of at most `chunk_size` characters where
//! every chunk after the first repeats the last `overlap` characters of its
//! predecessor. Cuts prefer the nearest paragraph, line, sentence, or word
//! boundary at or before the size limit, falling back to a hard cut.
//!
//! Each chunk carries its parent document path, ordinal index, and a SHA-256
//! hash of its text.

use sha2::{Digest, Sha256};

/// A bounded span of a source document, the unit of retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub document_path: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Split text into overlapping pieces.
///
/// Guarantees:
/// - empty text yields zero pieces;
/// - text of at most `chunk_size` characters yields exactly one piece;
/// - every interior boundary shares exactly `overlap` characters: each piece
///   after the first starts with the last `overlap` characters of the
///   previous piece.
///
/// `overlap` must be smaller than `chunk_size` (enforced by config
/// validation); cut positions are searched strictly past `start + overlap`
/// so the split always makes progress.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len == 0 {
        return Vec::new();
    }
    if len <= chunk_size {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + chunk_size).min(len);
        let end = if hard_end < len {
            find_cut(&chars, start + overlap + 1, hard_end)
        } else {
            hard_end
        };

        pieces.push(chars[start..end].iter().collect());

        if end == len {
            break;
        }
        start = end - overlap;
    }

    pieces
}

/// Split a document into [`Chunk`]s with contiguous indices starting at 0.
pub fn chunk_document(
    document_path: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(document_path, i as i64, piece))
        .collect()
}

fn make_chunk(document_path: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        document_path: document_path.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}

/// Find the best cut position in `(min_end, hard_end]`.
///
/// A cut at position `i` means the piece ends before `chars[i]`. Boundary
/// preference: paragraph break, line break, sentence end, word gap. Returns
/// `hard_end` when no boundary exists in the window.
fn find_cut(chars: &[char], min_end: usize, hard_end: usize) -> usize {
    let checks: [fn(&[char], usize) -> bool; 4] =
        [paragraph_at, line_at, sentence_at, space_at];

    for check in checks {
        let mut i = hard_end;
        while i > min_end {
            if check(chars, i) {
                return i;
            }
            i -= 1;
        }
    }

    hard_end
}

fn paragraph_at(chars: &[char], i: usize) -> bool {
    i >= 2 && chars[i - 1] == '\n' && chars[i - 2] == '\n'
}

fn line_at(chars: &[char], i: usize) -> bool {
    i >= 1 && chars[i - 1] == '\n'
}

fn sentence_at(chars: &[char], i: usize) -> bool {
    i >= 2 && chars[i - 2] == '.' && chars[i - 1] == ' '
}

fn space_at(chars: &[char], i: usize) -> bool {
    i >= 1 && chars[i - 1] == ' '
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_count(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn test_empty_text_zero_chunks() {
        assert!(split_text("", 1000, 150).is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let pieces = split_text("Hello, world!", 1000, 150);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], "Hello, world!");
    }

    #[test]
    fn test_exact_limit_single_chunk() {
        let text = "x".repeat(100);
        let pieces = split_text(&text, 100, 20);
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn test_interior_boundaries_overlap_exactly() {
        let text = (0..120)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let overlap = 15;
        let pieces = split_text(&text, 100, overlap);
        assert!(pieces.len() > 1);

        for pair in pieces.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let tail: String = prev[prev.len() - overlap..].iter().collect();
            let head: String = pair[1].chars().take(overlap).collect();
            assert_eq!(tail, head, "interior boundary must share exactly the overlap");
        }
    }

    #[test]
    fn test_pieces_reassemble_to_original() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let overlap = 30;
        let pieces = split_text(&text, 200, overlap);

        let mut rebuilt: String = pieces[0].clone();
        for piece in &pieces[1..] {
            rebuilt.extend(piece.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_pieces_respect_size_limit() {
        let text = "alpha beta gamma delta ".repeat(50);
        for piece in split_text(&text, 100, 20) {
            assert!(char_count(&piece) <= 100);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let mut text = String::new();
        text.push_str(&"a".repeat(60));
        text.push_str("\n\n");
        text.push_str(&"b".repeat(60));
        let pieces = split_text(&text, 100, 10);
        assert!(pieces[0].ends_with("\n\n"), "cut should land after the paragraph break");
    }

    #[test]
    fn test_hard_cut_without_boundaries() {
        let text = "z".repeat(250);
        let pieces = split_text(&text, 100, 20);
        assert!(pieces.len() > 1);
        assert_eq!(char_count(&pieces[0]), 100);
    }

    #[test]
    fn test_chunk_document_indices_and_hash() {
        let text = "one two three four five six seven eight nine ten ".repeat(10);
        let chunks = chunk_document("src/lib.rs", &text, 120, 20);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
            assert_eq!(c.document_path, "src/lib.rs");
            assert_eq!(c.hash.len(), 64);
        }

        let again = chunk_document("src/lib.rs", &text, 120, 20);
        for (a, b) in chunks.iter().zip(again.iter()) {
            assert_eq!(a.text, b.text);
            assert_eq!(a.hash, b.hash);
        }
    }

    #[test]
    fn test_multibyte_text_splits_on_char_units() {
        let text = "héllo wörld ünïcode ".repeat(20);
        let overlap = 10;
        let pieces = split_text(&text, 50, overlap);
        assert!(pieces.len() > 1);
        for pair in pieces.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let tail: String = prev[prev.len() - overlap..].iter().collect();
            let head: String = pair[1].chars().take(overlap).collect();
            assert_eq!(tail, head);
        }
    }
}
