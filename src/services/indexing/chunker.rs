/// A bounded contiguous text slice produced by the sliding-window split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub content: String,
    pub start_pos: usize,
    pub end_pos: usize,
}

/// Char-granularity sliding-window chunker. Near-identical to
/// `document/chunker.rs::TextChunker` in the teacher; `window`/`overlap`
/// take the place of `chunk_size`/`overlap` and the invariant `0 < overlap
/// < window` is enforced at construction rather than assumed.
pub struct TextChunker {
    window: usize,
    overlap: usize,
}

impl TextChunker {
    pub fn new(window: usize, overlap: usize) -> Self {
        assert!(overlap < window, "overlap must be strictly less than window");
        assert!(overlap > 0, "overlap must be strictly greater than zero");
        Self { window, overlap }
    }

    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total_len = chars.len();

        if total_len == 0 {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let end = (start + self.window).min(total_len);
            let content: String = chars[start..end].iter().collect();
            chunks.push(TextChunk { content, start_pos: start, end_pos: end });

            if end >= total_len {
                break;
            }

            start += self.window - self.overlap;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_short_text_into_one_piece() {
        let chunker = TextChunker::new(1000, 150);
        let chunks = chunker.chunk("hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world");
    }

    #[test]
    fn overlapping_windows_cover_whole_text() {
        let text = "a".repeat(2500);
        let chunker = TextChunker::new(1000, 150);
        let chunks = chunker.chunk(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start_pos, 0);
        assert_eq!(chunks[0].end_pos, 1000);
        assert_eq!(chunks[1].start_pos, 850);
        assert_eq!(chunks[2].end_pos, 2500);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        let chunker = TextChunker::new(1000, 150);
        assert!(chunker.chunk("").is_empty());
    }

    #[test]
    #[should_panic]
    fn overlap_must_be_smaller_than_window() {
        TextChunker::new(100, 100);
    }
}
