//! Sentence-aware overlapping text chunking
//!
//! Segments extracted text into chunks for embedding. Token counting is a
//! deterministic whitespace approximation - exact tokenization is not
//! required, but the same input always yields the same chunks.
//!
//! Split policy per window:
//! 1. A chunk closes at the first sentence terminator (`.` `!` `?`
//!    followed by whitespace or end of text) the window reaches, so a
//!    sentence is never merged with the one after it. `chunk_size` bounds
//!    the window for sentence-free runs.
//! 2. A window with no terminator breaks at the window limit, which is
//!    always a whitespace boundary because tokens are whitespace-delimited.
//!    The next chunk then begins `overlap` tokens before the break; a
//!    chunk closed at a sentence boundary starts the next one fresh.
//!
//! Indexes are contiguous from 0.

pub mod error;

pub use error::{ChunkingError, ChunkingResult};

/// A whitespace-delimited token with its byte span in the source text
#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
}

impl Token {
    /// Whether this token closes a sentence: its last character is a
    /// terminator, and by construction the next character is whitespace or
    /// end of text.
    fn ends_sentence(&self, text: &str) -> bool {
        text.get(self.start..self.end)
            .and_then(|t| t.chars().last())
            .is_some_and(|c| matches!(c, '.' | '!' | '?'))
    }
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push(Token { start: s, end: i });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(Token {
            start: s,
            end: text.len(),
        });
    }
    tokens
}

/// Approximate token count of a text, using the chunker's tokenizer
pub fn count_tokens(text: &str) -> usize {
    tokenize(text).len()
}

/// Chunker parameters
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Window bound in approximate tokens
    pub chunk_size: usize,
    /// Tokens of overlap between consecutive window-broken chunks
    pub overlap: usize,
}

/// A produced chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based contiguous index within the document
    pub index: usize,
    pub text: String,
    pub token_count: usize,
}

/// Sentence-aware overlapping chunker
#[derive(Debug, Clone, Copy)]
pub struct SentenceChunker {
    config: ChunkerConfig,
}

impl SentenceChunker {
    /// Create a chunker, validating the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError::InvalidConfig`] when `chunk_size` is zero
    /// or `overlap` is not smaller than `chunk_size`.
    pub fn new(config: ChunkerConfig) -> ChunkingResult<Self> {
        if config.chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if config.overlap >= config.chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                config.overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    /// Segment text into chunks. Empty or whitespace-only text produces
    /// zero chunks.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let n = tokens.len();
        let mut chunks = Vec::new();
        // Exclusive end of the previous chunk's new material
        let mut consumed = 0_usize;
        // Set after a window break: where the next chunk's overlap begins
        let mut overlap_start: Option<usize> = None;

        while consumed < n {
            let start = overlap_start.take().unwrap_or(consumed);
            let limit = (start + self.config.chunk_size).min(n);

            // Search only the unconsumed part of the window so overlap
            // tokens never re-trigger a boundary behind the chunk.
            let boundary = tokens
                .get(consumed..limit)
                .and_then(|window| window.iter().position(|t| t.ends_sentence(text)))
                .map(|relative| consumed + relative + 1);
            let end = boundary.unwrap_or(limit);

            let (Some(first), Some(last)) = (tokens.get(start), tokens.get(end - 1)) else {
                break;
            };
            let slice = text.get(first.start..last.end).unwrap_or_default();
            chunks.push(TextChunk {
                index: chunks.len(),
                text: slice.to_string(),
                token_count: end - start,
            });

            if boundary.is_none() && end < n {
                overlap_start = Some(end.saturating_sub(self.config.overlap));
            }
            consumed = end;
        }

        chunks
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn chunker(chunk_size: usize, overlap: usize) -> SentenceChunker {
        SentenceChunker::new(ChunkerConfig {
            chunk_size,
            overlap,
        })
        .unwrap()
    }

    fn texts(chunks: &[TextChunk]) -> Vec<&str> {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn empty_text_produces_zero_chunks() {
        assert!(chunker(512, 50).chunk("").is_empty());
        assert!(chunker(512, 50).chunk("   \n\t ").is_empty());
    }

    #[test]
    fn single_sentence_is_a_single_chunk() {
        let chunks = chunker(512, 50).chunk("one two three.");
        assert_eq!(texts(&chunks), ["one two three."]);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn each_sentence_closes_its_own_chunk() {
        // Window far larger than the text: sentences still split
        let chunks = chunker(10, 2).chunk("one. two. three.");
        assert_eq!(texts(&chunks), ["one.", "two.", "three."]);
        let indexes: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indexes, [0, 1, 2]);
    }

    #[test]
    fn minimal_window_still_splits_per_sentence() {
        let chunks = chunker(1, 0).chunk("one. two. three.");
        assert_eq!(texts(&chunks), ["one.", "two.", "three."]);
    }

    #[test]
    fn sentence_boundary_wins_over_window_limit() {
        let chunks = chunker(3, 0).chunk("alpha beta. gamma delta");
        assert_eq!(texts(&chunks), ["alpha beta.", "gamma delta"]);
    }

    #[test]
    fn falls_back_to_window_break_without_terminator() {
        let chunks = chunker(2, 0).chunk("a b c d e");
        assert_eq!(texts(&chunks), ["a b", "c d", "e"]);
    }

    #[test]
    fn question_and_exclamation_close_sentences() {
        let chunks = chunker(3, 0).chunk("really? yes! moving on now");
        assert_eq!(texts(&chunks), ["really?", "yes!", "moving on now"]);
    }

    #[test]
    fn overlap_repeats_tokens_across_window_breaks() {
        let chunks = chunker(2, 1).chunk("w1 w2 w3");
        assert_eq!(texts(&chunks), ["w1 w2", "w2 w3"]);
    }

    #[test]
    fn overlap_does_not_cross_sentence_boundaries() {
        // Sentence-closed chunks start fresh; no tokens are repeated
        let chunks = chunker(4, 2).chunk("one. two. three.");
        assert_eq!(texts(&chunks), ["one.", "two.", "three."]);
    }

    #[test]
    fn indexes_are_contiguous_from_zero() {
        let text = "w1 w2 w3 w4 w5 w6 w7 w8 w9 w10 w11";
        let chunks = chunker(3, 1).chunk(text);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
        assert!(chunks.len() > 2);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "The quick brown fox. It jumped over the lazy dog! Then it ran away? \
                    Nobody saw where it went. The end.";
        let a = chunker(5, 2).chunk(text);
        let b = chunker(5, 2).chunk(text);
        assert_eq!(a, b);
    }

    #[test]
    fn every_token_appears_in_some_chunk() {
        let text = "alpha beta gamma. delta epsilon zeta eta theta. iota kappa";
        let chunks = chunker(4, 1).chunk(text);
        let rebuilt: String = chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ");
        for word in text.split_whitespace() {
            assert!(rebuilt.contains(word), "missing token {word}");
        }
    }

    #[test]
    fn long_sentence_free_run_respects_the_window_bound() {
        let text = "t1 t2 t3 t4 t5 t6 t7 t8 t9 t10";
        let chunks = chunker(4, 0).chunk(text);
        assert!(chunks.iter().all(|c| c.token_count <= 4));
        assert_eq!(texts(&chunks), ["t1 t2 t3 t4", "t5 t6 t7 t8", "t9 t10"]);
    }

    #[test]
    fn unicode_text_chunks_without_panicking() {
        let text = "héllo wörld. ünïcode tokens here. 日本語 テキスト です.";
        let chunks = chunker(3, 1).chunk(text);
        assert!(!chunks.is_empty());
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(SentenceChunker::new(ChunkerConfig { chunk_size: 0, overlap: 0 }).is_err());
        assert!(SentenceChunker::new(ChunkerConfig { chunk_size: 8, overlap: 8 }).is_err());
    }

    #[test]
    fn token_counting_matches_whitespace_split() {
        assert_eq!(count_tokens("one. two. three."), 3);
        assert_eq!(count_tokens(""), 0);
        assert_eq!(count_tokens("  spaced   out  "), 2);
    }
}
