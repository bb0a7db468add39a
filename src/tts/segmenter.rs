//! Text segmentation for bounded-window speech generation.
//!
//! The generator only accepts a limited amount of text per call, so long input is cut
//! into segments at the most natural boundary available: sentences first, then clauses,
//! then words.

use tracing::{debug, warn};

/// Maximum characters handed to the model in one generation call.
pub const MAX_CHARS_PER_GENERATION: usize = 300;

/// Segments shorter than this (after trimming) are merged into a neighbour or dropped.
pub const MIN_CHARS_PER_SEGMENT: usize = 50;

/// Characters that end a sentence.
pub const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?'];

/// Characters that separate clauses inside a sentence.
pub const CLAUSE_SEPARATORS: &[char] = &[',', ';', ':'];

/// Sentence groups are closed once they reach this share of the limit (percent).
const SENTENCE_FLUSH_PERCENT: usize = 80;

/// Clause groups are shorter, so they close earlier (percent).
const CLAUSE_FLUSH_PERCENT: usize = 60;

/// Splits text into generation-sized segments.
#[derive(Debug, Clone)]
pub struct Segmenter {
    max_chars: usize,                 // Upper bound per segment
    min_chars: usize,                 // Lower bound per segment (except fallback)
    sentence_terminators: Vec<char>,  // Sentence tier delimiters
    clause_separators: Vec<char>,     // Clause tier delimiters
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(MAX_CHARS_PER_GENERATION, MIN_CHARS_PER_SEGMENT)
    }
}

/// One piece of delimiter-split text.
enum Piece<'a> {
    Text(&'a str),
    Delimiter(&'a str),
}

impl Segmenter {
    /// Create a segmenter with custom bounds.
    ///
    /// # Arguments
    /// * `max_chars` - Maximum characters per segment (clamped to at least 1)
    /// * `min_chars` - Minimum characters per segment (clamped to `max_chars`)
    pub fn new(max_chars: usize, min_chars: usize) -> Self {
        let max_chars = max_chars.max(1);
        Self {
            max_chars,
            min_chars: min_chars.min(max_chars),
            sentence_terminators: SENTENCE_TERMINATORS.to_vec(),
            clause_separators: CLAUSE_SEPARATORS.to_vec(),
        }
    }

    /// Maximum characters per segment.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Minimum characters per segment.
    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    /// Split text into an ordered list of segments.
    ///
    /// Text that already fits the generation window is returned unchanged. Longer text
    /// goes through the sentence, clause and word tiers in turn; each tier only touches
    /// pieces the previous tier left over the limit.
    ///
    /// # Arguments
    /// * `text` - Input text (validated upstream: non-empty, at most 5000 characters)
    ///
    /// # Returns
    /// At least one segment. Every segment is at most `max_chars` characters long.
    pub fn split(&self, text: &str) -> Vec<String> {
        if char_len(text) <= self.max_chars {
            return vec![text.to_string()];
        }

        let mut segments = Vec::new();

        for sentence_group in self.accumulate(text, &self.sentence_terminators, SENTENCE_FLUSH_PERCENT) {
            if char_len(&sentence_group) <= self.max_chars {
                segments.push(sentence_group);
                continue;
            }

            debug!("Sentence group over limit ({} chars), splitting by clauses", char_len(&sentence_group));
            for clause_group in self.accumulate(&sentence_group, &self.clause_separators, CLAUSE_FLUSH_PERCENT) {
                if char_len(&clause_group) <= self.max_chars {
                    segments.push(clause_group);
                } else {
                    debug!("Clause group over limit ({} chars), splitting by words", char_len(&clause_group));
                    segments.extend(self.pack_words(&clause_group));
                }
            }
        }

        let segments = self.settle_short_segments(segments);
        if segments.is_empty() {
            warn!("No usable segments, falling back to the first {} characters", self.max_chars);
            return vec![text.chars().take(self.max_chars).collect()];
        }

        segments
    }

    /// Group delimiter-terminated runs into segments.
    ///
    /// A delimiter always stays attached to the text before it. The running group is
    /// closed once it reaches `flush_percent` of the limit after a delimiter, or before a
    /// text run that would push it over the limit (that run then opens the next group).
    fn accumulate(&self, text: &str, delimiters: &[char], flush_percent: usize) -> Vec<String> {
        let flush_at = (self.max_chars * flush_percent).div_ceil(100);

        let mut groups = Vec::new();
        let mut current = String::new();
        let mut current_len = 0;

        for piece in split_keeping_delimiters(text, delimiters) {
            match piece {
                Piece::Delimiter(delimiter) => {
                    current.push_str(delimiter);
                    current_len += 1;
                    if current_len >= flush_at {
                        flush(&mut groups, &mut current);
                        current_len = 0;
                    }
                }
                Piece::Text(run) => {
                    let run_len = char_len(run);
                    if current_len + run_len > self.max_chars {
                        flush(&mut groups, &mut current);
                        current_len = 0;
                    }
                    current.push_str(run);
                    current_len += run_len;
                }
            }
        }

        flush(&mut groups, &mut current);
        groups
    }

    /// Greedily pack whitespace-separated words into segments.
    fn pack_words(&self, text: &str) -> Vec<String> {
        let mut packed = Vec::new();
        let mut line = String::new();
        let mut line_len = 0;

        for word in text.split_whitespace() {
            let word_len = char_len(word);

            // A single word longer than the window has no natural boundary left
            if word_len > self.max_chars {
                if !line.is_empty() {
                    packed.push(std::mem::take(&mut line));
                }
                let mut slices = slice_evenly(word, word_len, self.max_chars);
                let last = slices.pop().unwrap_or_default();
                packed.extend(slices);
                line_len = char_len(&last);
                line = last;
                continue;
            }

            let needed = if line.is_empty() { word_len } else { line_len + 1 + word_len };
            if needed > self.max_chars {
                packed.push(std::mem::take(&mut line));
                line.push_str(word);
                line_len = word_len;
            } else {
                if !line.is_empty() {
                    line.push(' ');
                }
                line.push_str(word);
                line_len = needed;
            }
        }

        if !line.is_empty() {
            packed.push(line);
        }

        packed
    }

    /// Merge segments below `min_chars` into a neighbour that has room, dropping the rest.
    fn settle_short_segments(&self, segments: Vec<String>) -> Vec<String> {
        let mut kept: Vec<String> = Vec::with_capacity(segments.len());
        let mut pending: Option<String> = None; // Short segment waiting for its successor

        for mut segment in segments {
            if let Some(short) = pending.take() {
                if self.fits_joined(&short, &segment) {
                    segment = format!("{} {}", short, segment);
                } else {
                    warn!("Dropping short segment ({} chars): \"{}\"", char_len(&short), short);
                }
            }

            if char_len(segment.trim()) >= self.min_chars {
                kept.push(segment);
                continue;
            }

            match kept.last_mut() {
                Some(previous) if self.fits_joined(previous, &segment) => {
                    previous.push(' ');
                    previous.push_str(&segment);
                }
                _ => pending = Some(segment),
            }
        }

        if let Some(short) = pending {
            warn!("Dropping short segment ({} chars): \"{}\"", char_len(&short), short);
        }

        kept
    }

    fn fits_joined(&self, a: &str, b: &str) -> bool {
        char_len(a) + 1 + char_len(b) <= self.max_chars
    }
}

/// Length in characters (not bytes).
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Close the running group, keeping it only if it has content.
fn flush(groups: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        groups.push(trimmed.to_string());
    }
    current.clear();
}

/// Split text into alternating text runs and single delimiter characters.
fn split_keeping_delimiters<'a>(text: &'a str, delimiters: &[char]) -> Vec<Piece<'a>> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        if delimiters.contains(&c) {
            if start < idx {
                pieces.push(Piece::Text(&text[start..idx]));
            }
            let end = idx + c.len_utf8();
            pieces.push(Piece::Delimiter(&text[idx..end]));
            start = end;
        }
    }

    if start < text.len() {
        pieces.push(Piece::Text(&text[start..]));
    }

    pieces
}

/// Cut a word into the fewest near-equal slices that each fit `max_chars`.
fn slice_evenly(word: &str, word_len: usize, max_chars: usize) -> Vec<String> {
    let count = word_len.div_ceil(max_chars);
    let base = word_len / count;
    let extra = word_len % count;

    let mut chars = word.chars();
    (0..count)
        .map(|i| {
            let take = if i < extra { base + 1 } else { base };
            chars.by_ref().take(take).collect()
        })
        .collect()
}
