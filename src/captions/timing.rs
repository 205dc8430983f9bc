use crate::error::{ReelError, ReelResult};

pub const DEFAULT_WORDS_PER_CHUNK: usize = 2;

/// Per-chunk display time clamp, in seconds. Two words need at least 0.4s to
/// be readable; holding a chunk past 1.5s looks frozen.
pub const MIN_CHUNK_SECS: f64 = 0.4;
pub const MAX_CHUNK_SECS: f64 = 1.5;

const MIN_CHUNK_WEIGHT: u32 = 3;

/// A timed subtitle unit. Intervals are half-open `[start, end)`, contiguous,
/// and together span `[0, total_duration]` exactly.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptionChunk {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl CaptionChunk {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}

/// Distribute `total_duration` seconds of narration over fixed-word-count
/// caption chunks.
///
/// This is a text-length heuristic, not a transcription alignment: each chunk
/// is weighted by the character count of its words (floored at a minimum so
/// short words still get screen time), clamped to a readable range, then
/// rescaled so the chunks tile `[0, total_duration]` with no gaps. The final
/// chunk's `end` is forced to `total_duration` to absorb float drift.
pub fn allocate_captions(
    narration: &str,
    total_duration: f64,
    words_per_chunk: usize,
) -> ReelResult<Vec<CaptionChunk>> {
    if words_per_chunk == 0 {
        return Err(ReelError::validation("words_per_chunk must be >= 1"));
    }
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Err(ReelError::validation(
            "caption total_duration must be finite and > 0",
        ));
    }

    let cleaned = sanitize_narration(narration);
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    struct Provisional {
        text: String,
        duration: f64,
    }

    let chunks: Vec<(String, u32)> = words
        .chunks(words_per_chunk)
        .map(|group| {
            let weight: u32 = group.iter().map(|w| w.chars().count() as u32).sum();
            (group.join(" "), weight.max(MIN_CHUNK_WEIGHT))
        })
        .collect();

    let total_weight: u32 = chunks.iter().map(|(_, w)| w).sum();

    let mut provisional: Vec<Provisional> = chunks
        .into_iter()
        .map(|(text, weight)| {
            let share = total_duration * f64::from(weight) / f64::from(total_weight);
            Provisional {
                text,
                duration: share.clamp(MIN_CHUNK_SECS, MAX_CHUNK_SECS),
            }
        })
        .collect();

    // Clamping broke the exact-sum invariant; rescale and lay out contiguously.
    let provisional_sum: f64 = provisional.iter().map(|c| c.duration).sum();
    let scale = total_duration / provisional_sum;

    let mut out = Vec::with_capacity(provisional.len());
    let mut cursor = 0.0;
    for chunk in provisional.drain(..) {
        let duration = chunk.duration * scale;
        out.push(CaptionChunk {
            text: chunk.text,
            start: cursor,
            end: cursor + duration,
        });
        cursor += duration;
    }
    if let Some(last) = out.last_mut() {
        last.end = total_duration;
    }

    Ok(out)
}

/// Find the chunk covering time `t`. Linear scan; chunk counts are small.
pub fn chunk_at(chunks: &[CaptionChunk], t: f64) -> Option<&CaptionChunk> {
    chunks.iter().find(|c| c.contains(t))
}

/// Collapse whitespace and strip characters outside the permitted
/// word/punctuation set. Accented letters count as word characters.
fn sanitize_narration(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() || c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?' | '-' | '_')
        {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEN_WORDS: &str = "the quick brown fox jumps over the lazy dog today";

    #[test]
    fn chunk_durations_sum_to_total() {
        let chunks = allocate_captions(TEN_WORDS, 20.0, 2).unwrap();
        let sum: f64 = chunks.iter().map(|c| c.duration()).sum();
        assert!((sum - 20.0).abs() < 1e-9);
        assert_eq!(chunks.last().unwrap().end, 20.0);
    }

    #[test]
    fn eleven_words_two_per_chunk_yields_six_chunks() {
        let text = "one two three four five six seven eight nine ten eleven";
        let chunks = allocate_captions(text, 10.0, 2).unwrap();
        assert_eq!(chunks.len(), 6);
        assert_eq!(chunks.last().unwrap().text, "eleven");
    }

    #[test]
    fn chunks_are_contiguous() {
        let chunks = allocate_captions(TEN_WORDS, 12.5, 2).unwrap();
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(chunks[0].start, 0.0);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(allocate_captions("", 10.0, 2).unwrap().is_empty());
        assert!(allocate_captions("   \n\t ", 10.0, 2).unwrap().is_empty());
    }

    #[test]
    fn single_word_yields_one_chunk_spanning_everything() {
        let chunks = allocate_captions("hello", 3.0, 2).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0.0);
        assert_eq!(chunks[0].end, 3.0);
    }

    #[test]
    fn accented_words_survive_sanitization() {
        let chunks = allocate_captions("você é incrível", 2.0, 2).unwrap();
        assert_eq!(chunks[0].text, "você é");
        assert_eq!(chunks[1].text, "incrível");
    }

    #[test]
    fn disallowed_symbols_are_stripped() {
        let chunks = allocate_captions("wow* (really) #cool", 2.0, 2).unwrap();
        assert_eq!(chunks[0].text, "wow really");
        assert_eq!(chunks[1].text, "cool");
    }

    #[test]
    fn longer_words_get_more_time_before_clamping() {
        // One very short chunk and one very long one over a duration where the
        // clamp does not saturate both.
        let chunks = allocate_captions("a extraordinarily", 1.6, 1).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].duration() > chunks[0].duration());
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(allocate_captions("hi", 0.0, 2).is_err());
        assert!(allocate_captions("hi", f64::NAN, 2).is_err());
        assert!(allocate_captions("hi", 5.0, 0).is_err());
    }

    #[test]
    fn chunk_at_uses_half_open_intervals() {
        let chunks = allocate_captions(TEN_WORDS, 10.0, 2).unwrap();
        let boundary = chunks[0].end;
        let hit = chunk_at(&chunks, boundary).unwrap();
        assert_eq!(hit.text, chunks[1].text);
        assert!(chunk_at(&chunks, 10.0).is_none());
    }
}
