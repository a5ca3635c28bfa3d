//! Legal-document chunker.
//!
//! Two modes, mirroring how statutes are actually laid out:
//!
//! - **Structural**: split on `Article/Chapter/Section <n>` headings so each
//!   chunk is one citable unit, with the heading kept as metadata and a short
//!   summary taken from the body.
//! - **Windowed fallback**: when a document has no recognizable headings,
//!   split its word sequence into fixed-size overlapping windows so no
//!   semantic unit is lost at a window boundary.
//!
//! Every emitted chunk has non-empty, whitespace-normalized content.

use anyhow::{bail, Result};
use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, ChunkMeta};

/// Characters of body text used for the reference summary.
const SUMMARY_CHARS: usize = 200;

fn heading_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(article|chapter|section)\s+(\d+[A-Za-z]?)\s*[.:]?").unwrap())
}

fn article_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\barticle\s+(\d+[A-Za-z]?)").unwrap())
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the first `Article <n>` number from a body of text, if any.
pub fn extract_article_number(text: &str) -> Option<String> {
    article_pattern()
        .captures(text)
        .map(|c| c[1].to_string())
}

/// Split a legal document into ordered chunks.
///
/// Tries structural mode first; documents without a single recognizable
/// heading fall back to overlapping word windows. Empty input produces
/// empty output.
pub fn chunk_document(text: &str, source: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    if normalize_whitespace(text).is_empty() {
        return Ok(Vec::new());
    }

    struct Heading {
        start: usize,
        end: usize,
        keyword: String,
        number: String,
    }

    let headings: Vec<Heading> = heading_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            Some(Heading {
                start: m.start(),
                end: m.end(),
                keyword: caps[1].to_string(),
                number: caps[2].to_string(),
            })
        })
        .collect();
    if headings.is_empty() {
        return chunk_windows(text, source, config.chunk_size, config.overlap);
    }

    let mut chunks = Vec::new();

    // Text before the first heading (preambles, titles) becomes a
    // headingless chunk rather than being misread as a heading of its own.
    let preamble = normalize_whitespace(&text[..headings[0].start]);
    if !preamble.is_empty() {
        chunks.push(make_chunk(preamble, source, None, None));
    }

    for (i, h) in headings.iter().enumerate() {
        let body_end = headings
            .get(i + 1)
            .map(|next| next.start)
            .unwrap_or(text.len());
        let body = normalize_whitespace(&text[h.end..body_end]);
        if body.is_empty() {
            continue;
        }

        let heading = format!("{} {}", capitalize(&h.keyword), h.number);
        // Only Article headings carry a citation number; chapters and
        // sections keep the heading but group under the source alone.
        let article_number = if h.keyword.eq_ignore_ascii_case("article") {
            Some(h.number.clone())
        } else {
            None
        };

        chunks.push(make_chunk(body, source, Some(heading), article_number));
    }

    // Headings with no body at all (e.g. a bare table of contents): fall
    // back to windows over the whole text.
    if chunks.is_empty() {
        return chunk_windows(text, source, config.chunk_size, config.overlap);
    }

    Ok(chunks)
}

/// Split text into fixed-size overlapping word windows.
///
/// Windows are `chunk_size` words long and advance `chunk_size - overlap`
/// words per step, so consecutive windows share `overlap` words. The window
/// count for `n` words is `ceil(n / (chunk_size - overlap))`.
pub fn chunk_windows(
    text: &str,
    source: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        bail!("chunk_size must be > 0");
    }
    if overlap >= chunk_size {
        bail!(
            "overlap ({}) must be < chunk_size ({}) or windowing never terminates",
            overlap,
            chunk_size
        );
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();

    for start in (0..words.len()).step_by(step) {
        let end = (start + chunk_size).min(words.len());
        let content = words[start..end].join(" ");
        let article_number = extract_article_number(&content);
        chunks.push(make_chunk(content, source, None, article_number));
    }

    Ok(chunks)
}

fn make_chunk(
    content: String,
    source: &str,
    heading: Option<String>,
    article_number: Option<String>,
) -> Chunk {
    let word_count = content.split_whitespace().count();
    let summary = summarize(&content);
    Chunk {
        meta: ChunkMeta {
            source: source.to_string(),
            heading,
            article_number,
            topics: Vec::new(),
            summary: Some(summary),
            word_count,
            created_at: Utc::now(),
        },
        content,
    }
}

/// First [`SUMMARY_CHARS`] characters of the body, ellipsis-suffixed when
/// truncated. Cuts on a char boundary, never mid-codepoint.
fn summarize(content: &str) -> String {
    match content.char_indices().nth(SUMMARY_CHARS) {
        Some((byte_idx, _)) => format!("{}...", &content[..byte_idx]),
        None => content.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap,
        }
    }

    #[test]
    fn test_empty_text_empty_output() {
        let chunks = chunk_document("", "Constitution", &config(512, 50)).unwrap();
        assert!(chunks.is_empty());
        let chunks = chunk_document("   \n\t ", "Constitution", &config(512, 50)).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_structural_split_pairs_heading_with_body() {
        let text = "Article 1. Everyone has the right to life. \
                    Article 2: No one shall be held in slavery.";
        let chunks = chunk_document(text, "Constitution", &config(512, 50)).unwrap();
        assert_eq!(chunks.len(), 2);

        assert_eq!(chunks[0].content, "Everyone has the right to life.");
        assert_eq!(chunks[0].meta.heading.as_deref(), Some("Article 1"));
        assert_eq!(chunks[0].meta.article_number.as_deref(), Some("1"));
        assert_eq!(chunks[0].meta.source, "Constitution");

        assert_eq!(chunks[1].meta.article_number.as_deref(), Some("2"));
        assert!(chunks[1].content.starts_with("No one shall"));
    }

    #[test]
    fn test_structural_split_is_case_insensitive() {
        let text = "ARTICLE 7. Due process applies. chapter 2. General provisions follow.";
        let chunks = chunk_document(text, "Civil Code", &config(512, 50)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].meta.heading.as_deref(), Some("Article 7"));
        assert_eq!(chunks[1].meta.heading.as_deref(), Some("Chapter 2"));
        // Chapters carry no article number.
        assert!(chunks[1].meta.article_number.is_none());
    }

    #[test]
    fn test_preamble_becomes_headingless_chunk() {
        let text = "THE CONSTITUTION PREAMBLE We the people... \
                    Article 1. Sovereignty resides in the people.";
        let chunks = chunk_document(text, "Constitution", &config(512, 50)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].meta.heading.is_none());
        assert!(chunks[0].content.starts_with("THE CONSTITUTION"));
        assert_eq!(chunks[1].meta.article_number.as_deref(), Some("1"));
    }

    #[test]
    fn test_summary_truncated_with_ellipsis() {
        let body = "x".repeat(300);
        let text = format!("Article 5. {}", body);
        let chunks = chunk_document(&text, "Code", &config(512, 50)).unwrap();
        let summary = chunks[0].meta.summary.as_deref().unwrap();
        assert_eq!(summary.chars().count(), 203);
        assert!(summary.ends_with("..."));

        let short = chunk_document("Article 6. Short body.", "Code", &config(512, 50)).unwrap();
        assert_eq!(short[0].meta.summary.as_deref(), Some("Short body."));
    }

    #[test]
    fn test_no_heading_falls_back_to_windows() {
        let text = (0..25).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
        let chunks = chunk_document(&text, "Notes", &config(10, 2)).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.meta.heading.is_none()));
    }

    #[test]
    fn test_single_short_paragraph_is_one_window() {
        let chunks = chunk_windows("a short paragraph of text", "Notes", 512, 50).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "a short paragraph of text");
    }

    #[test]
    fn test_window_count_formula() {
        // count = ceil(n / (chunk_size - overlap))
        for (n, size, overlap) in [(100usize, 10usize, 3usize), (57, 12, 5), (7, 512, 50), (30, 5, 0)] {
            let text = (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
            let chunks = chunk_windows(&text, "Doc", size, overlap).unwrap();
            let step = size - overlap;
            let expected = n.div_ceil(step);
            assert_eq!(
                chunks.len(),
                expected,
                "n={} size={} overlap={}",
                n,
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_windows_reconstruct_word_sequence() {
        let n = 83;
        let size = 12;
        let overlap = 4;
        let words: Vec<String> = (0..n).map(|i| format!("w{}", i)).collect();
        let text = words.join(" ");
        let chunks = chunk_windows(&text, "Doc", size, overlap).unwrap();

        // First window whole, then each later window minus the shared prefix.
        let mut rebuilt: Vec<String> = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_words: Vec<&str> = chunk.content.split_whitespace().collect();
            let skip = if i == 0 { 0 } else { overlap.min(chunk_words.len()) };
            rebuilt.extend(chunk_words[skip..].iter().map(|w| w.to_string()));
        }
        assert_eq!(rebuilt, words);
    }

    #[test]
    fn test_window_overlap_shared_words() {
        let text = (0..20).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let chunks = chunk_windows(&text, "Doc", 8, 3).unwrap();
        let first: Vec<&str> = chunks[0].content.split_whitespace().collect();
        let second: Vec<&str> = chunks[1].content.split_whitespace().collect();
        assert_eq!(&first[first.len() - 3..], &second[..3]);
    }

    #[test]
    fn test_overlap_geq_chunk_size_rejected() {
        assert!(chunk_windows("some text here", "Doc", 5, 5).is_err());
        assert!(chunk_windows("some text here", "Doc", 5, 9).is_err());
    }

    #[test]
    fn test_windows_normalize_whitespace() {
        let chunks = chunk_windows("  a\n\nb\t\tc  ", "Doc", 512, 50).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "a b c");
        assert_eq!(chunks[0].meta.word_count, 3);
    }

    #[test]
    fn test_fallback_window_still_extracts_article_number() {
        let chunks =
            chunk_windows("pursuant to article 42 of the code", "Code", 512, 50).unwrap();
        assert_eq!(chunks[0].meta.article_number.as_deref(), Some("42"));
    }
}
