//! Context assembly for answer generation.
//!
//! Takes the scored chunks that survived relevance filtering and renders
//! one bounded context string plus a citation list. Chunks are grouped per
//! citable unit (source plus article number), groups are ordered by
//! article number, and the rendered text is cut to a character budget so
//! the generation prompt never grows without bound.

use std::collections::HashMap;

use crate::models::{Reference, ScoredChunk};

/// Sort key for groups without a leading number in their title.
const NO_NUMBER_SORT_KEY: u64 = u64::MAX;

/// Result of context assembly.
///
/// `NoRelevantContext` is a distinct outcome, not an empty string: callers
/// must branch on it and answer with the fallback message instead of
/// sending an empty context to generation.
#[derive(Debug, Clone, PartialEq)]
pub enum AssembledContext {
    Context {
        text: String,
        references: Vec<Reference>,
    },
    NoRelevantContext,
}

struct Group {
    title: String,
    summary: Option<String>,
    contents: Vec<String>,
    sort_key: u64,
}

/// Assemble scored chunks into one context string and a citation list.
///
/// Grouping key is `"{source} - Article {n}"` when the chunk carries an
/// article number, else the bare source. Groups render in ascending
/// article-number order with numberless groups last; within a group,
/// chunks keep their score order. The rendered text is truncated to
/// `max_chars` on a character boundary.
pub fn assemble_context(chunks: &[ScoredChunk], max_chars: usize) -> AssembledContext {
    if chunks.is_empty() {
        return AssembledContext::NoRelevantContext;
    }

    // Group in first-seen order so equal sort keys stay stable.
    let mut groups: Vec<Group> = Vec::new();
    let mut by_title: HashMap<String, usize> = HashMap::new();

    for chunk in chunks {
        let title = group_title(&chunk.meta.source, chunk.meta.article_number.as_deref());
        let slot = *by_title.entry(title.clone()).or_insert_with(|| {
            groups.push(Group {
                sort_key: title_sort_key(&title),
                summary: chunk.meta.summary.clone(),
                contents: Vec::new(),
                title,
            });
            groups.len() - 1
        });
        groups[slot].contents.push(chunk.content.clone());
    }

    groups.sort_by_key(|g| g.sort_key);

    let blocks: Vec<String> = groups.iter().map(render_group).collect();
    let text = truncate_chars(&blocks.join("\n\n"), max_chars);

    let references = groups
        .iter()
        .map(|g| Reference {
            title: g.title.clone(),
            summary: g.summary.clone(),
        })
        .collect();

    AssembledContext::Context { text, references }
}

fn group_title(source: &str, article_number: Option<&str>) -> String {
    match article_number {
        Some(n) => format!("{} - Article {}", source, n),
        None => source.to_string(),
    }
}

/// First run of ASCII digits anywhere in the title; titles without one
/// sort after every numbered title.
fn title_sort_key(title: &str) -> u64 {
    let digits: String = title
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(NO_NUMBER_SORT_KEY)
}

fn render_group(group: &Group) -> String {
    let mut block = format!("Source: {}", group.title);
    if let Some(summary) = &group.summary {
        block.push_str("\nSummary: ");
        block.push_str(summary);
    }
    block.push_str("\nContent:\n");
    block.push_str(&group.contents.join("\n"));
    block
}

/// Prefix of at most `max_chars` characters, cut on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
