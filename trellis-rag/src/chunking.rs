//! Two-pass hierarchical document chunking.
//!
//! Pass one splits a markdown document along its heading structure and
//! derives a section id from the heading lineage. Pass two enforces a
//! per-chunk token budget, splitting oversized sections along prioritized
//! separators with a trailing overlap carried between consecutive pieces.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ChunkerConfig;
use crate::document::{Chunk, ChunkPayload};
use crate::error::Result;
use crate::tokenizer::TokenCounter;

/// Separator ladder for the budget pass: paragraphs, lines, sentences,
/// words. Text that still exceeds the budget after the last level is cut
/// by character count.
const BUDGET_SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Character estimate per token, used only for the character-level cut of
/// indivisible runs.
const CHARS_PER_TOKEN: usize = 4;

/// A strategy for splitting documents into chunks.
///
/// Implementations produce text [`Chunk`]s with metadata but no embeddings.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Splits a document into chunks.
    ///
    /// Returns an empty `Vec` for an empty document. Chunk ids are
    /// deterministic: the same text and source name always produce the
    /// same chunk list.
    fn chunk(&self, text: &str, source_document: &str) -> Result<Vec<Chunk>>;
}

/// Splits markdown into heading-scoped sections, then enforces a token
/// budget per chunk.
///
/// Sections at or under the budget become a single chunk (`is_split`
/// metadata `false`). Oversized sections are split along
/// [`BUDGET_SEPARATORS`] into pieces that share the section id
/// (`is_split` `true`), with a trailing overlap of
/// `overlap_fraction * target_token_size` tokens between consecutive
/// pieces. Chunk ids are `{source_document}_chunk_{n}` with `n` counting
/// from 1 across the whole document.
#[derive(Clone)]
pub struct HierarchicalChunker {
    config: ChunkerConfig,
    counter: Arc<dyn TokenCounter>,
}

impl HierarchicalChunker {
    /// Creates a chunker from a validated config and a token counter.
    pub fn new(config: ChunkerConfig, counter: Arc<dyn TokenCounter>) -> Self {
        Self { config, counter }
    }

    fn build_chunk(
        &self,
        body: String,
        section: &MarkdownSection,
        section_id: &str,
        source_document: &str,
        sequence: usize,
        token_count: usize,
        is_split: bool,
    ) -> Chunk {
        let mut chunk = Chunk::new(
            format!("{source_document}_chunk_{sequence}"),
            section_id,
            source_document,
            ChunkPayload::Text { body },
        )
        .with_metadata("token_count", token_count.to_string())
        .with_metadata("is_split", is_split.to_string());
        for (level, heading) in &section.headings {
            chunk = chunk.with_metadata(format!("header_{level}"), heading.clone());
        }
        chunk
    }
}

impl Chunker for HierarchicalChunker {
    fn chunk(&self, text: &str, source_document: &str) -> Result<Vec<Chunk>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let target = self.config.target_token_size;
        let overlap = (self.config.overlap_fraction * target as f32) as usize;

        let sections = parse_markdown_sections(text);
        let mut chunks = Vec::new();
        let mut sequence = 1;

        for (index, section) in sections.iter().enumerate() {
            let section_id = section.section_id(index);
            let token_count = self.counter.count_tokens(&section.body)?;

            if token_count <= target {
                chunks.push(self.build_chunk(
                    section.body.clone(),
                    section,
                    &section_id,
                    source_document,
                    sequence,
                    token_count,
                    false,
                ));
                sequence += 1;
            } else {
                let pieces = split_with_budget(
                    &section.body,
                    self.counter.as_ref(),
                    target,
                    overlap,
                    &BUDGET_SEPARATORS,
                )?;
                for piece in pieces {
                    let piece_tokens = self.counter.count_tokens(&piece)?;
                    chunks.push(self.build_chunk(
                        piece,
                        section,
                        &section_id,
                        source_document,
                        sequence,
                        piece_tokens,
                        true,
                    ));
                    sequence += 1;
                }
            }
        }

        Ok(chunks)
    }
}

/// A markdown section: the heading lineage that scopes it and its body
/// text, heading lines included.
struct MarkdownSection {
    headings: Vec<(usize, String)>,
    body: String,
}

impl MarkdownSection {
    /// Heading values joined outer-to-inner, or a positional label when
    /// the section has no heading lineage.
    fn section_id(&self, index: usize) -> String {
        if self.headings.is_empty() {
            format!("Section_{}", index + 1)
        } else {
            self.headings
                .iter()
                .map(|(_, heading)| heading.as_str())
                .collect::<Vec<_>>()
                .join(" > ")
        }
    }
}

/// Parse markdown text into sections split by ATX headings (levels 1-6).
///
/// Heading lines stay in the section body. The heading stack truncates to
/// `level - 1` on each heading, so a `##` under a `#` extends the lineage
/// while a sibling `#` replaces it. Headings inside fenced code blocks are
/// ignored.
fn parse_markdown_sections(text: &str) -> Vec<MarkdownSection> {
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut body = String::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
        }

        let level = trimmed.bytes().take_while(|b| *b == b'#').count();
        let is_heading = !in_fence
            && (1..=6).contains(&level)
            && (trimmed.len() == level || trimmed[level..].starts_with(' '));

        if is_heading {
            // Save previous section
            if !body.trim().is_empty() {
                sections.push(MarkdownSection {
                    headings: stack.clone(),
                    body: body.trim().to_string(),
                });
            }

            let heading_text = trimmed[level..].trim().to_string();
            stack.retain(|(l, _)| *l < level);
            stack.push((level, heading_text));
            body = line.to_string();
        } else {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(line);
        }
    }

    // Save final section
    if !body.trim().is_empty() {
        sections.push(MarkdownSection {
            headings: stack,
            body: body.trim().to_string(),
        });
    }

    sections
}

/// Split text along the first separator present, merge segments up to the
/// token budget, and recurse into segments that alone exceed it. Each new
/// window starts with the trailing segments of the previous one, up to
/// `overlap_tokens`.
fn split_with_budget(
    text: &str,
    counter: &dyn TokenCounter,
    target_tokens: usize,
    overlap_tokens: usize,
    separators: &[&str],
) -> Result<Vec<String>> {
    let Some(position) = separators.iter().position(|sep| text.contains(sep)) else {
        return Ok(split_by_chars(
            text,
            target_tokens * CHARS_PER_TOKEN,
            overlap_tokens * CHARS_PER_TOKEN,
        ));
    };
    let remaining = &separators[position + 1..];
    let segments = split_keeping_separator(text, separators[position]);

    let mut pieces: Vec<String> = Vec::new();
    let mut window: Vec<(&str, usize)> = Vec::new();
    let mut window_tokens = 0;

    for segment in segments {
        let segment_tokens = counter.count_tokens(segment)?;

        if segment_tokens > target_tokens {
            // The segment alone busts the budget: flush and split it with
            // the next separator level.
            if !window.is_empty() {
                pieces.push(join_window(&window));
                window.clear();
                window_tokens = 0;
            }
            pieces.extend(split_with_budget(
                segment,
                counter,
                target_tokens,
                overlap_tokens,
                remaining,
            )?);
            continue;
        }

        if !window.is_empty() && window_tokens + segment_tokens > target_tokens {
            pieces.push(join_window(&window));
            // Keep a trailing overlap, but never so much that the next
            // segment would bust the budget.
            while !window.is_empty()
                && (window_tokens > overlap_tokens
                    || window_tokens + segment_tokens > target_tokens)
            {
                let (_, removed_tokens) = window.remove(0);
                window_tokens -= removed_tokens;
            }
        }

        window.push((segment, segment_tokens));
        window_tokens += segment_tokens;
    }

    if !window.is_empty() {
        pieces.push(join_window(&window));
    }

    Ok(pieces)
}

fn join_window(window: &[(&str, usize)]) -> String {
    window.iter().map(|(segment, _)| *segment).collect()
}

/// Split text at a separator while keeping the separator attached to the
/// preceding segment, so joining segments reconstructs the text.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Character-count splitting with overlap, for runs with no separators
/// left. Counts characters, not bytes, so multi-byte text never splits
/// mid-character.
fn split_by_chars(text: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        let step = max_chars.saturating_sub(overlap_chars);
        if step == 0 {
            break;
        }
        start += step;
    }

    chunks
}

// ── Markdown table extraction ───────────────────────────────────────────────

/// A table found in markdown text, with the lines around it.
///
/// Table blocks are handed to an external analyzer that names the table
/// and generates its query surface; the surrounding context lines give the
/// analyzer something to name it from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkdownTableBlock {
    /// Positional identifier, `table_{n}` counting from 0.
    pub table_id: String,
    /// The table lines joined by newlines.
    pub content: String,
    /// Number of table lines after the header row.
    pub row_count: usize,
    /// Up to `context_lines` lines preceding the table.
    pub context_before: String,
    /// Up to `context_lines` lines following the table.
    pub context_after: String,
}

/// Finds markdown tables: contiguous runs of at least two lines containing
/// a `|` cell delimiter.
pub fn extract_markdown_tables(text: &str, context_lines: usize) -> Vec<MarkdownTableBlock> {
    let lines: Vec<&str> = text.lines().collect();
    let mut tables = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !is_table_line(lines[i]) {
            i += 1;
            continue;
        }

        let start = i;
        while i < lines.len() && is_table_line(lines[i]) {
            i += 1;
        }
        let run = &lines[start..i];
        if run.len() < 2 {
            continue;
        }

        let before_start = start.saturating_sub(context_lines);
        let after_end = (i + context_lines).min(lines.len());
        tables.push(MarkdownTableBlock {
            table_id: format!("table_{}", tables.len()),
            content: run.join("\n"),
            row_count: run.len() - 1,
            context_before: lines[before_start..start].join("\n"),
            context_after: lines[i..after_end].join("\n"),
        });
    }

    tables
}

fn is_table_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.contains('|')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::HeuristicTokenCounter;

    fn chunker(target: usize, overlap: f32) -> HierarchicalChunker {
        let config = ChunkerConfig::builder()
            .target_token_size(target)
            .overlap_fraction(overlap)
            .build()
            .unwrap();
        HierarchicalChunker::new(config, Arc::new(HeuristicTokenCounter::new()))
    }

    #[test]
    fn two_heading_document_yields_two_unsplit_chunks() {
        let text = "# A\n\nshort text\n\n# B\n\nshort text";
        let chunks = chunker(100, 0.1).chunk(text, "doc.md").unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_id, "doc.md_chunk_1");
        assert_eq!(chunks[1].chunk_id, "doc.md_chunk_2");
        assert_eq!(chunks[0].section_id, "A");
        assert_eq!(chunks[1].section_id, "B");
        for chunk in &chunks {
            assert_eq!(chunk.metadata["is_split"], "false");
            assert_eq!(chunk.source_document, "doc.md");
        }
        assert!(chunks[0].content().starts_with("# A"));
    }

    #[test]
    fn oversized_section_splits_with_trailing_overlap() {
        // Four sentences of five tokens each against a budget of twelve:
        // windows hold two sentences and the overlap keeps the last one.
        let s1 = "ba ca da ea fa. ";
        let s2 = "ga ha ia ja ka. ";
        let s3 = "la ma na oa pa. ";
        let s4 = "qa ra sa ta ua.";
        let text = format!("{s1}{s2}{s3}{s4}");

        let chunks = chunker(12, 0.45).chunk(&text, "doc.md").unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content(), format!("{s1}{s2}"));
        assert_eq!(chunks[1].content(), format!("{s2}{s3}"));
        assert_eq!(chunks[2].content(), format!("{s3}{s4}"));
        for chunk in &chunks {
            assert_eq!(chunk.metadata["is_split"], "true");
            assert_eq!(chunk.section_id, "Section_1");
            assert!(chunk.metadata["token_count"].parse::<usize>().unwrap() <= 12);
        }
    }

    #[test]
    fn heading_lineage_recorded_in_metadata() {
        let text = "# Guide\n\nintro\n\n## Setup\n\nsteps";
        let chunks = chunker(100, 0.1).chunk(text, "guide.md").unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].section_id, "Guide > Setup");
        assert_eq!(chunks[1].metadata["header_1"], "Guide");
        assert_eq!(chunks[1].metadata["header_2"], "Setup");
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(chunker(100, 0.1).chunk("", "doc.md").unwrap().is_empty());
    }

    #[test]
    fn sections_follow_heading_lineage() {
        let text = "# Guide\nintro\n## Setup\nsteps\n## Usage\nexamples\n";
        let sections = parse_markdown_sections(text);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].section_id(0), "Guide");
        assert_eq!(sections[1].section_id(1), "Guide > Setup");
        assert_eq!(sections[2].section_id(2), "Guide > Usage");
        assert!(sections[1].body.starts_with("## Setup"));
    }

    #[test]
    fn sibling_heading_replaces_lineage() {
        let text = "# A\nbody\n## A1\nbody\n# B\nbody\n";
        let sections = parse_markdown_sections(text);
        assert_eq!(sections[2].section_id(2), "B");
    }

    #[test]
    fn preamble_gets_positional_section_id() {
        let text = "no headings here\njust text\n";
        let sections = parse_markdown_sections(text);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].section_id(0), "Section_1");
    }

    #[test]
    fn fenced_hash_lines_are_not_headings() {
        let text = "# Real\n```\n# not a heading\n```\nafter\n";
        let sections = parse_markdown_sections(text);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].body.contains("# not a heading"));
    }

    #[test]
    fn split_keeps_separator_with_preceding_segment() {
        let segments = split_keeping_separator("a. b. c", ". ");
        assert_eq!(segments, vec!["a. ", "b. ", "c"]);
        assert_eq!(segments.concat(), "a. b. c");
    }

    #[test]
    fn char_split_respects_char_boundaries() {
        let chunks = split_by_chars("héllo wörld", 4, 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
        assert!(chunks[0].starts_with("héll"));
    }

    #[test]
    fn extracts_table_with_context() {
        let text = "Sales figures below.\n\n| region | total |\n|---|---|\n| east | 10 |\n\nThat is all.";
        let tables = extract_markdown_tables(text, 2);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].table_id, "table_0");
        assert_eq!(tables[0].row_count, 2);
        assert!(tables[0].content.contains("| east | 10 |"));
        assert!(tables[0].context_before.contains("Sales figures"));
        assert!(tables[0].context_after.contains("That is all"));
    }

    #[test]
    fn single_pipe_line_is_not_a_table() {
        let text = "a | b\nplain line\n";
        assert!(extract_markdown_tables(text, 2).is_empty());
    }
}
