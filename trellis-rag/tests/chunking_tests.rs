//! Property tests for hierarchical chunking.

use std::sync::Arc;

use proptest::prelude::*;
use trellis_rag::chunking::{Chunker, HierarchicalChunker};
use trellis_rag::config::ChunkerConfig;
use trellis_rag::tokenizer::{HeuristicTokenCounter, TokenCounter};

/// Generate a markdown block: either a heading line or a paragraph.
fn arb_block() -> impl Strategy<Value = String> {
    prop_oneof![
        (1usize..=3, "[A-Z][a-z]{2,8}")
            .prop_map(|(level, title)| format!("{} {}", "#".repeat(level), title)),
        proptest::collection::vec("[a-z]{1,10}", 1..60).prop_map(|words| words.join(" ")),
    ]
}

/// Generate a markdown document of heading and paragraph blocks.
fn arb_markdown_doc() -> impl Strategy<Value = String> {
    proptest::collection::vec(arb_block(), 1..10).prop_map(|blocks| blocks.join("\n\n"))
}

fn chunker(target: usize, overlap: f32) -> HierarchicalChunker {
    let config = ChunkerConfig::builder()
        .target_token_size(target)
        .overlap_fraction(overlap)
        .build()
        .unwrap();
    HierarchicalChunker::new(config, Arc::new(HeuristicTokenCounter::new()))
}

/// **Property 1: Token budget**
/// *For any* markdown document and any target token size, every produced
/// chunk SHALL contain at most `target_token_size` tokens as measured by
/// the chunker's own token counter, and the `token_count` metadata SHALL
/// match an independent recount of the chunk content.
mod prop_token_budget {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_stay_within_budget(
            text in arb_markdown_doc(),
            target in 8usize..48,
        ) {
            let counter = HeuristicTokenCounter::new();
            let chunks = chunker(target, 0.1).chunk(&text, "doc.md").unwrap();

            for chunk in &chunks {
                let recounted = counter.count_tokens(&chunk.content()).unwrap();
                prop_assert!(
                    recounted <= target,
                    "chunk {} holds {} tokens, budget {}",
                    chunk.chunk_id,
                    recounted,
                    target,
                );
                let recorded: usize = chunk.metadata["token_count"].parse().unwrap();
                prop_assert_eq!(recorded, recounted);
            }
        }
    }
}

/// **Property 2: Chunk ids and lineage**
/// *For any* markdown document, chunk ids SHALL be
/// `{source_document}_chunk_{n}` with `n` counting from 1 in order across
/// the whole document, and every chunk SHALL carry its source document and
/// a non-empty section id.
mod prop_chunk_ids {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn ids_are_sequential_from_one(
            text in arb_markdown_doc(),
            target in 8usize..48,
        ) {
            let chunks = chunker(target, 0.1).chunk(&text, "report.md").unwrap();

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(
                    chunk.chunk_id.clone(),
                    format!("report.md_chunk_{}", i + 1),
                );
                prop_assert_eq!(chunk.source_document.clone(), "report.md".to_string());
                prop_assert!(!chunk.section_id.is_empty());
            }
        }
    }
}

/// **Property 3: Determinism**
/// *For any* markdown document, chunking the same text twice with the same
/// parameters SHALL yield identical chunk lists.
mod prop_determinism {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn repeated_runs_are_identical(
            text in arb_markdown_doc(),
            target in 8usize..48,
        ) {
            let chunker = chunker(target, 0.1);
            let first = chunker.chunk(&text, "doc.md").unwrap();
            let second = chunker.chunk(&text, "doc.md").unwrap();
            prop_assert_eq!(first, second);
        }
    }
}

/// **Property 4: Chunk content provenance**
/// *For any* markdown document, every chunk body SHALL be a contiguous
/// substring of the original document text, so no chunk invents or
/// reorders content.
mod prop_content_provenance {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunk_bodies_are_substrings(
            text in arb_markdown_doc(),
            target in 8usize..48,
        ) {
            let chunks = chunker(target, 0.1).chunk(&text, "doc.md").unwrap();

            for chunk in &chunks {
                let body = chunk.content();
                prop_assert!(
                    text.contains(&body),
                    "chunk {} is not a substring of the source document",
                    chunk.chunk_id,
                );
            }
        }
    }
}
