//! Relevance scoring boundary for reranking.

use async_trait::async_trait;

use crate::document::ChunkKind;
use crate::error::Result;

/// Scores how relevant a piece of content is to a query.
///
/// Scores are expected in `[0.0, 1.0]`; the reranker clamps whatever comes
/// back. A scorer that cannot produce a numeric score must return an error
/// rather than a made-up value, so the caller can fall back to the
/// candidate's weighted retrieval score.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Scores `content` against `query`.
    async fn score(&self, query: &str, content: &str, kind: ChunkKind) -> Result<f32>;
}

/// Builds the scoring prompt for LLM-backed scorers.
pub fn scoring_prompt(query: &str, content: &str, kind: ChunkKind) -> String {
    format!(
        r#"You are a relevance scoring expert. Score how relevant this content is to the user's query.

User Query: "{query}"

Content Type: {kind}
Content: "{content}"

Instructions:
1. Analyze if the content directly addresses the query
2. Consider semantic relevance, not just keyword matching
3. For tables: assess if the data structure is relevant
4. For images: evaluate if the summary relates to the query

Provide ONLY a relevance score between 0.0 and 1.0, where:
- 1.0 = Highly relevant, directly answers the query
- 0.7-0.9 = Relevant, provides useful information
- 0.4-0.6 = Somewhat relevant, tangentially related
- 0.0-0.3 = Not relevant

Score (0.0-1.0):"#
    )
}

/// Parses the first whitespace-separated token of a scorer reply as a
/// score, accepting a decimal comma. Returns `None` for non-numeric or
/// non-finite replies.
pub fn parse_score_reply(reply: &str) -> Option<f32> {
    let token = reply.split_whitespace().next()?;
    token
        .replace(',', ".")
        .parse::<f32>()
        .ok()
        .filter(|score| score.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_query_content_and_kind() {
        let prompt = scoring_prompt("total revenue", "Table: sales", ChunkKind::Table);
        assert!(prompt.contains(r#"User Query: "total revenue""#));
        assert!(prompt.contains("Content Type: table"));
        assert!(prompt.contains(r#"Content: "Table: sales""#));
        assert!(prompt.ends_with("Score (0.0-1.0):"));
    }

    #[test]
    fn parses_plain_and_comma_decimals() {
        assert_eq!(parse_score_reply("0.85"), Some(0.85));
        assert_eq!(parse_score_reply("0,85"), Some(0.85));
        assert_eq!(parse_score_reply("0.7 because the text matches"), Some(0.7));
    }

    #[test]
    fn rejects_non_numeric_replies() {
        assert_eq!(parse_score_reply("highly relevant"), None);
        assert_eq!(parse_score_reply(""), None);
        assert_eq!(parse_score_reply("NaN"), None);
    }
}
