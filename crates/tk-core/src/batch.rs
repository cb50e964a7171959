//! Thinking extraction for complete (non-streamed) response bodies.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

static THINKING_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<thinking>(.*?)</thinking>").expect("thinking block pattern is valid")
});

/// Every thinking block found in a body, plus what remains around them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedThinking {
    /// Inner text of each block, trimmed, in order of appearance.
    pub blocks: Vec<String>,
    /// The body with every block removed, trimmed at both ends only.
    pub clean_text: String,
}

/// Extract all `<thinking>...</thinking>` spans from `text`.
///
/// Each open tag pairs with the nearest following close tag. Whitespace
/// surrounding a removed block is kept, so `"a <thinking>x</thinking> b"`
/// leaves `"a  b"`.
pub fn extract_all(text: &str) -> ExtractedThinking {
    let blocks: Vec<String> = THINKING_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|inner| inner.as_str().trim().to_string())
        .collect();

    let clean_text = THINKING_BLOCK.replace_all(text, "").trim().to_string();

    if !blocks.is_empty() {
        debug!(
            block_count = blocks.len(),
            clean_len = clean_text.len(),
            "Extracted thinking blocks from complete body"
        );
    }

    ExtractedThinking { blocks, clean_text }
}

/// Strip thinking tags from a body, joining the blocks into one reasoning string.
///
/// Returns `None` for the reasoning when the body has no blocks.
pub fn strip_thinking_tags(text: &str) -> (String, Option<String>) {
    let ExtractedThinking { blocks, clean_text } = extract_all(text);
    if blocks.is_empty() {
        (clean_text, None)
    } else {
        (clean_text, Some(blocks.join("\n\n")))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_extract_with_interior_whitespace() {
        let extracted =
            extract_all("pre <thinking>A</thinking> mid <thinking>B</thinking> post");
        assert_eq!(extracted.blocks, vec!["A", "B"]);
        assert_eq!(extracted.clean_text, "pre  mid  post");
    }

    #[test]
    fn test_no_blocks_trims_input() {
        let extracted = extract_all("  \n just text \t ");
        assert!(extracted.blocks.is_empty());
        assert_eq!(extracted.clean_text, "just text");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract_all(""), ExtractedThinking::default());
    }

    #[test]
    fn test_blocks_are_trimmed_and_span_lines() {
        let extracted = extract_all("<thinking>\n  step one\n  step two\n</thinking>\n\nAnswer");
        assert_eq!(extracted.blocks, vec!["step one\n  step two"]);
        assert_eq!(extracted.clean_text, "Answer");
    }

    #[test]
    fn test_lazy_pairing() {
        let extracted = extract_all("<thinking>a</thinking>x</thinking>");
        assert_eq!(extracted.blocks, vec!["a"]);
        assert_eq!(extracted.clean_text, "x</thinking>");
    }

    #[test]
    fn test_nested_open_tag_pairs_with_nearest_close() {
        let extracted = extract_all("<thinking>outer <thinking>inner</thinking> tail");
        assert_eq!(extracted.blocks, vec!["outer <thinking>inner"]);
        assert_eq!(extracted.clean_text, "tail");
    }

    #[test]
    fn test_unterminated_block_is_left_alone() {
        let extracted = extract_all("answer <thinking>never closed");
        assert!(extracted.blocks.is_empty());
        assert_eq!(extracted.clean_text, "answer <thinking>never closed");
    }

    #[test]
    fn test_empty_block_is_kept() {
        let extracted = extract_all("<thinking>   </thinking>done");
        assert_eq!(extracted.blocks, vec![""]);
        assert_eq!(extracted.clean_text, "done");
    }

    #[test]
    fn test_strip_thinking_tags() {
        let (clean, thinking) =
            strip_thinking_tags("<thinking>first</thinking>Hi<thinking>second</thinking>");
        assert_eq!(clean, "Hi");
        assert_eq!(thinking.as_deref(), Some("first\n\nsecond"));

        let (clean, thinking) = strip_thinking_tags(" plain ");
        assert_eq!(clean, "plain");
        assert!(thinking.is_none());
    }
}
