//! Program extraction from developer replies.

use std::sync::LazyLock;

use regex::Regex;

static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```(?:python|py)?[ \t]*\n?(.*?)\s*```").expect("code fence regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Code(String),
    /// The reply was blank.
    Empty,
    /// More than one fenced block; the reply is ambiguous.
    MultipleBlocks(usize),
}

impl Extracted {
    /// Corrective feedback for a reply that did not yield a program.
    pub fn problem(&self) -> Option<String> {
        match self {
            Extracted::Code(_) => None,
            Extracted::Empty => Some("The reply contained no code.".to_string()),
            Extracted::MultipleBlocks(count) => Some(format!(
                "The reply contained {count} code blocks; return the whole program in exactly one block."
            )),
        }
    }
}

/// Program in `reply`: the single fenced block, or the whole reply when unfenced.
pub fn extract_code(reply: &str) -> Extracted {
    let blocks: Vec<&str> = CODE_FENCE_RE
        .captures_iter(reply)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();
    match blocks.as_slice() {
        [] => {
            let trimmed = reply.trim();
            if trimmed.is_empty() {
                Extracted::Empty
            } else {
                Extracted::Code(trimmed.to_string())
            }
        }
        [block] => {
            let trimmed = block.trim();
            if trimmed.is_empty() {
                Extracted::Empty
            } else {
                Extracted::Code(trimmed.to_string())
            }
        }
        many => Extracted::MultipleBlocks(many.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfenced_reply_is_the_program() {
        assert_eq!(
            extract_code("  def f():\n    return 1\n"),
            Extracted::Code("def f():\n    return 1".to_string())
        );
    }

    #[test]
    fn single_python_block_is_extracted() {
        let reply = "Here you go:\n```python\ndef f():\n    return 1\n```\nDone.";
        assert_eq!(
            extract_code(reply),
            Extracted::Code("def f():\n    return 1".to_string())
        );
    }

    #[test]
    fn bare_fence_is_extracted() {
        assert_eq!(
            extract_code("```\nprint(1)\n```"),
            Extracted::Code("print(1)".to_string())
        );
    }

    #[test]
    fn multiple_blocks_are_rejected() {
        let reply = "```py\na = 1\n```\nand\n```py\nb = 2\n```";
        assert_eq!(extract_code(reply), Extracted::MultipleBlocks(2));
        assert!(extract_code(reply).problem().is_some());
    }

    #[test]
    fn blank_reply_is_empty() {
        assert_eq!(extract_code("   \n"), Extracted::Empty);
        assert_eq!(extract_code("```python\n```"), Extracted::Empty);
    }
}
