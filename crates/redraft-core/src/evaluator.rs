//! Structural extraction of content proposals from assistant replies.
//!
//! The generator is instructed to put a proposed content replacement inside a
//! fenced block opened by a line reading ```` ```proposal ```` and closed by
//! ```` ``` ````, optionally followed by a `Changes:` section whose `- `
//! bullets summarize the edit. The evaluator only ever reacts to that fence:
//! a reply without one is an answer, not a proposal, and yields `None`.
//! False positives (applying an edit the user never asked for) are worse
//! than false negatives, so there is no prose heuristic fallback.

use regex::Regex;

use crate::session::Proposal;

pub struct ProposalEvaluator;

const PROPOSAL_FENCE_OPEN: &str = "```proposal";
const FENCE_CLOSE: &str = "```";

impl ProposalEvaluator {
    /// Extracts a proposal from a raw assistant reply, or `None` if the reply
    /// carries no structurally delimited content block.
    ///
    /// `source_message_index` is the conversation index of the assistant
    /// message the reply was recorded as.
    pub fn evaluate(reply: &str, source_message_index: usize) -> Option<Proposal> {
        let new_content = Self::extract_content_block(reply)?;
        let explanations = Self::extract_explanations(reply);
        Some(Proposal {
            new_content,
            explanations,
            source_message_index,
        })
    }

    /// Returns the body of the first well-formed proposal fence, if any.
    /// An opening fence without a closing line is treated as absent.
    fn extract_content_block(reply: &str) -> Option<String> {
        let mut lines = reply.lines();
        loop {
            let line = lines.next()?;
            if line.trim() == PROPOSAL_FENCE_OPEN {
                break;
            }
        }

        let mut body: Vec<&str> = Vec::new();
        for line in lines {
            if line.trim() == FENCE_CLOSE {
                return Some(body.join("\n"));
            }
            body.push(line);
        }
        // Unterminated fence: the generator was cut off mid-block.
        log::warn!("assistant reply contained an unterminated proposal fence; ignoring");
        None
    }

    /// Collects `- ` bullet lines following a `Changes:` header. Collection
    /// stops at the first line that is neither a bullet nor blank.
    fn extract_explanations(reply: &str) -> Vec<String> {
        let header = Regex::new(r"(?i)^changes:\s*$").expect("static regex");
        let mut explanations = Vec::new();
        let mut in_changes = false;
        for line in reply.lines() {
            let trimmed = line.trim();
            if header.is_match(trimmed) {
                in_changes = true;
                continue;
            }
            if !in_changes {
                continue;
            }
            if let Some(bullet) = trimmed.strip_prefix("- ") {
                let bullet = bullet.trim();
                if !bullet.is_empty() {
                    explanations.push(bullet.to_string());
                }
            } else if trimmed.is_empty() {
                continue;
            } else {
                break;
            }
        }
        explanations
    }

    /// Strips the proposal fence out of a reply, leaving the prose the user
    /// should see alongside a "review the suggested change" affordance.
    pub fn prose_without_proposal(reply: &str) -> String {
        let mut out: Vec<&str> = Vec::new();
        let mut in_fence = false;
        for line in reply.lines() {
            let trimmed = line.trim();
            if !in_fence && trimmed == PROPOSAL_FENCE_OPEN {
                in_fence = true;
                continue;
            }
            if in_fence {
                if trimmed == FENCE_CLOSE {
                    in_fence = false;
                }
                continue;
            }
            out.push(line);
        }
        out.join("\n").trim().to_string()
    }
}
