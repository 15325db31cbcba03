//! Post-processing of raw engine results.
//!
//! Generative speech models fail in two predictable ways on short radio
//! audio: boilerplate hallucinations ("thanks for watching") and stuck-loop
//! repetition of one segment. Both are repaired here before a transcript is
//! built.

use std::collections::HashSet;

use crate::config::{CleanupAction, CleanupRule, MatchType};
use crate::{Result, WhisperError, WhisperResult};

/// Apply the cleanup rules, then collapse repeated segment runs.
///
/// Rules are tested in order and the first match wins per segment. If every
/// segment matched a hallucination rule the whole result is rejected. The
/// repeat pass keeps a single copy of any run of three or more identical
/// segments; a run of exactly two is left alone.
///
/// Idempotent: running the output through again yields the same result.
pub fn cleanup_transcript(
    mut result: WhisperResult,
    config: &[CleanupRule],
) -> Result<WhisperResult> {
    let mut indices_to_delete: HashSet<usize> = HashSet::new();
    let mut hallucination_count = 0usize;

    for (i, segment) in result.segments.iter_mut().enumerate() {
        for rule in config {
            let trimmed = segment.text.trim().to_lowercase();
            let pattern = rule.pattern.to_lowercase();
            let is_match = match rule.match_type {
                MatchType::Partial => trimmed.contains(&pattern),
                MatchType::Full => trimmed == pattern,
            };
            if !is_match {
                continue;
            }
            if rule.is_hallucination {
                hallucination_count += 1;
            }
            match rule.action {
                CleanupAction::Delete => {
                    indices_to_delete.insert(i);
                }
                CleanupAction::Replace => match rule.match_type {
                    MatchType::Partial => {
                        segment.text = segment.text.replace(&rule.pattern, &rule.replacement);
                    }
                    MatchType::Full => {
                        segment.text = rule.replacement.clone();
                    }
                },
            }
            break;
        }
    }

    // An empty result counts as fully hallucinated too: there is nothing
    // downstream could index or notify about.
    if result.segments.len() == hallucination_count {
        return Err(WhisperError::TranscriptInvalid("100% hallucination".into()));
    }

    let mut prev_text = String::new();
    let mut times_repeated = 0usize;
    for i in 0..result.segments.len() {
        if result.segments[i].text == prev_text {
            times_repeated += 1;
            if times_repeated == 2 {
                // Third copy in a row: drop everything before it in the run.
                for j in (i - times_repeated)..i {
                    indices_to_delete.insert(j);
                }
            } else if times_repeated > 2 {
                indices_to_delete.insert(i);
            }
        } else {
            times_repeated = 0;
            prev_text = result.segments[i].text.clone();
        }
    }

    result.segments = result
        .segments
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !indices_to_delete.contains(i))
        .map(|(_, segment)| segment)
        .collect();
    result.rejoin_text();

    Ok(result)
}
