// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Grounded prompt assembly under a character budget

use crate::types::Item;

const INSTRUCTIONS: &str = "Answer the question using only the context items below. \
Each item starts with a tag like [item:ID]. Cite the items you rely on by their tags. \
If the context does not contain the answer, say so.";

/// Shortest item excerpt worth including after truncation
const MIN_EXCERPT_CHARS: usize = 32;

/// Limits applied when assembling context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Maximum prompt length in characters
    pub max_chars: usize,
    /// Maximum number of context items
    pub max_items: usize,
}

/// A prompt together with the items that made it in
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub text: String,
    /// Ids of included items, in rank order
    pub included: Vec<String>,
    /// True if an item was cut short or lower-ranked items were dropped
    pub truncated: bool,
}

pub fn item_tag(item_id: &str) -> String {
    format!("[item:{}]", item_id)
}

fn frame(question: &str, context: &str) -> String {
    format!(
        "{}\n\nContext:\n{}\nQuestion: {}\nAnswer:",
        INSTRUCTIONS, context, question
    )
}

/// Characters available for context once instructions and question are in
pub fn frame_overhead(question: &str) -> usize {
    frame(question, "").chars().count()
}

/// Include ranked items greedily; the first item that does not fit and every
/// item after it are dropped. Only the top item may be truncated to fit.
///
/// Returns `None` when not even the frame fits the budget.
pub fn assemble(question: &str, ranked: &[(String, String)], budget: ContextBudget) -> Option<AssembledPrompt> {
    let overhead = frame_overhead(question);
    if overhead > budget.max_chars {
        return None;
    }
    let mut remaining = budget.max_chars - overhead;
    let mut context = String::new();
    let mut included = Vec::new();
    let mut truncated = false;

    for (position, (item_id, text)) in ranked.iter().enumerate() {
        if included.len() >= budget.max_items {
            truncated = true;
            break;
        }
        let entry = format!("{} {}\n", item_tag(item_id), text);
        let entry_chars = entry.chars().count();
        if entry_chars <= remaining {
            remaining -= entry_chars;
            context.push_str(&entry);
            included.push(item_id.clone());
            continue;
        }

        truncated = true;
        if position == 0 {
            let tag_chars = item_tag(item_id).chars().count() + 2;
            let room = remaining.saturating_sub(tag_chars);
            if room >= MIN_EXCERPT_CHARS.min(text.chars().count()) && room > 0 {
                let excerpt: String = text.chars().take(room).collect();
                context.push_str(&format!("{} {}\n", item_tag(item_id), excerpt));
                included.push(item_id.clone());
            }
        }
        break;
    }

    Some(AssembledPrompt {
        text: frame(question, &context),
        included,
        truncated,
    })
}

/// Text the generator sees for one item
pub fn context_text(item: &Item) -> Option<String> {
    item.text_representation().map(|t| t.trim().to_string())
}
