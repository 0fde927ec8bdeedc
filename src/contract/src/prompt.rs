// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (C) 2025 Jonathan D.A. Jewell

//! Prompt construction for the model ensemble

use crate::ShopInfo;
use review_oracle::LabelSet;

/// Delimiter that separates the review from everything the model may only read
pub const REVIEW_MARKER: &str = "[Review]";

/// Assemble the classification prompt.
///
/// Context passages are joined with newlines in retrieval order. The shop
/// block is left out entirely when there is no metadata.
pub fn build_prompt<S: AsRef<str>>(
    review: &str,
    context: &[S],
    shop_info: Option<&ShopInfo>,
    labels: &LabelSet,
) -> String {
    let context = context
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join("\n");

    let shop_block = shop_info
        .filter(|info| !info.is_empty())
        .map(render_shop_info)
        .unwrap_or_default();

    format!(
        "You are a location review classifier. Use the context below to classify the review. \
Only classify the {marker}.\n\
Return JSON ONLY: a single object with exactly two keys\n\
- \"label\" (one of: {labels}), do NOT invent any other label.\n\
- \"rationale\" (short explanation).\n\
{shop_block}\n\
Context: These are example reviews and policy excerpts (for reference only):\n\
{context}\n\
\n\
{marker} Review text to classify:\n\
{review}\n",
        marker = REVIEW_MARKER,
        labels = labels.prompt_listing(),
        shop_block = shop_block,
        context = context,
        review = review,
    )
}

fn render_shop_info(info: &ShopInfo) -> String {
    let mut block = String::from("Shop Info:\n");
    for (key, value) in info.iter() {
        block.push_str(&format!("- {}: {}\n", key, value));
    }
    block
}
