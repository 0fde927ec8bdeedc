// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (C) 2025 Jonathan D.A. Jewell

//! Majority voting over ensemble outputs

use model_ensemble::ModelVote;
use review_oracle::{Label, LabelSet};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ============================================================================
// VOTE TALLY
// ============================================================================

/// Count of each distinct label, in the order labels were first tallied.
///
/// Serializes as a JSON object whose key order is the tally order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    entries: Vec<(Label, usize)>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally votes in the order given
    pub fn from_votes(votes: &[ModelVote]) -> Self {
        let mut tally = Self::new();
        for vote in votes {
            tally.record(&vote.label);
        }
        tally
    }

    pub fn record(&mut self, label: &Label) {
        match self.entries.iter_mut().find(|(l, _)| l == label) {
            Some((_, count)) => *count += 1,
            None => self.entries.push((label.clone(), 1)),
        }
    }

    pub fn count(&self, label: &Label) -> usize {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, usize)> {
        self.entries.iter().map(|(l, c)| (l, *c))
    }

    pub fn max_count(&self) -> usize {
        self.entries.iter().map(|(_, c)| *c).max().unwrap_or(0)
    }

    /// Labels sharing the highest count, in tally order
    pub fn leaders(&self) -> Vec<&Label> {
        let max = self.max_count();
        self.entries
            .iter()
            .filter(|(_, c)| *c == max && max > 0)
            .map(|(l, _)| l)
            .collect()
    }
}

impl Serialize for VoteTally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, count) in &self.entries {
            map.serialize_entry(label.as_str(), count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VoteTally {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TallyVisitor;

        impl<'de> Visitor<'de> for TallyVisitor {
            type Value = VoteTally;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label to vote count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<VoteTally, A::Error> {
                let mut entries = Vec::new();
                while let Some((label, count)) = access.next_entry::<String, usize>()? {
                    entries.push((Label::new(label), count));
                }
                Ok(VoteTally { entries })
            }
        }

        deserializer.deserialize_map(TallyVisitor)
    }
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// How a tie for the highest count is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The tied label whose first vote was tallied earliest wins
    FirstTallied,
    /// Label-set order wins, then `unknown`, then out-of-set labels in tally order
    #[default]
    LabelPriority,
}

/// Majority vote with the first-tallied tie-break.
///
/// With votes `[A, B]` the result is `A`; with `[B, A]` it is `B`. An empty
/// vote list yields `unknown` and an empty tally.
pub fn aggregate(votes: &[ModelVote]) -> (Label, VoteTally) {
    let tally = VoteTally::from_votes(votes);
    let label = tally
        .leaders()
        .first()
        .map(|l| (*l).clone())
        .unwrap_or_else(Label::unknown);
    (label, tally)
}

/// Majority vote with an explicit tie-break policy
pub fn aggregate_with(
    votes: &[ModelVote],
    tie_break: TieBreak,
    labels: &LabelSet,
) -> (Label, VoteTally) {
    match tie_break {
        TieBreak::FirstTallied => aggregate(votes),
        TieBreak::LabelPriority => {
            let tally = VoteTally::from_votes(votes);
            let unknown_rank = labels.len();
            let label = tally
                .leaders()
                .into_iter()
                .enumerate()
                .min_by_key(|(position, label)| match labels.priority(label) {
                    Some(rank) => rank,
                    None if label.is_unknown() => unknown_rank,
                    None => unknown_rank + 1 + position,
                })
                .map(|(_, label)| label.clone())
                .unwrap_or_else(Label::unknown);
            (label, tally)
        }
    }
}
