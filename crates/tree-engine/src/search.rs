//! Keyword search over node fields
//!
//! Every match mode compiles down to one [`Regex`]; literal modes escape the
//! keyword first. A node matches when any configured field matches and all
//! custom filters accept it. Matches pull their whole ancestor chain into
//! the matched set.

use log::debug;
use regex::{Regex, RegexBuilder};
use std::collections::{HashMap, HashSet};
use tree_model::{Forest, HighlightRange, NodeField, NodeId, TraversalOrder, TreeNode, TreeTraversal};

use crate::config::{MatchMode, SearchConfig};

/// A keyword compiled for one search pass
#[derive(Debug, Clone)]
pub struct Matcher {
    mode: MatchMode,
    regex: Regex,
}

impl Matcher {
    /// Compile `keyword` for `mode`. Returns `None` for a malformed regex.
    pub fn new(keyword: &str, mode: MatchMode, case_sensitive: bool) -> Option<Self> {
        let pattern = match mode {
            MatchMode::Contains => regex::escape(keyword),
            MatchMode::StartsWith => format!("^{}", regex::escape(keyword)),
            MatchMode::EndsWith => format!("{}$", regex::escape(keyword)),
            MatchMode::Exact => format!("^{}$", regex::escape(keyword)),
            MatchMode::Regex => keyword.to_string(),
        };

        match RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
        {
            Ok(regex) => Some(Self { mode, regex }),
            Err(err) => {
                debug!("Ignoring malformed search pattern {:?}: {}", keyword, err);
                None
            }
        }
    }

    /// Byte ranges of every hit in `text`.
    ///
    /// `None` when the text does not match at all. A regex that only
    /// matches the empty string matches without producing ranges.
    pub fn find(&self, text: &str) -> Option<Vec<(usize, usize)>> {
        match self.mode {
            MatchMode::Contains => {
                let mut hits = Vec::new();
                let mut at = 0;
                while let Some(hit) = self.regex.find_at(text, at) {
                    hits.push((hit.start(), hit.end()));
                    // step one character past the hit start to catch overlaps
                    let step = text[hit.start()..].chars().next().map(char::len_utf8).unwrap_or(1);
                    at = hit.start() + step;
                    if at > text.len() {
                        break;
                    }
                }
                (!hits.is_empty()).then_some(hits)
            }
            MatchMode::StartsWith | MatchMode::EndsWith | MatchMode::Exact => self
                .regex
                .find(text)
                .map(|hit| vec![(hit.start(), hit.end())]),
            MatchMode::Regex => {
                if !self.regex.is_match(text) {
                    return None;
                }
                Some(
                    self.regex
                        .find_iter(text)
                        .filter(|hit| !hit.as_str().is_empty())
                        .map(|hit| (hit.start(), hit.end()))
                        .collect(),
                )
            }
        }
    }
}

/// Result of a search pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOutcome {
    /// Direct matches plus every ancestor on their paths
    pub matched: HashSet<NodeId>,
    /// Direct matches with their highlight ranges
    pub direct: HashMap<NodeId, Vec<HighlightRange>>,
    /// Ancestors to force open
    pub expand: HashSet<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchEngine {
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Whether `keyword` triggers a search pass at all
    pub fn is_active(&self, keyword: &str) -> bool {
        !keyword.trim().is_empty() || !self.config.filters.is_empty()
    }

    fn passes_filters(&self, node: &TreeNode) -> bool {
        self.config.filters.iter().all(|f| f.matches(node))
    }

    /// Highlight ranges of `node` for `matcher` across the configured fields.
    ///
    /// `None` if no field matches.
    pub fn match_node(&self, matcher: &Matcher, node: &TreeNode) -> Option<Vec<HighlightRange>> {
        let mut matched = false;
        let mut ranges = Vec::new();
        for field in &self.config.fields {
            let Some(text) = node.field_text(field) else {
                continue;
            };
            if let Some(hits) = matcher.find(&text) {
                matched = true;
                ranges.extend(hits.into_iter().map(|(start, end)| HighlightRange::new(field.clone(), start, end)));
            }
        }
        matched.then_some(ranges)
    }

    /// Run `keyword` over the whole forest.
    ///
    /// An empty keyword without filters yields an empty outcome; with
    /// filters, every node the filters accept matches without highlights.
    pub fn search(&self, forest: &Forest, keyword: &str) -> SearchOutcome {
        let mut outcome = SearchOutcome::default();
        if !self.is_active(keyword) {
            return outcome;
        }

        let matcher = if keyword.trim().is_empty() {
            None
        } else {
            match Matcher::new(keyword, self.config.mode, self.config.case_sensitive) {
                Some(matcher) => Some(matcher),
                None => return outcome,
            }
        };

        for id in forest.walk(TraversalOrder::PreOrder) {
            let Some(node) = forest.get(id) else {
                continue;
            };
            if !self.passes_filters(node) {
                continue;
            }
            let ranges = match &matcher {
                Some(matcher) => match self.match_node(matcher, node) {
                    Some(ranges) => ranges,
                    None => continue,
                },
                None => Vec::new(),
            };
            outcome.direct.insert(id, ranges);
            outcome.matched.insert(id);

            let mut parent = node.parent;
            while let Some(ancestor) = parent {
                if self.config.expand_matched {
                    outcome.expand.insert(ancestor);
                }
                if !outcome.matched.insert(ancestor) {
                    break;
                }
                parent = forest.get(ancestor).and_then(|n| n.parent);
            }
        }

        debug!(
            "Search {:?}: {} direct matches, {} matched",
            keyword,
            outcome.direct.len(),
            outcome.matched.len()
        );
        outcome
    }

    /// Text of `node`'s `field` split into (text, highlighted) runs using
    /// the ranges of the last search.
    pub fn segments(node: &TreeNode, field: &NodeField) -> Vec<(String, bool)> {
        let Some(text) = node.field_text(field) else {
            return Vec::new();
        };

        let mut ranges: Vec<(usize, usize)> = node
            .highlights
            .iter()
            .filter(|r| &r.field == field)
            .map(|r| (r.start, r.end))
            .collect();
        ranges.sort_unstable();

        let mut segments = Vec::new();
        let mut cursor = 0;
        for (start, end) in ranges {
            let start = start.max(cursor);
            if start >= end || !text.is_char_boundary(start) || !text.is_char_boundary(end) {
                continue;
            }
            if start > cursor {
                segments.push((text[cursor..start].to_string(), false));
            }
            segments.push((text[start..end].to_string(), true));
            cursor = end;
        }
        if cursor < text.len() {
            segments.push((text[cursor..].to_string(), false));
        }
        segments
    }
}
