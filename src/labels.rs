//! Significance letters
//!
//! Two schemes are used:
//! - per-comparison labels: every significant comparison takes the next
//!   letter of a [`LabelSequence`], non-significant ones read `"ns"`;
//! - connectivity letters (ANOVA/Tukey): members joined by a chain of
//!   non-significant pairs share a letter.
//!
//! Sequences are plain values created per analysis; nothing is shared
//! between runs.

use serde::{Deserialize, Serialize};

/// Label for comparisons that are not significant
pub const NOT_SIGNIFICANT: &str = "ns";

const ALPHABET: usize = 26;
/// a..z followed by aa..zz
const CYCLE_LEN: usize = ALPHABET + ALPHABET * ALPHABET;

/// The `n`-th label, 1-indexed: a, b, ..., z, aa, ab, ..., zz, then a again.
pub fn label(n: usize) -> String {
    let idx = n.saturating_sub(1) % CYCLE_LEN;
    let letter = |i: usize| char::from(b'a' + i as u8);
    if idx < ALPHABET {
        letter(idx).to_string()
    } else {
        let idx = idx - ALPHABET;
        [letter(idx / ALPHABET), letter(idx % ALPHABET)].iter().collect()
    }
}

/// Endless label iterator, restarting at "a" for every new instance
#[derive(Debug, Clone, Default)]
pub struct LabelSequence {
    issued: usize,
}

impl LabelSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of labels handed out so far
    pub fn issued(&self) -> usize {
        self.issued
    }
}

impl Iterator for LabelSequence {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.issued += 1;
        Some(label(self.issued))
    }
}

/// Label each comparison in iteration order: next letter if significant,
/// `"ns"` otherwise.
pub fn label_comparisons(significant: &[bool]) -> Vec<String> {
    let mut sequence = LabelSequence::new();
    significant
        .iter()
        .map(|&sig| match sig {
            true => sequence.next().unwrap_or_default(),
            false => NOT_SIGNIFICANT.to_string(),
        })
        .collect()
}

/// Letter shared by a connected set of members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterAssignment {
    pub group: String,
    pub subgroup: Option<String>,
    pub letter: String,
}

/// Disjoint-set forest over member indices
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // keep the earlier member as root so components are ordered by first member
            let (keep, merge) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[merge] = keep;
        }
    }
}

/// Connectivity letters for `members` members given the non-significant
/// pairs `(i, j)`. Components are lettered in order of their first member.
///
/// This is a union of "not different" pairs, not a minimal compact letter
/// display: with A≈B, B≈C and A≠C all three share one letter.
pub fn connected_letters(members: usize, not_different: &[(usize, usize)]) -> Vec<String> {
    let mut sets = UnionFind::new(members);
    for &(i, j) in not_different {
        sets.union(i, j);
    }

    let mut sequence = LabelSequence::new();
    let mut root_letters: Vec<(usize, String)> = Vec::new();
    (0..members)
        .map(|i| {
            let root = sets.find(i);
            match root_letters.iter().find(|(r, _)| *r == root) {
                Some((_, letter)) => letter.clone(),
                None => {
                    let letter = sequence.next().unwrap_or_default();
                    root_letters.push((root, letter.clone()));
                    letter
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_positions() {
        assert_eq!(label(1), "a");
        assert_eq!(label(26), "z");
        assert_eq!(label(27), "aa");
        assert_eq!(label(28), "ab");
        assert_eq!(label(52), "az");
        assert_eq!(label(53), "ba");
        assert_eq!(label(702), "zz");
        assert_eq!(label(703), "a");
    }

    #[test]
    fn test_sequence_restarts_per_instance() {
        let first: Vec<String> = LabelSequence::new().take(3).collect();
        let second: Vec<String> = LabelSequence::new().take(3).collect();
        assert_eq!(first, vec!["a", "b", "c"]);
        assert_eq!(first, second);

        let mut seq = LabelSequence::new();
        assert_eq!(seq.nth(26).as_deref(), Some("aa"));
        assert_eq!(seq.issued(), 27);
    }

    #[test]
    fn test_label_comparisons() {
        let labels = label_comparisons(&[true, false, true, true]);
        assert_eq!(labels, vec!["a", "ns", "b", "c"]);
    }

    #[test]
    fn test_connected_letters_simple() {
        // A≈B, C differs from both
        let letters = connected_letters(3, &[(0, 1)]);
        assert_eq!(letters, vec!["a", "a", "b"]);
    }

    #[test]
    fn test_connected_letters_all_distinct() {
        assert_eq!(connected_letters(3, &[]), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_connected_letters_transitive() {
        // A≈B, B≈C: union-style grouping puts all three together
        assert_eq!(connected_letters(3, &[(0, 1), (1, 2)]), vec!["a", "a", "a"]);
        // ordering follows first member of each component
        assert_eq!(connected_letters(4, &[(1, 3)]), vec!["a", "b", "c", "b"]);
    }
}
