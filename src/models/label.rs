//! Three-level label tree types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::GeometryKind;

/// Location of a leaf in the tree: level1 / level2 / level3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeafPath {
    pub level1: String,
    pub level2: String,
    pub level3: String,
}

impl LeafPath {
    pub fn new(level1: impl Into<String>, level2: impl Into<String>, level3: impl Into<String>) -> Self {
        Self {
            level1: level1.into(),
            level2: level2.into(),
            level3: level3.into(),
        }
    }

    /// Directory of this leaf below a database tree root
    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(&self.level1).join(&self.level2).join(&self.level3)
    }

    /// Query label, e.g. `food;restaurant;diner (point)`
    pub fn label(&self, kind: GeometryKind) -> String {
        format!("{} ({})", self, kind)
    }
}

impl std::fmt::Display for LeafPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{};{};{}", self.level1, self.level2, self.level3)
    }
}

/// Level-3 node: the finest classification, with its synonym tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelLeaf {
    pub name: String,
    pub synonyms: Vec<String>,
}

impl LabelLeaf {
    /// The leaf label followed by its synonyms
    pub fn match_terms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2Node {
    pub name: String,
    pub leaves: Vec<LabelLeaf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level1Node {
    pub name: String,
    pub children: Vec<Level2Node>,
}

/// Parsed label hierarchy.
///
/// Node order follows the source table; that order is the canonical leaf
/// traversal order for the build stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelHierarchy {
    pub roots: Vec<Level1Node>,

    /// Every distinct label in the table, including synonyms
    pub labels: BTreeSet<String>,
}

impl LabelHierarchy {
    /// Iterate over all leaves with their paths, in table order
    pub fn leaves(&self) -> impl Iterator<Item = (LeafPath, &LabelLeaf)> {
        self.roots.iter().flat_map(|l1| {
            l1.children.iter().flat_map(move |l2| {
                l2.leaves
                    .iter()
                    .map(move |leaf| (LeafPath::new(&l1.name, &l2.name, &leaf.name), leaf))
            })
        })
    }

    pub fn leaf_count(&self) -> usize {
        self.roots
            .iter()
            .flat_map(|l1| &l1.children)
            .map(|l2| l2.leaves.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    /// Look up a leaf by its three names
    pub fn leaf(&self, level1: &str, level2: &str, level3: &str) -> Option<&LabelLeaf> {
        self.roots
            .iter()
            .find(|n| n.name == level1)?
            .children
            .iter()
            .find(|n| n.name == level2)?
            .leaves
            .iter()
            .find(|n| n.name == level3)
    }

    /// Render the tree back into table rows `[level1, level2, level3, synonyms...]`
    pub fn to_rows(&self) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for l1 in &self.roots {
            rows.push(vec![l1.name.clone(), String::new(), String::new()]);
            for l2 in &l1.children {
                rows.push(vec![String::new(), l2.name.clone(), String::new()]);
                for leaf in &l2.leaves {
                    let mut row = vec![String::new(), String::new(), leaf.name.clone()];
                    row.extend(leaf.synonyms.iter().cloned());
                    rows.push(row);
                }
            }
        }
        rows
    }
}
