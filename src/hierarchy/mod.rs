//! Label hierarchy parsing.
//!
//! The hierarchy source is a table with columns
//! `[level1, level2, level3, synonym...]`. A non-empty level1 cell opens a
//! level1 context, a non-empty level2 cell opens a level2 context inside it,
//! and a non-empty level3 cell defines a leaf whose synonyms are the row's
//! remaining non-empty cells.

mod normalize;

pub use normalize::{is_multi_tag, normalize_label};

use anyhow::Context;
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{LabelHierarchy, LabelLeaf, Level1Node, Level2Node};

impl LabelHierarchy {
    /// Load the hierarchy from a CSV file with a header row
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Parsing label hierarchy from {}", path.display());
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::from_csv_reader(file)
    }

    /// Parse CSV content; the first row is a header and is skipped
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
        parse_rows(rows)
    }

    /// Write the normalized table, with a header, to a CSV file
    pub fn write_normalized<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        writer.write_record(["level1", "level2", "level3", "synonyms"])?;
        for row in self.to_rows() {
            writer.write_record(&row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Build a hierarchy from raw table rows (without header).
pub fn parse_rows<I, R, S>(rows: I) -> Result<LabelHierarchy>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tree = LabelHierarchy::default();
    let mut current_l1: Option<usize> = None;
    let mut current_l2: Option<usize> = None;

    for (idx, row) in rows.into_iter().enumerate() {
        let row_number = idx + 1;
        let cells: Vec<String> = row
            .into_iter()
            .map(|cell| normalize_label(cell.as_ref()))
            .collect();
        let cell = |i: usize| cells.get(i).map(String::as_str).unwrap_or("");

        let level1 = cell(0);
        if !level1.is_empty() {
            let pos = match tree.roots.iter().position(|n| n.name == level1) {
                Some(pos) => pos,
                None => {
                    tree.roots.push(Level1Node {
                        name: level1.to_string(),
                        children: Vec::new(),
                    });
                    tree.roots.len() - 1
                }
            };
            tree.labels.insert(level1.to_string());
            current_l1 = Some(pos);
            current_l2 = None;
        }

        let level2 = cell(1);
        if !level2.is_empty() {
            let l1 = current_l1.ok_or_else(|| Error::MalformedHierarchy {
                row: row_number,
                reason: format!("level2 '{}' has no enclosing level1", level2),
            })?;
            let children = &mut tree.roots[l1].children;
            let pos = match children.iter().position(|n| n.name == level2) {
                Some(pos) => pos,
                None => {
                    children.push(Level2Node {
                        name: level2.to_string(),
                        leaves: Vec::new(),
                    });
                    children.len() - 1
                }
            };
            tree.labels.insert(level2.to_string());
            current_l2 = Some(pos);
        }

        let level3 = cell(2);
        if !level3.is_empty() {
            let (l1, l2) = match (current_l1, current_l2) {
                (Some(l1), Some(l2)) => (l1, l2),
                _ => {
                    return Err(Error::MalformedHierarchy {
                        row: row_number,
                        reason: format!("level3 '{}' has no enclosing level1/level2", level3),
                    })
                }
            };

            let synonyms: Vec<String> = cells
                .iter()
                .skip(3)
                .filter(|s| !s.is_empty())
                .cloned()
                .collect();

            tree.labels.insert(level3.to_string());
            tree.labels.extend(synonyms.iter().cloned());

            let leaves = &mut tree.roots[l1].children[l2].leaves;
            match leaves.iter_mut().find(|leaf| leaf.name == level3) {
                Some(leaf) => {
                    debug!("Leaf '{}' redefined at row {}", level3, row_number);
                    leaf.synonyms = synonyms;
                }
                None => leaves.push(LabelLeaf {
                    name: level3.to_string(),
                    synonyms,
                }),
            }
        }
    }

    info!(
        "Parsed label hierarchy: {} level1 nodes, {} leaves, {} distinct labels",
        tree.roots.len(),
        tree.leaf_count(),
        tree.labels.len()
    );

    Ok(tree)
}
