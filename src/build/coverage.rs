//! Per-layer inclusion statistics of a build.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Counts for one layer across all processed partitions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayerCoverage {
    /// Rows read from raw files
    pub total: u64,
    /// Rows carrying a tag
    pub labeled: u64,
    /// Record placements into leaf extracts; a record matching several
    /// leaves counts once per leaf
    pub included: u64,
}

impl LayerCoverage {
    /// included / labeled
    pub fn inclusion_ratio(&self) -> Option<f64> {
        ratio(self.included, self.labeled)
    }

    /// labeled / total
    pub fn labeling_ratio(&self) -> Option<f64> {
        ratio(self.labeled, self.total)
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageReport {
    pub layers: BTreeMap<String, LayerCoverage>,
}

impl CoverageReport {
    pub fn layer_mut(&mut self, layer: &str) -> &mut LayerCoverage {
        self.layers.entry(layer.to_string()).or_default()
    }

    pub fn layer(&self, layer: &str) -> Option<&LayerCoverage> {
        self.layers.get(layer)
    }

    pub fn log(&self) {
        info!("POI coverage per layer (included/labeled, labeled/total):");
        for (layer, coverage) in &self.layers {
            info!(
                "  {}: {} / {}",
                layer,
                format_ratio(coverage.inclusion_ratio()),
                format_ratio(coverage.labeling_ratio())
            );
        }
    }
}

fn format_ratio(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| "n/a".to_string(), |r| format!("{:.3}", r))
}
