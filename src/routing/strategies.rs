//! Selection strategies.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a model is picked from the available candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// Cheapest combined per-token price
    CostOptimized,

    /// Highest entry in the quality ranking
    QualityOptimized,

    /// Lowest observed average latency
    LatencyOptimized,

    /// Weighted blend of cost, latency and failure rate
    #[default]
    Balanced,
}

impl SelectionStrategy {
    pub const ALL: [SelectionStrategy; 4] = [
        SelectionStrategy::CostOptimized,
        SelectionStrategy::QualityOptimized,
        SelectionStrategy::LatencyOptimized,
        SelectionStrategy::Balanced,
    ];
}

impl FromStr for SelectionStrategy {
    type Err = String;

    /// Accepts the kebab-case name, its snake_case spelling, or the short
    /// form (`cost`, `quality`, `latency`, `balanced`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "cost" | "cost-optimized" => Ok(SelectionStrategy::CostOptimized),
            "quality" | "quality-optimized" => Ok(SelectionStrategy::QualityOptimized),
            "latency" | "latency-optimized" => Ok(SelectionStrategy::LatencyOptimized),
            "balanced" => Ok(SelectionStrategy::Balanced),
            _ => Err(format!("Unknown selection strategy: {}", s)),
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionStrategy::CostOptimized => write!(f, "cost-optimized"),
            SelectionStrategy::QualityOptimized => write!(f, "quality-optimized"),
            SelectionStrategy::LatencyOptimized => write!(f, "latency-optimized"),
            SelectionStrategy::Balanced => write!(f, "balanced"),
        }
    }
}
