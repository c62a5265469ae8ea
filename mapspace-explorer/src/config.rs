use serde::Deserialize;

use crate::error::Result;

/// Knobs of the spatial mapping stage. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// allow several loop dimensions on one array axis
    pub enable_mix_spatial_mapping_generation: bool,
    /// keep only the best-utilized candidates per array axis
    pub maximize_hardware_utilization: bool,
    /// enlarge the innermost activation memory for overlapping unrolls
    pub enable_weight_diagonal_mapping: bool,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        ExplorerConfig {
            enable_mix_spatial_mapping_generation: false,
            maximize_hardware_utilization: true,
            enable_weight_diagonal_mapping: false,
        }
    }
}

impl ExplorerConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
