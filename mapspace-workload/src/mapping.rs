use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use crate::error::{Result, WorkloadError};
use crate::ids::{LayerDim, OADimension};

/// Unrolling of loop dimensions along a single array axis
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MappingSingleOADim(BTreeMap<LayerDim, u32>);

impl MappingSingleOADim {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, dim: LayerDim, unroll: u32) -> Self {
        self.insert(dim, unroll); self
    }

    // factors of 1 carry no information and are dropped
    pub fn insert(&mut self, dim: LayerDim, unroll: u32) {
        if unroll > 1 { self.0.insert(dim, unroll); }
    }

    pub fn get(&self, dim: &LayerDim) -> u32 {
        self.0.get(dim).copied().unwrap_or(1)
    }

    pub fn contains(&self, dim: &LayerDim) -> bool { self.0.contains_key(dim) }

    pub fn iter(&self) -> impl Iterator<Item = (&LayerDim, u32)> + '_ {
        self.0.iter().map(|(d, u)| (d, *u))
    }

    pub fn dims(&self) -> impl Iterator<Item = &LayerDim> + '_ { self.0.keys() }

    /// Number of array elements used along this axis
    pub fn utilization(&self) -> u64 {
        self.0.values().map(|u| *u as u64).product()
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Parse the `"K, 8"` entries used by mapping payloads
    pub fn parse_user_input<S: AsRef<str>>(entries: &[S]) -> Result<Self> {
        let mut out = Self::new();
        for entry in entries {
            let entry = entry.as_ref();
            let Some((dim, unroll)) = entry.split_once(',') else {
                return Err(WorkloadError::MalformedMappingEntry(entry.to_owned()));
            };
            let unroll = unroll.trim().parse::<u32>()
                .map_err(|_| WorkloadError::MalformedMappingEntry(entry.to_owned()))?;
            if unroll == 0 || dim.trim().is_empty() {
                Err(WorkloadError::MalformedMappingEntry(entry.to_owned()))?
            }
            out.insert(LayerDim::new(dim), unroll);
        }
        Ok(out)
    }
}

/// Spatial mapping: unrolling per array axis.
/// An axis that is absent, or present with no loops, is not unrolled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SpatialMapping(BTreeMap<OADimension, MappingSingleOADim>);

impl SpatialMapping {
    pub fn empty() -> Self { Self::default() }

    pub fn with(mut self, oa_dim: OADimension, mapping: MappingSingleOADim) -> Self {
        self.0.insert(oa_dim, mapping); self
    }

    pub fn insert(&mut self, oa_dim: OADimension, mapping: MappingSingleOADim) {
        self.0.insert(oa_dim, mapping);
    }

    pub fn get(&self, oa_dim: &OADimension) -> Option<&MappingSingleOADim> { self.0.get(oa_dim) }

    pub fn contains(&self, oa_dim: &OADimension) -> bool { self.0.contains_key(oa_dim) }

    /// True when every given axis has an entry
    pub fn covers<'a>(&self, mut oa_dims: impl Iterator<Item = &'a OADimension>) -> bool {
        oa_dims.all(|d| self.contains(d))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OADimension, &MappingSingleOADim)> + '_ { self.0.iter() }

    /// Unroll factor of a loop dimension over all axes
    pub fn unrolling_of(&self, dim: &LayerDim) -> u32 {
        self.0.values().map(|m| m.get(dim)).product()
    }

    /// Loop dimensions unrolled anywhere in this mapping
    pub fn layer_dims(&self) -> BTreeSet<LayerDim> {
        self.0.values().flat_map(|m| m.dims().cloned()).collect()
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for SpatialMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (oa_dim, single)) in self.0.iter().enumerate() {
            if i != 0 { write!(f, ", ")?; }
            write!(f, "{oa_dim}: [")?;
            for (j, (dim, unroll)) in single.iter().enumerate() {
                if j != 0 { write!(f, ", ")?; }
                write!(f, "{dim}:{unroll}")?;
            }
            write!(f, "]")?;
        }
        write!(f, "}}")
    }
}

/// Preferred loop dimensions per array axis, consulted during generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpatialMappingHint(BTreeMap<OADimension, BTreeSet<LayerDim>>);

impl SpatialMappingHint {
    pub fn empty() -> Self { Self::default() }

    pub fn with<I: IntoIterator<Item = LayerDim>>(mut self, oa_dim: OADimension, dims: I) -> Self {
        self.0.insert(oa_dim, dims.into_iter().collect()); self
    }

    pub fn get(&self, oa_dim: &OADimension) -> Option<&BTreeSet<LayerDim>> { self.0.get(oa_dim) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
