use smallvec::SmallVec;

use crate::error::{Result, WorkloadError};
use crate::ids::LayerDim;

/// Loop dimension sizes in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerDimSizes(SmallVec<[(LayerDim, u64); 8]>);

impl LayerDimSizes {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, dim: impl Into<LayerDim>, size: u64) -> Self {
        self.insert(dim.into(), size); self
    }

    // overwrite in place so declaration order is kept
    pub fn insert(&mut self, dim: LayerDim, size: u64) {
        match self.0.iter_mut().find(|(d, _)| *d == dim) {
            Some(slot) => slot.1 = size,
            None => self.0.push((dim, size)),
        }
    }

    pub fn get(&self, dim: &LayerDim) -> Option<u64> {
        self.0.iter().find(|(d, _)| d == dim).map(|(_, s)| *s)
    }

    pub fn contains(&self, dim: &LayerDim) -> bool { self.get(dim).is_some() }

    pub fn iter(&self) -> impl Iterator<Item = (&LayerDim, u64)> + '_ {
        self.0.iter().map(|(d, s)| (d, *s))
    }

    /// Dimensions that actually iterate (size above one)
    pub fn loop_dims(&self) -> impl Iterator<Item = &LayerDim> + '_ {
        self.0.iter().filter(|(_, s)| *s > 1).map(|(d, _)| d)
    }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Number of points spanned by all dimensions together
    pub fn product(&self) -> Result<u64> {
        self.0.iter().try_fold(1u64, |acc, (_, s)| acc.checked_mul(*s))
            .ok_or(WorkloadError::Arithmetic("dimension size product overflows u64"))
    }

    /// First dimension whose size is zero
    pub fn first_empty(&self) -> Option<&LayerDim> {
        self.0.iter().find(|(_, s)| *s == 0).map(|(d, _)| d)
    }
}

impl<D: Into<LayerDim>> FromIterator<(D, u64)> for LayerDimSizes {
    fn from_iter<I: IntoIterator<Item = (D, u64)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (d, s) in iter { out.insert(d.into(), s); }
        out
    }
}
