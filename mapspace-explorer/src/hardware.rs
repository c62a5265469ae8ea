//! Value model of the hardware an exploration maps onto.
//!
//! Everything here is immutable once built and shared through `Arc`.
//! Deriving a modified accelerator copies the touched parts and leaves the source usable.

use mapspace_workload::{MemOperand, OADimension, SpatialMapping};
use smallvec::SmallVec;
use std::{collections::{BTreeMap, BTreeSet}, sync::Arc};

use crate::error::{ExploreError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryInstance {
    pub name: String,
    /// capacity in bits
    pub size: u64,
    pub r_bw: u64,
    pub w_bw: u64,
    pub r_port: u32,
    pub w_port: u32,
    pub rw_port: u32,
}

impl MemoryInstance {
    pub fn new(name: &str, size: u64) -> Self {
        MemoryInstance { name: name.to_owned(), size, r_bw: 0, w_bw: 0, r_port: 1, w_port: 1, rw_port: 0 }
    }
}

/// Port used per transfer direction of one operand.
/// `fh`: from higher level, `tl`: to lower, `fl`: from lower, `th`: to higher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PortAllocation {
    pub fh: Option<String>,
    pub tl: Option<String>,
    pub fl: Option<String>,
    pub th: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryLevel {
    pub instance: MemoryInstance,
    pub operands: SmallVec<[MemOperand; 3]>,
    pub port_alloc: BTreeMap<MemOperand, PortAllocation>,
    /// array axes this level broadcasts to
    pub served_dimensions: BTreeSet<OADimension>,
}

impl MemoryLevel {
    pub fn new<O, D>(instance: MemoryInstance, operands: O, served_dimensions: D) -> Self
    where
        O: IntoIterator<Item = MemOperand>,
        D: IntoIterator<Item = OADimension>,
    {
        MemoryLevel {
            instance,
            operands: operands.into_iter().collect(),
            port_alloc: BTreeMap::new(),
            served_dimensions: served_dimensions.into_iter().collect(),
        }
    }

    pub fn with_port_alloc(mut self, operand: MemOperand, ports: PortAllocation) -> Self {
        self.port_alloc.insert(operand, ports); self
    }

    pub fn holds(&self, operand: &MemOperand) -> bool { self.operands.contains(operand) }
}

/// Memory levels of one core, ordered from the array outward
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryHierarchy {
    name: String,
    levels: Vec<MemoryLevel>,
}

impl MemoryHierarchy {
    pub fn new(name: &str, levels: Vec<MemoryLevel>) -> Self {
        MemoryHierarchy { name: name.to_owned(), levels }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn levels(&self) -> &[MemoryLevel] { &self.levels }

    /// Level closest to the array that holds `operand`
    pub fn innermost_for(&self, operand: &MemOperand) -> Option<(usize, &MemoryLevel)> {
        self.levels.iter().enumerate().find(|(_, l)| l.holds(operand))
    }

    /// Copy where only level `index` has its capacity multiplied by `factor`
    pub fn with_scaled_level(&self, name: &str, index: usize, factor: u64) -> MemoryHierarchy {
        let mut levels = self.levels.clone();
        if let Some(level) = levels.get_mut(index) {
            level.instance.size *= factor;
        }
        MemoryHierarchy { name: name.to_owned(), levels }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationalArray {
    dims: SmallVec<[(OADimension, u32); 3]>,
    pe_type: Option<String>,
}

impl OperationalArray {
    pub fn new<D: Into<OADimension>>(dims: impl IntoIterator<Item = (D, u32)>) -> Self {
        OperationalArray { dims: dims.into_iter().map(|(d, s)| (d.into(), s)).collect(), pe_type: None }
    }

    pub fn with_pe_type(mut self, pe_type: &str) -> Self {
        self.pe_type = Some(pe_type.to_owned()); self
    }

    pub fn dimensions(&self) -> impl Iterator<Item = &OADimension> + '_ { self.dims.iter().map(|(d, _)| d) }

    pub fn size(&self, dim: &OADimension) -> Option<u32> {
        self.dims.iter().find(|(d, _)| d == dim).map(|(_, s)| *s)
    }

    pub fn pe_type(&self) -> Option<&str> { self.pe_type.as_deref() }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Core {
    pub id: usize,
    pub operational_array: OperationalArray,
    pub memory_hierarchy: Arc<MemoryHierarchy>,
    /// fixed unrolling of some axes, if the core only supports that
    pub dataflows: Option<SpatialMapping>,
}

impl Core {
    pub fn new(id: usize, operational_array: OperationalArray, memory_hierarchy: MemoryHierarchy) -> Self {
        Core { id, operational_array, memory_hierarchy: Arc::new(memory_hierarchy), dataflows: None }
    }

    pub fn with_dataflows(mut self, dataflows: SpatialMapping) -> Self {
        self.dataflows = Some(dataflows); self
    }
}

#[derive(Debug, Clone)]
pub struct Accelerator {
    name: String,
    cores: Vec<Arc<Core>>,
    // unadapted accelerator this one was derived from
    origin: Option<Arc<Accelerator>>,
}

impl Accelerator {
    pub fn new(name: &str, cores: impl IntoIterator<Item = Core>) -> Self {
        Accelerator { name: name.to_owned(), cores: cores.into_iter().map(Arc::new).collect(), origin: None }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn cores(&self) -> &[Arc<Core>] { &self.cores }

    pub fn core(&self, id: usize) -> Result<&Arc<Core>> {
        self.cores.iter().find(|c| c.id == id)
            .ok_or_else(|| ExploreError::UnknownCore { accelerator: self.name.clone(), id })
    }

    pub fn origin(&self) -> Option<&Arc<Accelerator>> { self.origin.as_ref() }

    /// New accelerator where `core` replaces the core with the same id
    pub(crate) fn derive(self: &Arc<Self>, name: String, core: Core) -> Accelerator {
        let cores = self.cores.iter()
            .map(|c| if c.id == core.id { Arc::new(core.clone()) } else { Arc::clone(c) })
            .collect();
        Accelerator { name, cores, origin: Some(Arc::clone(self)) }
    }

    /// Content hash over the name and every core
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", (&self.name, &self.cores)));
        hex::encode(hasher.finalize())
    }
}

impl PartialEq for Accelerator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.cores == other.cores
    }
}
