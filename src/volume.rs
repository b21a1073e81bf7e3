use anyhow::{bail, Result};

use crate::loaders::VolumeLoader;

/// Spatial extents of the grid plus the cell-center positions along each
/// axis. The extents are the axis lengths, so they can never disagree with
/// the coordinate buffers.
pub struct GridExtent {
    lon1d: Vec<f32>,
    lat1d: Vec<f32>,
    lev1d: Vec<f32>,
}

impl GridExtent {
    pub fn new(lon1d: Vec<f32>, lat1d: Vec<f32>, lev1d: Vec<f32>) -> Result<Self> {
        if lon1d.is_empty() || lat1d.is_empty() || lev1d.is_empty() {
            bail!(
                "grid axes must be non-empty (got {}x{}x{})",
                lon1d.len(),
                lat1d.len(),
                lev1d.len()
            );
        }
        Ok(Self { lon1d, lat1d, lev1d })
    }

    pub fn xs(&self) -> usize { self.lon1d.len() }
    pub fn ys(&self) -> usize { self.lat1d.len() }
    pub fn zs(&self) -> usize { self.lev1d.len() }

    pub fn lon1d(&self) -> &[f32] { &self.lon1d }
    pub fn lat1d(&self) -> &[f32] { &self.lat1d }
    pub fn lev1d(&self) -> &[f32] { &self.lev1d }
}

/// One field at one time step, as handed out by a loader. `zs == 0` marks a
/// 2-D field without vertical levels.
pub struct FieldBuffer {
    pub data: Vec<f32>,
    pub xs: usize,
    pub ys: usize,
    pub zs: usize,
}

impl FieldBuffer {
    /// Number of vertical levels to iterate over, at least 1.
    pub fn levels(&self) -> usize {
        self.zs.max(1)
    }

    /// The contiguous x-row at the given level and row index.
    pub fn row(&self, z: usize, y: usize) -> &[f32] {
        let off = y * self.xs + z * self.xs * self.ys;
        &self.data[off..off + self.xs]
    }
}

/// The full description of one data set: grid, time-step count, ensemble
/// member count, field catalog, and the loader that serves the field data.
/// The loader is borrowed and must outlive the write.
pub struct VolumeData<'a> {
    grid: GridExtent,
    ts: usize,
    es: usize,
    field_names: Vec<String>,
    loader: &'a dyn VolumeLoader,
}

impl<'a> VolumeData<'a> {
    pub fn new(grid: GridExtent, loader: &'a dyn VolumeLoader) -> Self {
        Self { grid, ts: 1, es: 1, field_names: Vec::new(), loader }
    }

    pub fn set_num_time_steps(&mut self, ts: usize) {
        self.ts = ts.max(1);
    }

    pub fn set_ensemble_member_count(&mut self, es: usize) {
        self.es = es.max(1);
    }

    pub fn set_field_names(&mut self, field_names: Vec<String>) {
        self.field_names = field_names;
    }

    pub fn grid(&self) -> &GridExtent { &self.grid }
    pub fn num_time_steps(&self) -> usize { self.ts }
    pub fn ensemble_member_count(&self) -> usize { self.es }
    pub fn field_names(&self) -> &[String] { &self.field_names }

    /// Fetch one field at one time step from the attached loader.
    pub fn field_entry(&self, field_name: &str, time_step: usize, member: usize) -> Result<FieldBuffer> {
        self.loader.field_entry(field_name, time_step, member)
    }
}
