use std::path::Path;

use anyhow::{anyhow, bail, Result};

use crate::volume::{FieldBuffer, GridExtent, VolumeData};

// Fixed global attributes of every produced file.
const CONVENTIONS: &str = "CF-1.5";
const TITLE: &str = "Exported scalar field";
const HISTORY: &str = "ncconv";
const INSTITUTION: &str =
    "Technical University of Munich, Chair of Computer Graphics and Visualization";
const SOURCE: &str =
    "ncconv, a utility program for converting meteorological data sets to the NetCDF format.";
const REFERENCES: &str = "https://github.com/chrismile/ncconv";
const COMMENT: &str = "ncconv is released under the 2-clause BSD license.";

/// Dimension tuple of one output variable plus the slots of the z and y
/// offsets inside the hyperslab start vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimLayout {
    pub dims: Vec<&'static str>,
    pub zloc: Option<usize>,
    pub yloc: usize,
}

/// Pick the dimension order for a field from the data set's time-step count
/// and the field's (clamped) vertical level count.
pub fn dimension_layout(ts: usize, varzs: usize) -> DimLayout {
    if ts <= 1 && varzs > 1 {
        DimLayout { dims: vec!["z", "y", "x"], zloc: Some(0), yloc: 1 }
    } else if ts > 1 && varzs > 1 {
        DimLayout { dims: vec!["time", "z", "y", "x"], zloc: Some(1), yloc: 2 }
    } else if ts <= 1 {
        DimLayout { dims: vec!["y", "x"], zloc: None, yloc: 0 }
    } else {
        DimLayout { dims: vec!["time", "y", "x"], zloc: None, yloc: 1 }
    }
}

fn check_entry_size(field_name: &str, entry: &FieldBuffer, grid: &GridExtent) -> Result<()> {
    if entry.xs != grid.xs() || entry.ys != grid.ys() {
        bail!(
            "field '{}': buffer extents {}x{} don't match the grid's {}x{}",
            field_name,
            entry.xs,
            entry.ys,
            grid.xs(),
            grid.ys()
        );
    }
    let expected = entry.levels() * entry.ys * entry.xs;
    if entry.data.len() != expected {
        bail!(
            "field '{}': buffer size mismatch, expected {}x{}x{} = {} values, got {}",
            field_name,
            entry.levels(),
            entry.ys,
            entry.xs,
            expected,
            entry.data.len()
        );
    }
    Ok(())
}

/// Stream the whole volume into a NetCDF file at `path`, one x-row per write.
///
/// The schema is set up once (global attributes, dimensions, coordinate
/// variables), then every field is written time step by time step. A fresh
/// field buffer is requested per `(field, time)` pair and dropped before the
/// next one is fetched, so at most one field's single-time-step data is
/// resident at any point.
pub fn write_nc_file(volume: &VolumeData, path: &Path) -> Result<()> {
    let mut nc = netcdf::create(path)
        .map_err(|e| anyhow!("output file '{}' couldn't be opened: {e}", path.display()))?;

    nc.add_attribute("Conventions", CONVENTIONS)?;
    nc.add_attribute("title", TITLE)?;
    nc.add_attribute("history", HISTORY)?;
    nc.add_attribute("institution", INSTITUTION)?;
    nc.add_attribute("source", SOURCE)?;
    nc.add_attribute("references", REFERENCES)?;
    nc.add_attribute("comment", COMMENT)?;

    let grid = volume.grid();
    let xs = grid.xs();
    let ts = volume.num_time_steps();
    let es = volume.ensemble_member_count();

    nc.add_dimension("x", xs)?;
    nc.add_dimension("y", grid.ys())?;
    nc.add_dimension("z", grid.zs())?;
    if ts > 1 {
        nc.add_dimension("time", ts)?;
    }
    // Declared for downstream consumers, but per-member writes are not wired
    // up; every field is taken from member 0.
    if es > 1 {
        nc.add_dimension("member", es)?;
    }

    // Cell-center coordinate variables, plus geographic aliases carrying the
    // same values. VTK's NetCDF reader looks for lon/lat rather than x/y.
    {
        let mut var = nc.add_variable::<f32>("x", &["x"])?;
        var.put_attribute("coordinate_type", "Cartesian X")?;
        var.put_values(grid.lon1d(), ..)?;
    }
    {
        let mut var = nc.add_variable::<f32>("y", &["y"])?;
        var.put_attribute("coordinate_type", "Cartesian Y")?;
        var.put_values(grid.lat1d(), ..)?;
    }
    {
        let mut var = nc.add_variable::<f32>("z", &["z"])?;
        var.put_attribute("coordinate_type", "Cartesian Z")?;
        var.put_values(grid.lev1d(), ..)?;
    }
    {
        let mut var = nc.add_variable::<f32>("lon", &["x"])?;
        var.put_values(grid.lon1d(), ..)?;
    }
    {
        let mut var = nc.add_variable::<f32>("lat", &["y"])?;
        var.put_values(grid.lat1d(), ..)?;
    }

    for field_name in volume.field_names() {
        println!("Writing variable '{field_name}'...");

        // Probe time step 0 to learn the field's rank.
        let mut entry = volume.field_entry(field_name, 0, 0)?;
        check_entry_size(field_name, &entry, grid)?;
        let layout = dimension_layout(ts, entry.levels());

        let mut start = vec![0usize; layout.dims.len()];
        let mut count = vec![1usize; layout.dims.len()];
        count[layout.dims.len() - 1] = xs;

        let mut var = nc.add_variable::<f32>(field_name, &layout.dims)?;
        for t in 0..ts {
            if t != 0 {
                // Release the previous step's buffer before fetching the next.
                drop(entry);
                entry = volume.field_entry(field_name, t, 0)?;
                check_entry_size(field_name, &entry, grid)?;
                start[0] = t;
            }
            for z in 0..entry.levels() {
                if let Some(zloc) = layout.zloc {
                    start[zloc] = z;
                }
                for y in 0..entry.ys {
                    start[layout.yloc] = y;
                    var.put_values(entry.row(z, y), (&start[..], &count[..]))?;
                }
            }
        }
    }

    nc.close()
        .map_err(|e| anyhow!("closing output file '{}' failed: {e}", path.display()))?;
    Ok(())
}
