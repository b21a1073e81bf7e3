use std::cell::Cell;

use anyhow::{bail, Result};

use ncconv::loaders::VolumeLoader;
use ncconv::volume::{FieldBuffer, GridExtent, VolumeData};
use ncconv::writer::write_nc_file;

/// Serves ramp data: value = time * 1000 + linear index + 1.
struct RampLoader {
    xs: usize,
    ys: usize,
    /// Level count reported per field; 0 means 2-D.
    zs: usize,
    fetches: Cell<usize>,
}

impl RampLoader {
    fn new(xs: usize, ys: usize, zs: usize) -> Self {
        Self { xs, ys, zs, fetches: Cell::new(0) }
    }
}

impl VolumeLoader for RampLoader {
    fn field_entry(&self, _field_name: &str, time_step: usize, _member: usize) -> Result<FieldBuffer> {
        self.fetches.set(self.fetches.get() + 1);
        let n = self.xs * self.ys * self.zs.max(1);
        let data = (0..n).map(|i| (time_step * 1000 + i + 1) as f32).collect();
        Ok(FieldBuffer { data, xs: self.xs, ys: self.ys, zs: self.zs })
    }
}

fn grid_3x2x1() -> GridExtent {
    GridExtent::new(vec![0.0, 1.0, 2.0], vec![10.0, 11.0], vec![500.0]).unwrap()
}

fn var_dim_names(var: &netcdf::Variable) -> Vec<String> {
    var.dimensions().iter().map(|d| d.name()).collect()
}

#[test]
fn static_2d_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("static2d.nc");

    let loader = RampLoader::new(3, 2, 0);
    let mut volume = VolumeData::new(grid_3x2x1(), &loader);
    volume.set_field_names(vec!["pressure".to_string()]);
    write_nc_file(&volume, &path).unwrap();
    assert_eq!(loader.fetches.get(), 1);

    let file = netcdf::open(&path).unwrap();
    assert!(file.dimension("time").is_none());
    assert!(file.dimension("member").is_none());

    let var = file.variable("pressure").unwrap();
    assert_eq!(var_dim_names(&var), ["y", "x"]);
    let values: Vec<f32> = var.get_values(..).unwrap();
    assert_eq!(values, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
}

#[test]
fn time_dependent_2d_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("time2d.nc");

    let loader = RampLoader::new(3, 2, 0);
    let mut volume = VolumeData::new(grid_3x2x1(), &loader);
    volume.set_num_time_steps(2);
    volume.set_field_names(vec!["pressure".to_string()]);
    write_nc_file(&volume, &path).unwrap();
    // One fresh buffer per time step.
    assert_eq!(loader.fetches.get(), 2);

    let file = netcdf::open(&path).unwrap();
    assert_eq!(file.dimension("time").unwrap().len(), 2);

    let var = file.variable("pressure").unwrap();
    assert_eq!(var_dim_names(&var), ["time", "y", "x"]);
    let values: Vec<f32> = var.get_values(..).unwrap();
    assert_eq!(
        values,
        [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 1001.0, 1002.0, 1003.0, 1004.0, 1005.0, 1006.0]
    );
}

#[test]
fn time_dependent_3d_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("time3d.nc");

    let grid = GridExtent::new(vec![0.0, 1.0, 2.0], vec![10.0, 11.0], vec![500.0, 850.0]).unwrap();
    let loader = RampLoader::new(3, 2, 2);
    let mut volume = VolumeData::new(grid, &loader);
    volume.set_num_time_steps(2);
    volume.set_field_names(vec!["temp".to_string()]);
    write_nc_file(&volume, &path).unwrap();

    let file = netcdf::open(&path).unwrap();
    let var = file.variable("temp").unwrap();
    assert_eq!(var_dim_names(&var), ["time", "z", "y", "x"]);
    let values: Vec<f32> = var.get_values(..).unwrap();
    assert_eq!(values.len(), 2 * 2 * 2 * 3);
    // t=0 holds [1..12], t=1 holds [1001..1012], both z-y-x ordered.
    assert_eq!(&values[..12], (1..=12).map(|v| v as f32).collect::<Vec<_>>().as_slice());
    assert_eq!(&values[12..], (1001..=1012).map(|v| v as f32).collect::<Vec<_>>().as_slice());
}

#[test]
fn static_3d_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("static3d.nc");

    let grid = GridExtent::new(vec![0.0, 1.0, 2.0], vec![10.0, 11.0], vec![500.0, 850.0]).unwrap();
    let loader = RampLoader::new(3, 2, 2);
    let mut volume = VolumeData::new(grid, &loader);
    volume.set_field_names(vec!["temp".to_string()]);
    write_nc_file(&volume, &path).unwrap();

    let file = netcdf::open(&path).unwrap();
    let var = file.variable("temp").unwrap();
    assert_eq!(var_dim_names(&var), ["z", "y", "x"]);
}

#[test]
fn coordinate_variables_and_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("coords.nc");

    let loader = RampLoader::new(3, 2, 0);
    let mut volume = VolumeData::new(grid_3x2x1(), &loader);
    volume.set_field_names(vec!["f".to_string()]);
    write_nc_file(&volume, &path).unwrap();

    let file = netcdf::open(&path).unwrap();
    let x: Vec<f32> = file.variable("x").unwrap().get_values(..).unwrap();
    let lon: Vec<f32> = file.variable("lon").unwrap().get_values(..).unwrap();
    assert_eq!(x, [0.0, 1.0, 2.0]);
    assert_eq!(lon, x);

    let y: Vec<f32> = file.variable("y").unwrap().get_values(..).unwrap();
    let lat: Vec<f32> = file.variable("lat").unwrap().get_values(..).unwrap();
    assert_eq!(y, [10.0, 11.0]);
    assert_eq!(lat, y);

    let z: Vec<f32> = file.variable("z").unwrap().get_values(..).unwrap();
    assert_eq!(z, [500.0]);

    match file.attribute("Conventions").unwrap().value().unwrap() {
        netcdf::AttributeValue::Str(s) => assert_eq!(s, "CF-1.5"),
        other => panic!("unexpected attribute type: {other:?}"),
    }
}

#[test]
fn member_dimension_declared_but_unwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("members.nc");

    let loader = RampLoader::new(3, 2, 0);
    let mut volume = VolumeData::new(grid_3x2x1(), &loader);
    volume.set_ensemble_member_count(4);
    volume.set_field_names(vec!["f".to_string()]);
    write_nc_file(&volume, &path).unwrap();
    // Only member 0 is ever requested.
    assert_eq!(loader.fetches.get(), 1);

    let file = netcdf::open(&path).unwrap();
    assert_eq!(file.dimension("member").unwrap().len(), 4);
    // The field variable itself has no member dimension.
    let var = file.variable("f").unwrap();
    assert_eq!(var_dim_names(&var), ["y", "x"]);
}

/// Loader whose buffer size disagrees with its declared extents.
struct BrokenLoader;

impl VolumeLoader for BrokenLoader {
    fn field_entry(&self, _field_name: &str, _time_step: usize, _member: usize) -> Result<FieldBuffer> {
        Ok(FieldBuffer { data: vec![0.0; 5], xs: 3, ys: 2, zs: 0 })
    }
}

/// Loader whose extents disagree with the grid's.
struct OffGridLoader;

impl VolumeLoader for OffGridLoader {
    fn field_entry(&self, _field_name: &str, _time_step: usize, _member: usize) -> Result<FieldBuffer> {
        Ok(FieldBuffer { data: vec![0.0; 8], xs: 4, ys: 2, zs: 0 })
    }
}

/// Loader that fails outright.
struct FailingLoader;

impl VolumeLoader for FailingLoader {
    fn field_entry(&self, field_name: &str, _time_step: usize, _member: usize) -> Result<FieldBuffer> {
        bail!("no data for '{field_name}'");
    }
}

#[test]
fn buffer_size_mismatch_fails_the_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.nc");

    let loader = BrokenLoader;
    let mut volume = VolumeData::new(grid_3x2x1(), &loader);
    volume.set_field_names(vec!["f".to_string()]);
    let err = write_nc_file(&volume, &path).unwrap_err();
    assert!(err.to_string().contains("buffer size mismatch"));
}

#[test]
fn grid_extent_mismatch_names_the_field() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offgrid.nc");

    let loader = OffGridLoader;
    let mut volume = VolumeData::new(grid_3x2x1(), &loader);
    volume.set_field_names(vec!["f".to_string()]);
    let err = write_nc_file(&volume, &path).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("'f'"), "unexpected message: {msg}");
    assert!(msg.contains("don't match the grid"), "unexpected message: {msg}");
}

#[test]
fn loader_failure_aborts_the_write() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("failing.nc");

    let loader = FailingLoader;
    let mut volume = VolumeData::new(grid_3x2x1(), &loader);
    volume.set_field_names(vec!["f".to_string()]);
    assert!(write_nc_file(&volume, &path).is_err());
}

#[test]
fn unwritable_output_path_fails() {
    let loader = RampLoader::new(3, 2, 0);
    let mut volume = VolumeData::new(grid_3x2x1(), &loader);
    volume.set_field_names(vec!["f".to_string()]);
    let err = write_nc_file(&volume, std::path::Path::new("/nonexistent/dir/out.nc")).unwrap_err();
    assert!(err.to_string().contains("couldn't be opened"));
}
