//! Loader for GrADS-style CTL data set descriptors.
//!
//! A `.ctl` file describes the grid, time axis and variable catalog of a
//! packed binary data file (`DSET`). The binary layout served here is
//! direct-access float32: per ensemble member, per time step, per variable in
//! declaration order, `max(levs, 1)` planes of `ys * xs` values each with x
//! varying fastest. Fortran sequential record markers and templated data set
//! names are not supported and rejected at parse time.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};

use crate::loaders::{swap_endianness, VolumeLoader};
use crate::volume::{FieldBuffer, GridExtent, VolumeData};

#[derive(Debug)]
struct CtlVar {
    name: String,
    /// Declared vertical level count; 0 marks a 2-D field.
    levs: usize,
}

#[derive(Debug)]
pub struct CtlLoader {
    data_path: PathBuf,
    lon1d: Vec<f32>,
    lat1d: Vec<f32>,
    lev1d: Vec<f32>,
    ts: usize,
    es: usize,
    vars: Vec<CtlVar>,
    /// Whether the data file's byte order differs from the host's.
    byte_swap: bool,
}

/// Parse an XDEF/YDEF/ZDEF body: `<count> LINEAR <start> <incr>` or
/// `<count> LEVELS <v0> <v1> ...` with all levels on one line.
fn parse_axis(tokens: &[&str], keyword: &str) -> Result<Vec<f32>> {
    if tokens.len() < 2 {
        bail!("{keyword}: truncated axis definition");
    }
    let n: usize = tokens[0]
        .parse()
        .map_err(|_| anyhow!("{keyword}: bad count '{}'", tokens[0]))?;
    if n == 0 {
        bail!("{keyword}: count must be positive");
    }
    match tokens[1].to_ascii_uppercase().as_str() {
        "LINEAR" => {
            if tokens.len() < 4 {
                bail!("{keyword}: LINEAR needs a start and an increment");
            }
            let start: f32 = tokens[2]
                .parse()
                .map_err(|_| anyhow!("{keyword}: bad start '{}'", tokens[2]))?;
            let incr: f32 = tokens[3]
                .parse()
                .map_err(|_| anyhow!("{keyword}: bad increment '{}'", tokens[3]))?;
            Ok((0..n).map(|i| start + incr * i as f32).collect())
        }
        "LEVELS" => {
            let vals = tokens[2..]
                .iter()
                .map(|t| t.parse().map_err(|_| anyhow!("{keyword}: bad level '{t}'")))
                .collect::<Result<Vec<f32>>>()?;
            if vals.len() != n {
                bail!("{keyword}: expected {n} levels, got {}", vals.len());
            }
            Ok(vals)
        }
        other => bail!("{keyword}: unsupported mapping '{other}'"),
    }
}

impl CtlLoader {
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("input file '{}' couldn't be read: {e}", path.display()))?;

        let mut dset: Option<String> = None;
        let mut lon1d: Option<Vec<f32>> = None;
        let mut lat1d: Option<Vec<f32>> = None;
        let mut lev1d: Option<Vec<f32>> = None;
        let mut ts = 1usize;
        let mut es = 1usize;
        let mut byte_swap = false;
        let mut vars: Vec<CtlVar> = Vec::new();

        let mut lines = text.lines();
        while let Some(line) = lines.next() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('*') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens[0].to_ascii_uppercase().as_str() {
                "DSET" => {
                    let name = tokens.get(1).ok_or_else(|| anyhow!("DSET: missing file name"))?;
                    if name.contains('%') {
                        bail!("DSET: templated data set names are not supported");
                    }
                    dset = Some((*name).to_string());
                }
                "XDEF" => lon1d = Some(parse_axis(&tokens[1..], "XDEF")?),
                "YDEF" => lat1d = Some(parse_axis(&tokens[1..], "YDEF")?),
                "ZDEF" => lev1d = Some(parse_axis(&tokens[1..], "ZDEF")?),
                "TDEF" => {
                    let count = tokens.get(1).ok_or_else(|| anyhow!("TDEF: missing count"))?;
                    ts = count.parse().map_err(|_| anyhow!("TDEF: bad count '{count}'"))?;
                    if ts == 0 {
                        bail!("TDEF: count must be positive");
                    }
                }
                "EDEF" => {
                    let count = tokens.get(1).ok_or_else(|| anyhow!("EDEF: missing count"))?;
                    es = count.parse().map_err(|_| anyhow!("EDEF: bad count '{count}'"))?;
                    if es == 0 {
                        bail!("EDEF: count must be positive");
                    }
                }
                "OPTIONS" => {
                    for opt in &tokens[1..] {
                        match opt.to_ascii_lowercase().as_str() {
                            "big_endian" => byte_swap = cfg!(target_endian = "little"),
                            "little_endian" => byte_swap = cfg!(target_endian = "big"),
                            "byteswapped" => byte_swap = true,
                            "sequential" | "template" | "yrev" | "zrev" => {
                                bail!("OPTIONS: '{opt}' is not supported");
                            }
                            _ => {}
                        }
                    }
                }
                "VARS" => {
                    let count = tokens.get(1).ok_or_else(|| anyhow!("VARS: missing count"))?;
                    let n: usize =
                        count.parse().map_err(|_| anyhow!("VARS: bad count '{count}'"))?;
                    for _ in 0..n {
                        let var_line = lines
                            .next()
                            .ok_or_else(|| anyhow!("VARS: unexpected end of file"))?
                            .trim();
                        let vt: Vec<&str> = var_line.split_whitespace().collect();
                        if vt.len() < 2 {
                            bail!("VARS: malformed variable record '{var_line}'");
                        }
                        let levs: usize = vt[1]
                            .parse()
                            .map_err(|_| anyhow!("VARS: bad level count in '{var_line}'"))?;
                        vars.push(CtlVar { name: vt[0].to_string(), levs });
                    }
                    match lines.next().map(str::trim) {
                        Some(l) if l.eq_ignore_ascii_case("ENDVARS") => {}
                        _ => bail!("VARS: missing ENDVARS"),
                    }
                }
                // TITLE, UNDEF and further keywords don't affect the output.
                _ => {}
            }
        }

        let dset = dset.ok_or_else(|| anyhow!("descriptor has no DSET entry"))?;
        let lon1d = lon1d.ok_or_else(|| anyhow!("descriptor has no XDEF entry"))?;
        let lat1d = lat1d.ok_or_else(|| anyhow!("descriptor has no YDEF entry"))?;
        let lev1d = lev1d.ok_or_else(|| anyhow!("descriptor has no ZDEF entry"))?;
        if vars.is_empty() {
            bail!("descriptor has no variables");
        }
        for (i, v) in vars.iter().enumerate() {
            if v.levs > lev1d.len() {
                bail!("variable '{}': {} levels exceed the ZDEF count {}", v.name, v.levs, lev1d.len());
            }
            if vars[..i].iter().any(|w| w.name == v.name) {
                bail!("variable '{}' is declared twice", v.name);
            }
        }

        // `^` makes the data set path relative to the descriptor.
        let data_path = match dset.strip_prefix('^') {
            Some(rel) => path.parent().unwrap_or_else(|| Path::new(".")).join(rel),
            None => PathBuf::from(&dset),
        };

        let loader = Self { data_path, lon1d, lat1d, lev1d, ts, es, vars, byte_swap };

        let expected = (loader.es * loader.ts * loader.values_per_step() * 4) as u64;
        let actual = std::fs::metadata(&loader.data_path)
            .map_err(|e| anyhow!("data file '{}' couldn't be opened: {e}", loader.data_path.display()))?
            .len();
        if actual < expected {
            bail!(
                "data file '{}' is truncated: expected at least {expected} bytes, got {actual}",
                loader.data_path.display()
            );
        }

        Ok(loader)
    }

    /// Build the volume descriptor served by this loader.
    pub fn volume_data(&self) -> Result<VolumeData<'_>> {
        let grid = GridExtent::new(self.lon1d.clone(), self.lat1d.clone(), self.lev1d.clone())?;
        let mut volume = VolumeData::new(grid, self);
        volume.set_num_time_steps(self.ts);
        volume.set_ensemble_member_count(self.es);
        volume.set_field_names(self.vars.iter().map(|v| v.name.clone()).collect());
        Ok(volume)
    }

    fn plane_values(&self) -> usize {
        self.lon1d.len() * self.lat1d.len()
    }

    /// Float count of one full time step (all variables, all levels).
    fn values_per_step(&self) -> usize {
        let plane = self.plane_values();
        self.vars.iter().map(|v| v.levs.max(1) * plane).sum()
    }
}

impl VolumeLoader for CtlLoader {
    fn field_entry(&self, field_name: &str, time_step: usize, member: usize) -> Result<FieldBuffer> {
        let vi = self
            .vars
            .iter()
            .position(|v| v.name == field_name)
            .ok_or_else(|| anyhow!("unknown field '{field_name}'"))?;
        if time_step >= self.ts {
            bail!("field '{field_name}': time step {time_step} out of range (have {})", self.ts);
        }
        if member >= self.es {
            bail!("field '{field_name}': ensemble member {member} out of range (have {})", self.es);
        }

        let plane = self.plane_values();
        let preceding: usize = self.vars[..vi].iter().map(|v| v.levs.max(1) * plane).sum();
        let levs = self.vars[vi].levs.max(1);
        let offset = ((member * self.ts + time_step) * self.values_per_step() + preceding) as u64 * 4;

        let mut bytes = vec![0u8; levs * plane * 4];
        let mut file = File::open(&self.data_path)
            .map_err(|e| anyhow!("data file '{}' couldn't be opened: {e}", self.data_path.display()))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut bytes).map_err(|e| {
            anyhow!("data file '{}': short read for field '{field_name}': {e}", self.data_path.display())
        })?;
        if self.byte_swap {
            swap_endianness(&mut bytes, 4)?;
        }
        let data = bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(FieldBuffer {
            data,
            xs: self.lon1d.len(),
            ys: self.lat1d.len(),
            zs: self.vars[vi].levs,
        })
    }
}
