// USAGE ncconv --input /path/to/data.ctl --output /path/to/output.nc

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};

use ncconv::ctl::CtlLoader;
use ncconv::writer::write_nc_file;

// ─────────────────────────────────────────────────────────────────────
// Simple timing helper
// ─────────────────────────────────────────────────────────────────────
fn timeit<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let t0 = Instant::now();
    let out = f();
    eprintln!("{label:<20}{:?}", t0.elapsed());
    out
}

fn print_help() {
    println!("Supported options:");
    println!("--input or -i: Path to the input file.");
    println!("--output or -o: Path to the output file.");
}

fn main() -> Result<()> {
    let mut input: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--input" | "-i" => match args.next() {
                Some(path) => input = Some(PathBuf::from(path)),
                None => bail!("command line arguments '--input' and '-i' expect a file path"),
            },
            "--output" | "-o" => match args.next() {
                Some(path) => output = Some(PathBuf::from(path)),
                None => bail!("command line arguments '--output' and '-o' expect a file path"),
            },
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => bail!("unknown command line argument '{other}', use '--help' for more information"),
        }
    }

    let (Some(input), Some(output)) = (input, output) else {
        bail!("input or output file path not specified, use '--help' for more information");
    };
    if input.extension().and_then(|e| e.to_str()) != Some("ctl") {
        bail!("unsupported input file extension (expected '.ctl')");
    }

    println!("Opening input file...");
    let loader = timeit("parse_ctl", || CtlLoader::open(&input))?;
    let volume = loader.volume_data()?;

    println!("Writing output file...");
    timeit("write_netcdf", || write_nc_file(&volume, &output))?;

    Ok(())
}
