use anyhow::{bail, Result};
use rayon::prelude::*;

use crate::volume::FieldBuffer;

/// A source of raw field data. The writer asks for one field at one time
/// step at a time and drops the buffer before requesting the next.
pub trait VolumeLoader {
    /// Fetch the named field at the given time step and ensemble member.
    fn field_entry(&self, field_name: &str, time_step: usize, member: usize) -> Result<FieldBuffer>;
}

/// Reverse every `bytes_per_entry`-byte run of `bytes` in place. Entries are
/// independent, so the chunks are swapped in parallel. Trailing bytes that do
/// not fill a whole entry are left untouched.
pub fn swap_endianness(bytes: &mut [u8], bytes_per_entry: usize) -> Result<()> {
    if bytes_per_entry == 0 || bytes_per_entry > 8 {
        bail!("swap_endianness: bytes_per_entry is {bytes_per_entry}, only 1..=8 is supported");
    }
    bytes
        .par_chunks_exact_mut(bytes_per_entry)
        .for_each(|entry| entry.reverse());
    Ok(())
}
