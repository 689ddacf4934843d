//! Append-only CSV destination for one device's samples

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

const HEADER: &str = "time (us),x (mdps),y (mdps),z (mdps)";

/// One device's record sink.
///
/// The destination is appended to, never truncated; the header row is
/// written only when the file is first created. Write order equals
/// sample-arrival order; there is a single writer by construction.
pub struct SampleLog {
    writer: BufWriter<File>,
}

impl SampleLog {
    /// Open (or create) the destination at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let fresh = file.metadata()?.len() == 0;

        let mut writer = BufWriter::new(file);
        if fresh {
            writeln!(writer, "{HEADER}")?;
        }

        Ok(Self { writer })
    }

    /// Append one sample row: epoch microseconds, then the three axes in
    /// milli-degrees per second.
    pub fn append(&mut self, timestamp_us: u64, x: f32, y: f32, z: f32) -> Result<()> {
        writeln!(self.writer, "{timestamp_us},{x:.2},{y:.2},{z:.2}")?;
        Ok(())
    }

    /// Push buffered rows to the OS. A no-op when nothing is pending.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
