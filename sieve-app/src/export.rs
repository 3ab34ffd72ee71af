use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use sieve_engine::Report;

/// Write `report` as pretty JSON to `path`, or to stdout when `path` is `-`.
pub fn write_json(report: &Report, path: &Path) -> Result<()> {
    if path == Path::new("-") {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        serde_json::to_writer_pretty(&mut out, report).context("failed to encode report")?;
        writeln!(out)?;
        return Ok(());
    }

    let file = File::create(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, report).context("failed to encode report")?;
    out.flush()
        .with_context(|| format!("failed to write output file: {}", path.display()))?;
    Ok(())
}
