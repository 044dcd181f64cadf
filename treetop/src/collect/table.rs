//! Stand summary table as CSV. Absent statistics are written as empty cells.

use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::geometric::zonal::StandSummary;

/// Write a header row and one row per summary
pub fn write_summaries_csv<W: Write>(writer: W, summaries: &[StandSummary]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for summary in summaries {
        wtr.serialize(summary)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_summaries_csv_file<P: AsRef<Path>>(path: P, summaries: &[StandSummary]) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    write_summaries_csv(file, summaries)
}
