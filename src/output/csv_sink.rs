//! CSV record sink
//!
//! One row per collected record: fixed `id,title,detail_url,fetched_at`
//! columns followed by one column per configured listing or detail field.
//! The header is written only when the file is new, so successive runs with
//! the same configuration append to one table.

use crate::output::traits::{OutputResult, RecordSink};
use crate::scrape::DetailRecord;
use std::fs::{File, OpenOptions};
use std::path::Path;

const FIXED_COLUMNS: [&str; 4] = ["id", "title", "detail_url", "fetched_at"];

/// Appends records to a `.csv` file
#[derive(Debug)]
pub struct CsvSink {
    writer: csv::Writer<File>,
    fields: Vec<String>,
    written: u64,
}

impl CsvSink {
    /// Opens `path` for appending
    ///
    /// # Arguments
    ///
    /// * `path` - Output file; it and its parent directory are created if needed
    /// * `fields` - Field names to emit after the fixed columns, in order
    pub fn open(path: &Path, fields: Vec<String>) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_new = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            let header = FIXED_COLUMNS
                .iter()
                .copied()
                .chain(fields.iter().map(String::as_str));
            writer.write_record(header)?;
            writer.flush()?;
        }

        Ok(Self {
            writer,
            fields,
            written: 0,
        })
    }

    /// Records written through this sink
    pub fn written(&self) -> u64 {
        self.written
    }

    fn row(&self, record: &DetailRecord) -> Vec<String> {
        let mut row = vec![
            record.id.clone(),
            record.listing.title.clone().unwrap_or_default(),
            record.listing.detail_url.clone().unwrap_or_default(),
            record.fetched_at.to_rfc3339(),
        ];
        for name in &self.fields {
            let value = record
                .fields
                .get(name)
                .or_else(|| record.listing.fields.get(name));
            row.push(value.cloned().unwrap_or_default());
        }
        row
    }
}

impl RecordSink for CsvSink {
    fn write(&mut self, record: &DetailRecord) -> OutputResult<()> {
        let row = self.row(record);
        self.writer.write_record(&row)?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}
