//! Recording sink that materializes segment metadata on disk.
//!
//! Appends one JSON line per finished segment to `segments.jsonl` and
//! writes a companion identity listing per segment, giving an external
//! clipper everything it needs to cut the video.

use anyhow::{Context, Result};
use cameo_core::{RecordingSink, Segment};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct SegmentWriter {
    out_dir: PathBuf,
    log: File,
}

impl SegmentWriter {
    pub fn create(out_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("creating output directory {}", out_dir.display()))?;
        let log_path = out_dir.join("segments.jsonl");
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("opening {}", log_path.display()))?;
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            log,
        })
    }
}

impl RecordingSink for SegmentWriter {
    fn write_segment(&mut self, segment: &Segment) -> Result<()> {
        let line = serde_json::to_string(segment)?;
        writeln!(self.log, "{line}")?;

        let listing = self.out_dir.join(format!("{:.3}_identities.txt", segment.start));
        let labels: Vec<&str> = segment.labels.iter().map(String::as_str).collect();
        std::fs::write(&listing, labels.join(","))
            .with_context(|| format!("writing {}", listing.display()))?;

        tracing::info!(
            start = segment.start,
            end = segment.end,
            labels = ?segment.labels,
            "segment written"
        );
        Ok(())
    }
}
