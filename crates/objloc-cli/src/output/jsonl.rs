use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use objloc_engine::CycleReport;
use serde::Serialize;

use crate::errors::Result;

#[derive(Debug, Serialize)]
struct CycleRecord<'a> {
    cycle: u64,
    #[serde(flatten)]
    report: &'a CycleReport,
}

/// Appends one JSON object per processed cycle.
pub struct JsonLinesPublisher<W: Write = BufWriter<File>> {
    writer: W,
    records: u64,
}

impl JsonLinesPublisher {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, records: 0 }
    }

    pub fn publish(&mut self, cycle: u64, report: &CycleReport) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &CycleRecord { cycle, report })?;
        self.writer.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objloc_core::DetectionResult;
    use objloc_engine::NotLocatedReason;

    fn report() -> CycleReport {
        CycleReport {
            sequence: Some(4),
            result: DetectionResult::NotLocated,
            frame_keypoints: 12,
            raw_matches: 12,
            filtered_matches: 2,
            inliers: 0,
            reason: Some(NotLocatedReason::InsufficientCorrespondences { found: 2 }),
            elapsed_ms: 1.5,
        }
    }

    #[test]
    fn writes_one_line_per_cycle() {
        let mut publisher = JsonLinesPublisher::new(Vec::new());
        publisher.publish(0, &report()).unwrap();
        publisher.publish(1, &report()).unwrap();
        assert_eq!(publisher.records(), 2);

        let bytes = publisher.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(record["cycle"], 1);
        assert_eq!(record["sequence"], 4);
        assert_eq!(record["result"]["status"], "not_located");
        assert_eq!(record["reason"]["kind"], "insufficient_correspondences");
        assert_eq!(record["reason"]["found"], 2);
    }
}
