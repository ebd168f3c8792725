use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CreateBoundsResult, GatherResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_bounds(result: &CreateBoundsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_gather(result: &GatherResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_bounds(result: &CreateBoundsResult) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(
            stdout,
            "Wrote {} ({} at {})",
            result.path, result.bounds_type, result.center
        )
    }

    pub fn print_gather(result: &GatherResult) -> io::Result<()> {
        let mut stdout = io::stdout();
        Self::write_gather(&mut stdout, result)
    }

    pub fn write_gather(out: &mut impl Write, result: &GatherResult) -> io::Result<()> {
        let report = &result.report;
        writeln!(out, "Dataset:     {}", result.dataset_alias)?;
        writeln!(
            out,
            "Tiles:       {} scenes, {} candidates, {} kept after overlap reduction",
            result.scenes, result.candidates, result.kept
        )?;
        if let Some(label) = &report.label {
            writeln!(out, "Batch label: {label}")?;
        }
        writeln!(out, "Downloaded:  {}", report.succeeded.len())?;
        writeln!(out, "Skipped:     {} (already on disk)", report.skipped.len())?;
        if !report.unavailable.is_empty() {
            writeln!(out, "Unavailable: {}", report.unavailable.len())?;
        }
        if report.remote_failed > 0 {
            writeln!(out, "Rejected:    {} (by the catalog)", report.remote_failed)?;
        }
        writeln!(out, "Failed:      {}", report.failed.len())?;
        for failed in &report.failed {
            writeln!(
                out,
                "  {} after {} attempts: {} ({})",
                failed.entity_id,
                failed.attempts,
                failed.url.as_deref().unwrap_or("-"),
                failed.error
            )?;
        }
        writeln!(out, "Files in:    {}", result.download_dir)
    }
}

impl ProgressSink for TextOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed_ms {
            Some(ms) => eprintln!("[{ms:>6} ms] {}", event.message),
            None => eprintln!("{}", event.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoundingBox, Coordinate};
    use crate::orchestrator::{AcquisitionReport, FailedDownload};

    #[test]
    fn summary_lists_failed_urls() {
        let result = GatherResult {
            region: BoundingBox::new(
                Coordinate::new(39.0, -83.0).unwrap(),
                Coordinate::new(40.0, -82.0).unwrap(),
            ),
            dataset_alias: "high_res_ortho".to_string(),
            scenes: 3,
            candidates: 3,
            kept: 2,
            download_dir: "tmpDownloads".to_string(),
            report: AcquisitionReport {
                failed: vec![FailedDownload {
                    entity_id: "E7".to_string(),
                    url: Some("https://host/e7.zip".to_string()),
                    attempts: 5,
                    error: "download returned status 503".to_string(),
                }],
                ..AcquisitionReport::default()
            },
        };
        let mut buffer = Vec::new();
        TextOutput::write_gather(&mut buffer, &result).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("E7 after 5 attempts: https://host/e7.zip"));
        assert!(text.contains("Failed:      1"));
    }
}
