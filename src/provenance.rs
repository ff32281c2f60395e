//! Chained provenance records
//!
//! Every run appends one [`ProvenanceEntry`] describing itself (time, command
//! line, code revision) followed verbatim by the history of each input. Since
//! input histories are themselves logs written by earlier runs, the record grows
//! into a full processing chain, newest first:
//!
//! ```text
//! Tue Jan 02 10:00:00 2018: precip_clim pr.nc DJF out.png (Git hash: 1a2b3c4)
//! History of pr.nc:
//! Mon Jan 01 09:00:00 2018: change_time_units raw.nc pr ... (Git hash: 9f8e7d6)
//! History of raw.nc:
//! ...
//! ```

use crate::errors::{ClimError, Result};
use crate::render::{ImageFormat, RenderedImage};
use crate::utils::{commit_all, stage_bytes};
use chrono::Local;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Format of entry timestamps, e.g. `Tue Jan 02 10:00:00 2018`
pub const TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Revision recorded when the code is not in a git checkout
pub const UNKNOWN_REVISION: &str = "unknown";

const REVISION_LENGTH: usize = 7;

/// One run's record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceEntry {
    timestamp: String,
    command: String,
    revision: String,
    inputs: Vec<(PathBuf, String)>,
}

impl ProvenanceEntry {
    /// Stamp a new entry with the current local time.
    pub fn new(command: impl Into<String>, revision: impl Into<String>) -> Self {
        Self::with_timestamp(Local::now().format(TIMESTAMP_FORMAT).to_string(), command, revision)
    }

    pub fn with_timestamp(
        timestamp: impl Into<String>,
        command: impl Into<String>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            command: command.into(),
            revision: revision.into(),
            inputs: Vec::new(),
        }
    }

    /// Chain the history of an input file.
    #[must_use]
    pub fn with_input(mut self, path: impl Into<PathBuf>, history: impl Into<String>) -> Self {
        self.inputs.push((path.into(), history.into()));
        self
    }

    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }

    #[must_use]
    pub fn inputs(&self) -> &[(PathBuf, String)] {
        &self.inputs
    }
}

impl fmt::Display for ProvenanceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (Git hash: {})",
            self.timestamp, self.command, self.revision
        )?;
        for (path, history) in &self.inputs {
            write!(f, "\nHistory of {}:\n{history}", path.display())?;
        }
        Ok(())
    }
}

/// Ordered entries, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceLog {
    entries: Vec<ProvenanceEntry>,
}

impl ProvenanceLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend an entry.
    pub fn record(&mut self, entry: ProvenanceEntry) {
        self.entries.insert(0, entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[ProvenanceEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ProvenanceLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// Short hash of the git revision the binary was built from, or `unknown`.
///
/// The hash is captured by the build script, so an installed or relocated
/// binary still reports the code it was compiled from.
#[must_use]
pub fn code_revision() -> String {
    build_revision(option_env!("PRECIP_CLIM_GIT_HASH"))
}

fn build_revision(hash: Option<&str>) -> String {
    match hash.map(str::trim).filter(|hash| !hash.is_empty()) {
        Some(hash) => hash.chars().take(REVISION_LENGTH).collect(),
        None => {
            warn!("No git revision was recorded when this binary was built");
            UNKNOWN_REVISION.to_string()
        }
    }
}

/// Where the log goes when the outputs are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Plain text file next to the image, same stem, `.txt` extension
    #[default]
    SiblingText,
    /// Inside the image's own metadata
    Embedded,
}

/// Metadata field that carries the log for each image format
#[must_use]
pub const fn metadata_key(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "History",
        ImageFormat::Svg => "creator",
    }
}

/// Text log path for an image output: `map.png` -> `map.txt`.
#[must_use]
pub fn sibling_path(output: &Path) -> PathBuf {
    output.with_extension("txt")
}

/// Write the image and the log.
///
/// Either every file of the call is in place afterwards or none is. Returns the
/// paths written.
pub fn persist(
    log: &ProvenanceLog,
    image: &RenderedImage,
    output: &Path,
    mode: PersistMode,
) -> Result<Vec<PathBuf>> {
    let format = ImageFormat::from_path(output)?;
    if format != image.format {
        return Err(ClimError::InputValidation(format!(
            "output {} expects {format} but the image was rendered as {}",
            output.display(),
            image.format
        )));
    }

    let staged = match mode {
        PersistMode::SiblingText => {
            let log_path = sibling_path(output);
            let bytes = image.encode(&[])?;
            vec![
                (stage_bytes(output, &bytes)?, output.to_path_buf()),
                (stage_bytes(&log_path, log.text().as_bytes())?, log_path),
            ]
        }
        PersistMode::Embedded => {
            let key = metadata_key(format);
            debug!("Embedding provenance under '{key}'");
            let bytes = image.encode(&[(key.to_string(), log.text())])?;
            vec![(stage_bytes(output, &bytes)?, output.to_path_buf())]
        }
    };

    let written = commit_all(staged)?;
    for path in &written {
        info!("Wrote {}", path.display());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ImageContent;
    use std::fs;
    use tempfile::tempdir;

    fn svg_image() -> RenderedImage {
        RenderedImage {
            format: ImageFormat::Svg,
            width: 2,
            height: 2,
            content: ImageContent::Vector("<svg width=\"2\" height=\"2\"></svg>".to_string()),
            title: "ACCESS1-3 precipitation climatology (DJF)".to_string(),
            caption: "mm/day".to_string(),
        }
    }

    #[test]
    fn test_entry_format() {
        let entry = ProvenanceEntry::with_timestamp(
            "Tue Jan 02 10:00:00 2018",
            "precip_clim pr.nc DJF out.png",
            "1a2b3c4",
        )
        .with_input("pr.nc", "Mon Jan 01 09:00:00 2018: cdo mergetime");

        assert_eq!(
            entry.to_string(),
            "Tue Jan 02 10:00:00 2018: precip_clim pr.nc DJF out.png (Git hash: 1a2b3c4)\n\
             History of pr.nc:\n\
             Mon Jan 01 09:00:00 2018: cdo mergetime"
        );
    }

    #[test]
    fn test_timestamp_shape() {
        let entry = ProvenanceEntry::new("cmd", UNKNOWN_REVISION);
        // e.g. "Tue Jan 02 10:00:00 2018"
        assert_eq!(entry.timestamp().len(), 24);
        assert!(entry.to_string().ends_with("cmd (Git hash: unknown)"));
    }

    #[test]
    fn test_log_prepends() {
        let mut log = ProvenanceLog::new();
        assert!(log.is_empty());
        log.record(ProvenanceEntry::with_timestamp("t1", "first", "a"));
        log.record(ProvenanceEntry::with_timestamp("t2", "second", "b"));

        assert_eq!(log.entries()[0].command(), "second");
        assert_eq!(
            log.text(),
            "t2: second (Git hash: b)\nt1: first (Git hash: a)"
        );
    }

    #[test]
    fn test_two_generation_chain() {
        let first = ProvenanceEntry::with_timestamp("t1", "change_time_units raw.nc pr", "a")
            .with_input("raw.nc", "downloaded");
        let mut generation_one = ProvenanceLog::new();
        generation_one.record(first);

        let second = ProvenanceEntry::with_timestamp("t2", "precip_clim pr.nc DJF out.png", "b")
            .with_input("pr.nc", generation_one.text());
        let mut generation_two = ProvenanceLog::new();
        generation_two.record(second);

        let text = generation_two.text();
        let newest = text.find("precip_clim").unwrap();
        let older = text.find("change_time_units").unwrap();
        let oldest = text.find("downloaded").unwrap();
        assert!(newest < older && older < oldest);
        assert!(text.contains(&generation_one.text()));
    }

    #[test]
    fn test_build_revision() {
        assert_eq!(build_revision(Some("1a2b3c4d5e6f\n")), "1a2b3c4");
        assert_eq!(build_revision(Some("")), UNKNOWN_REVISION);
        assert_eq!(build_revision(None), UNKNOWN_REVISION);

        let revision = code_revision();
        assert!(revision == UNKNOWN_REVISION || revision.len() == REVISION_LENGTH);
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(sibling_path(Path::new("out/map.png")), PathBuf::from("out/map.txt"));
    }

    #[test]
    fn test_persist_sibling_and_embedded() {
        let dir = tempdir().unwrap();
        let mut log = ProvenanceLog::new();
        log.record(ProvenanceEntry::with_timestamp("t", "precip_clim", "abc1234"));

        let output = dir.path().join("map.svg");
        let written = persist(&log, &svg_image(), &output, PersistMode::SiblingText).unwrap();
        assert_eq!(written, vec![output.clone(), dir.path().join("map.txt")]);
        assert_eq!(fs::read_to_string(dir.path().join("map.txt")).unwrap(), log.text());

        let embedded = dir.path().join("embedded.svg");
        let written = persist(&log, &svg_image(), &embedded, PersistMode::Embedded).unwrap();
        assert_eq!(written, vec![embedded.clone()]);
        let svg = fs::read_to_string(&embedded).unwrap();
        assert!(svg.contains("<metadata><creator>t: precip_clim (Git hash: abc1234)</creator></metadata>"));
        assert!(!dir.path().join("embedded.txt").exists());
    }

    #[test]
    fn test_persist_rejects_mismatched_format() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("map.png");
        let result = persist(&ProvenanceLog::new(), &svg_image(), &output, PersistMode::SiblingText);
        assert!(matches!(result, Err(ClimError::InputValidation(_))));
        assert!(!output.exists());
    }
}
