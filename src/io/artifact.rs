//! The artifact bundle: everything serving needs, as one JSON file.
//!
//! The three fitted artifacts are only ever written and read together. A
//! `blake3` checksum over the rest of the bundle catches hand edits and partial
//! copies, and writes go through a temporary file plus rename so a reader never
//! sees a half-written bundle.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ConfidenceThresholds;
use crate::error::AppError;
use crate::features::FeatureArtifact;
use crate::fit::{CvSummary, EnsembleArtifact};
use crate::reduce::ReducerArtifact;
use crate::schema::Schema;

/// Bumped whenever the bundle layout changes incompatibly.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Dataset and pipeline shape recorded at training time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    pub rows: usize,
    pub attrition: usize,
    pub retained: usize,
    pub skipped_rows: usize,
    pub synthetic_rows: usize,
    pub encoded_width: usize,
    pub components: usize,
    pub retained_variance: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub format_version: u32,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub schema: Schema,
    pub features: FeatureArtifact,
    pub reducer: ReducerArtifact,
    pub ensemble: EnsembleArtifact,
    pub thresholds: ConfidenceThresholds,
    pub training: TrainingStats,
    pub cv: CvSummary,
    /// Hex blake3 of the bundle serialized with this field empty.
    #[serde(default)]
    pub checksum: String,
}

impl ArtifactBundle {
    pub fn compute_checksum(&self) -> Result<String, AppError> {
        let mut unsigned = self.clone();
        unsigned.checksum.clear();
        let bytes = serde_json::to_vec(&unsigned)
            .map_err(|e| AppError::InvalidConfig(format!("bundle is not serializable: {e}")))?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }

    pub fn seal(&mut self) -> Result<(), AppError> {
        self.checksum = self.compute_checksum()?;
        Ok(())
    }

    /// Format version and checksum. Cross-artifact consistency is checked when
    /// a serving context is built.
    pub fn verify(&self) -> Result<(), AppError> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(AppError::ArtifactVersion(format!(
                "bundle format {} is not supported (expected {BUNDLE_FORMAT_VERSION})",
                self.format_version
            )));
        }
        let actual = self.compute_checksum()?;
        if actual != self.checksum {
            return Err(AppError::ArtifactVersion(format!(
                "bundle checksum mismatch (stored {}, computed {actual})",
                if self.checksum.is_empty() { "<none>" } else { &self.checksum }
            )));
        }
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Seal and write the bundle atomically.
pub fn write_bundle(path: &Path, bundle: &mut ArtifactBundle) -> Result<(), AppError> {
    bundle.seal()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("failed to create '{}'", parent.display()), e))?;
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp).map_err(|e| AppError::io(format!("failed to create '{}'", tmp.display()), e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, bundle)
        .map_err(|e| AppError::io("failed to write bundle JSON", e))?;
    writer.flush().map_err(|e| AppError::io("failed to flush bundle", e))?;
    drop(writer);

    fs::rename(&tmp, path).map_err(|e| AppError::io(format!("failed to move bundle into '{}'", path.display()), e))?;
    tracing::info!(path = %path.display(), run_id = %bundle.run_id, "wrote artifact bundle");
    Ok(())
}

/// Read a bundle and verify its format version and checksum.
pub fn read_bundle(path: &Path) -> Result<ArtifactBundle, AppError> {
    let file = File::open(path).map_err(|e| AppError::io(format!("failed to open bundle '{}'", path.display()), e))?;
    let bundle: ArtifactBundle = serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| AppError::ArtifactVersion(format!("'{}' is not a readable bundle: {e}", path.display())))?;
    bundle.verify()?;
    Ok(bundle)
}
