//! On-disk store for synthesized audio artifacts.
//!
//! Every artifact is a 16-bit mono WAV file named by
//! [`voxgate_core::naming::artifact_filename`]. The timestamp embedded in the
//! name is the artifact's age for the cleanup sweep.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use voxgate_core::audio::Waveform;
use voxgate_core::error::CoreError;
use voxgate_core::job::JobArtifact;
use voxgate_core::naming;
use voxgate_core::types::JobId;

/// Default directory for generated audio.
pub const DEFAULT_OUTPUT_DIR: &str = "api_outputs";

/// Default age after which artifacts are swept (one hour).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Refusing to store an empty waveform")]
    EmptyWaveform,

    #[error("Artifact I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),
}

impl From<ArtifactError> for CoreError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(name) => CoreError::NotFound {
                entity: "Artifact",
                id: name,
            },
            other => CoreError::Internal(other.to_string()),
        }
    }
}

/// Writes, resolves, and expires artifacts under one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating `dir` if it does not exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `waveform` for `job_id`, timestamped now.
    pub fn save(&self, job_id: &JobId, waveform: &Waveform) -> Result<JobArtifact, ArtifactError> {
        self.save_at(job_id, waveform, Utc::now().timestamp())
    }

    /// Persist `waveform` for `job_id` with an explicit creation timestamp.
    ///
    /// Fails rather than overwrite an existing file of the same name.
    pub fn save_at(
        &self,
        job_id: &JobId,
        waveform: &Waveform,
        unix_secs: i64,
    ) -> Result<JobArtifact, ArtifactError> {
        if waveform.is_empty() {
            return Err(ArtifactError::EmptyWaveform);
        }

        let filename = naming::artifact_filename(job_id, unix_secs);
        let path = self.dir.join(&filename);

        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        if let Err(e) = write_wav(file, waveform) {
            // Never leave a truncated file behind for download.
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        tracing::debug!(
            job_id = %job_id,
            filename = %filename,
            samples = waveform.samples.len(),
            "Artifact written",
        );

        Ok(JobArtifact {
            filename,
            path: path.display().to_string(),
            sample_rate: waveform.sample_rate,
        })
    }

    /// Map a client-supplied filename to an existing artifact path.
    ///
    /// Names that do not follow the artifact convention (including anything
    /// with path separators) are reported as not found.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, ArtifactError> {
        if !naming::is_artifact_filename(filename) {
            return Err(ArtifactError::NotFound(filename.to_string()));
        }
        let path = self.dir.join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ArtifactError::NotFound(filename.to_string()))
        }
    }

    /// Delete artifacts older than `max_age`. Returns the number deleted.
    pub fn cleanup(&self, max_age: Duration) -> Result<usize, ArtifactError> {
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp().saturating_sub(max_age);
        self.cleanup_before(cutoff)
    }

    /// Delete artifacts whose embedded timestamp is strictly before
    /// `cutoff_unix_secs`. Files that are not artifacts are left alone.
    pub fn cleanup_before(&self, cutoff_unix_secs: i64) -> Result<usize, ArtifactError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(created) = naming::artifact_timestamp(name) else {
                continue;
            };
            if created >= cutoff_unix_secs {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => deleted += 1,
                // Already gone, e.g. a concurrent sweep.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(filename = name, error = %e, "Failed to delete artifact");
                }
            }
        }
        Ok(deleted)
    }
}

fn write_wav(file: File, waveform: &Waveform) -> Result<(), ArtifactError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::new(BufWriter::new(file), spec)?;
    for &sample in &waveform.samples {
        writer.write_sample(to_pcm16(sample))?;
    }
    writer.finalize()?;
    Ok(())
}

fn to_pcm16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    (clamped * i16::MAX as f32).round() as i16
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
