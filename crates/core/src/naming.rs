//! Artifact naming convention.
//!
//! Convention: `tts_{job}_{unix_secs}.{ext}`
//!
//! - `job` = the first [`JOB_PREFIX_LEN`] hex characters of the owning job id
//! - `unix_secs` = creation time in whole seconds since the epoch
//!
//! The timestamp component makes names sortable by creation time and gives
//! the cleanup sweep an age without touching file metadata.

use crate::types::JobId;

/// Prefix shared by every artifact filename.
pub const ARTIFACT_PREFIX: &str = "tts_";

/// Number of job id hex characters embedded in the filename.
pub const JOB_PREFIX_LEN: usize = 12;

/// Extension of the produced audio files.
pub const ARTIFACT_EXTENSION: &str = "wav";

/// Generate the artifact filename for `job_id` created at `unix_secs`.
///
/// # Examples
///
/// ```
/// use voxgate_core::naming::{artifact_filename, artifact_timestamp};
/// use voxgate_core::types::JobId;
///
/// let name = artifact_filename(&JobId::new(), 1_700_000_000);
/// assert!(name.starts_with("tts_"));
/// assert!(name.ends_with("_1700000000.wav"));
/// assert_eq!(artifact_timestamp(&name), Some(1_700_000_000));
/// ```
pub fn artifact_filename(job_id: &JobId, unix_secs: i64) -> String {
    format!(
        "{ARTIFACT_PREFIX}{}_{unix_secs}.{ARTIFACT_EXTENSION}",
        job_id.short(JOB_PREFIX_LEN)
    )
}

/// Extract the creation timestamp from an artifact filename.
///
/// Returns `None` for names that do not follow the convention.
pub fn artifact_timestamp(filename: &str) -> Option<i64> {
    let stem = filename
        .strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_EXTENSION)?
        .strip_suffix('.')?;
    let (job, secs) = stem.rsplit_once('_')?;
    if job.is_empty() || !job.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    secs.parse().ok()
}

/// Whether `filename` is a plain artifact name safe to join onto the
/// output directory (no separators, no traversal, matches the convention).
pub fn is_artifact_filename(filename: &str) -> bool {
    !filename.contains(['/', '\\']) && artifact_timestamp(filename).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_embeds_job_prefix_and_timestamp() {
        let id = JobId::new();
        let name = artifact_filename(&id, 42);
        assert_eq!(name, format!("tts_{}_42.wav", id.short(JOB_PREFIX_LEN)));
    }

    #[test]
    fn timestamp_parsed_back() {
        assert_eq!(artifact_timestamp("tts_abc123_1700000000.wav"), Some(1_700_000_000));
    }

    #[test]
    fn foreign_names_have_no_timestamp() {
        assert_eq!(artifact_timestamp("notes.txt"), None);
        assert_eq!(artifact_timestamp("tts_abc_notanumber.wav"), None);
        assert_eq!(artifact_timestamp("tts__123.wav"), None);
        assert_eq!(artifact_timestamp("tts_abc_123.mp3"), None);
    }

    #[test]
    fn traversal_rejected() {
        assert!(!is_artifact_filename("../tts_abc_1.wav"));
        assert!(!is_artifact_filename("tts_../../etc_1.wav"));
        assert!(!is_artifact_filename("sub/tts_abc_1.wav"));
        assert!(is_artifact_filename("tts_abc_1.wav"));
    }

    #[test]
    fn names_sort_by_creation_time() {
        let id = JobId::new();
        let older = artifact_filename(&id, 1_700_000_000);
        let newer = artifact_filename(&id, 1_700_000_100);
        assert!(older < newer);
    }
}
