pub mod artifacts;
pub mod loras;
pub mod synthesis;
pub mod tasks;

/// Relative URL under which an artifact is downloadable.
pub fn download_url(filename: &str) -> String {
    format!("/download/{filename}")
}
