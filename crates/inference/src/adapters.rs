//! Discovery of LoRA adapters on disk.
//!
//! An adapter is any directory under the catalog root that contains
//! [`WEIGHTS_FILE`]. Its name is the directory path relative to the root,
//! using `/` separators (e.g. `speaker_a/step_0400`).

use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// File marking a directory as an adapter checkpoint.
pub const WEIGHTS_FILE: &str = "lora_weights.safetensors";

/// Default adapter root directory.
pub const DEFAULT_LORA_DIR: &str = "lora";

#[derive(Debug, Clone)]
pub struct AdapterCatalog {
    root: PathBuf,
}

impl AdapterCatalog {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every discovered adapter name, reverse sorted (newest checkpoint
    /// steps first for zero-padded names). A missing root yields nothing.
    pub fn list(&self) -> Vec<String> {
        if !self.root.is_dir() {
            return Vec::new();
        }

        let mut names: Vec<String> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && e.file_name() == WEIGHTS_FILE)
            .filter_map(|e| {
                let dir = e.path().parent()?;
                let rel = dir.strip_prefix(&self.root).ok()?;
                adapter_name(rel)
            })
            .collect();

        names.sort_unstable_by(|a, b| b.cmp(a));
        names.dedup();

        tracing::debug!(
            count = names.len(),
            root = %self.root.display(),
            "Scanned adapter directory",
        );
        names
    }

    /// Whether `name` is a discovered adapter.
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Directory of adapter `name`, if it exists.
    ///
    /// Names that are absolute or step outside the root are never resolved.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let rel = Path::new(name);
        let plain = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if name.is_empty() || !plain {
            return None;
        }

        let dir = self.root.join(rel);
        dir.join(WEIGHTS_FILE).is_file().then_some(dir)
    }
}

/// Slash-joined name of a relative adapter directory. The root itself is
/// not an adapter.
fn adapter_name(rel: &Path) -> Option<String> {
    let parts: Vec<&str> = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn add_adapter(root: &Path, name: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join(WEIGHTS_FILE), b"weights").expect("weights");
    }

    #[test]
    fn missing_root_lists_nothing() {
        let catalog = AdapterCatalog::new("/definitely/not/a/lora/dir");
        assert!(catalog.list().is_empty());
        assert!(!catalog.contains("anything"));
    }

    #[test]
    fn lists_nested_adapters_reverse_sorted() {
        let tmp = tempfile::tempdir().expect("tempdir");
        add_adapter(tmp.path(), "alice/step_0100");
        add_adapter(tmp.path(), "alice/step_0200");
        add_adapter(tmp.path(), "bob");
        // A directory without weights is not an adapter.
        fs::create_dir_all(tmp.path().join("empty")).expect("mkdir");

        let catalog = AdapterCatalog::new(tmp.path());
        assert_eq!(
            catalog.list(),
            vec!["bob", "alice/step_0200", "alice/step_0100"]
        );
    }

    #[test]
    fn weights_in_root_are_ignored() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join(WEIGHTS_FILE), b"weights").expect("weights");
        assert!(AdapterCatalog::new(tmp.path()).list().is_empty());
    }

    #[test]
    fn resolve_accepts_known_names_only() {
        let tmp = tempfile::tempdir().expect("tempdir");
        add_adapter(tmp.path(), "alice/step_0100");
        let catalog = AdapterCatalog::new(tmp.path());

        assert_eq!(
            catalog.resolve("alice/step_0100"),
            Some(tmp.path().join("alice/step_0100"))
        );
        assert!(catalog.contains("alice/step_0100"));
        assert!(!catalog.contains("alice"));
        assert!(!catalog.contains("missing"));
        assert!(!catalog.contains("../alice/step_0100"));
        assert!(!catalog.contains("/etc"));
        assert!(!catalog.contains(""));
    }
}
