use anyhow::{Context, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Manifest file names looked for at the project root, in order.
pub const MANIFEST_FILE_NAMES: [&str; 4] = ["api.yaml", "api.yml", "api.json", "openapi.manifest.yaml"];

/// Finds the inputs of a build inside a project directory: the Rust sources
/// that declare types, and the API manifest if one sits at the root.
///
/// `target/` and hidden directories are skipped.
///
/// # Example
///
/// ```no_run
/// use openapi_synth::scanner::FileScanner;
/// use std::path::PathBuf;
///
/// let scanner = FileScanner::new(PathBuf::from("./my-project"));
/// let result = scanner.scan().unwrap();
/// println!("Found {} Rust files", result.rust_files.len());
/// ```
pub struct FileScanner {
    root_path: PathBuf,
}

/// Files discovered by a scan.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub rust_files: Vec<PathBuf>,
    /// API manifest found at the project root
    pub manifest: Option<PathBuf>,
    /// Paths that could not be read; scanning continues past them
    pub warnings: Vec<String>,
}

impl FileScanner {
    pub fn new(root_path: PathBuf) -> Self {
        Self { root_path }
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Walks the project tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the root itself is not a readable directory.
    pub fn scan(&self) -> Result<ScanResult> {
        let metadata = std::fs::metadata(&self.root_path)
            .with_context(|| format!("Cannot access project: {}", self.root_path.display()))?;
        if !metadata.is_dir() {
            anyhow::bail!("Project path is not a directory: {}", self.root_path.display());
        }

        let mut result = ScanResult {
            manifest: self.find_manifest(),
            ..ScanResult::default()
        };

        let walker = WalkDir::new(&self.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored(e.file_name().to_string_lossy().as_ref()));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if entry.file_type().is_file()
                        && path.extension().and_then(|s| s.to_str()) == Some("rs")
                    {
                        result.rust_files.push(path.to_path_buf());
                    }
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    result.warnings.push(warning);
                }
            }
        }

        debug!(
            "Scanned {}: {} Rust file(s), manifest {:?}",
            self.root_path.display(),
            result.rust_files.len(),
            result.manifest
        );
        Ok(result)
    }

    fn find_manifest(&self) -> Option<PathBuf> {
        MANIFEST_FILE_NAMES
            .iter()
            .map(|name| self.root_path.join(name))
            .find(|candidate| candidate.is_file())
    }
}

fn is_ignored(file_name: &str) -> bool {
    file_name.starts_with('.') || file_name == "target"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn file_names(result: &ScanResult) -> Vec<String> {
        result
            .rust_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_scan_collects_nested_sources_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src/models")).unwrap();
        fs::write(root.join("src/lib.rs"), "pub mod models;").unwrap();
        fs::write(root.join("src/models/user.rs"), "pub struct User {}").unwrap();
        fs::write(root.join("src/models/order.rs"), "pub struct Order {}").unwrap();
        fs::write(root.join("README.md"), "# README").unwrap();

        let result = FileScanner::new(root.to_path_buf()).scan().unwrap();

        assert_eq!(file_names(&result), vec!["lib.rs", "order.rs", "user.rs"]);
        assert!(result.warnings.is_empty());
        assert!(result.manifest.is_none());
    }

    #[test]
    fn test_scan_skips_target_and_hidden_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("target")).unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join("target/build.rs"), "fn main() {}").unwrap();
        fs::write(root.join(".git/config.rs"), "// config").unwrap();
        fs::write(root.join("main.rs"), "fn main() {}").unwrap();

        let result = FileScanner::new(root.to_path_buf()).scan().unwrap();

        assert_eq!(file_names(&result), vec!["main.rs"]);
    }

    #[test]
    fn test_scan_finds_manifest_at_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("api.json"), "{}").unwrap();
        fs::write(root.join("api.yaml"), "info: {}").unwrap();

        let result = FileScanner::new(root.to_path_buf()).scan().unwrap();

        assert_eq!(result.manifest, Some(root.join("api.yaml")));
        assert!(result.rust_files.is_empty());
    }

    #[test]
    fn test_scan_rejects_missing_or_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("main.rs");
        fs::write(&file, "fn main() {}").unwrap();

        assert!(FileScanner::new(temp_dir.path().join("missing")).scan().is_err());
        let err = FileScanner::new(file).scan().unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
