//! Core sandboxed file manager implementation.

use crate::{
    error::{Result, SandboxedFileError},
    security::set_secure_permissions,
};

use std::path::{Path, PathBuf};
use tokio::fs;

/// Main sandboxed file manager.
#[derive(Clone, Debug)]
pub struct SandboxedManager {
    base_dir: PathBuf,
}

impl SandboxedManager {
    /// Create a new builder for configuring the manager.
    #[must_use]
    pub fn builder() -> SandboxedManagerBuilder {
        SandboxedManagerBuilder::new()
    }

    /// Atomically replace `path` with `contents`.
    ///
    /// Writes to `<base>/.tmp/<file_name>.<random>`, `fsync`s the temp file
    /// (and its parent directory, on Unix), then renames it over `path`.
    /// Concurrent readers performing a single `open` on `path` observe either
    /// the previous content or the new content in full, never a partial
    /// write.
    ///
    /// # Errors
    /// Returns an error if the path escapes the sandbox or any of the
    /// write/fsync/rename steps fail.
    pub async fn write_atomic<P: AsRef<str>, C: AsRef<[u8]>>(
        &self,
        path: P,
        contents: C,
    ) -> Result<()> {
        let path_str = path.as_ref();
        let final_path = self.validate_and_get_path(path_str)?;
        let parent = final_path.parent().ok_or_else(|| SandboxedFileError::PathValidation {
            path: final_path.clone(),
            reason: "path has no parent directory".to_string(),
        })?;
        let tmp_dir = parent.join(".tmp");
        fs::create_dir_all(&tmp_dir).await?;

        let file_name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("output")
            .to_string();
        let token: u64 = {
            use std::hash::{Hash, Hasher};
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            (std::time::SystemTime::now(), std::process::id(), &file_name).hash(&mut hasher);
            hasher.finish()
        };
        let tmp_path = tmp_dir.join(format!("{file_name}.{token:016x}"));

        {
            let mut file = fs::File::create(&tmp_path).await?;
            use tokio::io::AsyncWriteExt;
            file.write_all(contents.as_ref()).await?;
            file.sync_all().await?;
        }

        fs::rename(&tmp_path, &final_path).await?;

        #[cfg(unix)]
        {
            if let Ok(dir) = fs::File::open(parent).await {
                let _ = dir.sync_all().await;
            }
        }

        Ok(())
    }

    /// Sandboxed version of `std::fs::read` - reads entire file into a Vec<u8>.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The path is invalid or outside the sandbox
    /// - The file cannot be opened or read
    pub async fn read<P: AsRef<str>>(&self, path: P) -> Result<Vec<u8>> {
        let file_path = self.validate_and_get_path(path.as_ref())?;
        let content = fs::read(&file_path).await?;
        Ok(content)
    }

    /// Sandboxed version of `std::fs::read_to_string` - reads entire file into a `String`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The path is invalid or outside the sandbox
    /// - The file cannot be opened or read as UTF-8 text
    pub async fn read_to_string<P: AsRef<str>>(&self, path: P) -> Result<String> {
        let file_path = self.validate_and_get_path(path.as_ref())?;
        let content = fs::read_to_string(&file_path).await?;
        Ok(content)
    }

    /// Validate a filepath and construct the full path within the sandbox.
    ///
    /// Uses OS syscalls to properly resolve paths including symlinks, .., ., etc.
    fn validate_and_get_path(&self, filepath: &str) -> Result<PathBuf> {
        // Basic security validation
        if filepath.is_empty() {
            return Err(SandboxedFileError::PathValidation {
                path: PathBuf::from(filepath),
                reason: "Filepath cannot be empty".to_string(),
            });
        }

        if filepath.contains('\0') {
            return Err(SandboxedFileError::PathValidation {
                path: PathBuf::from(filepath),
                reason: "Filepath contains null bytes".to_string(),
            });
        }

        // Reject absolute paths - use relative paths within sandbox
        let path_obj = Path::new(filepath);
        if path_obj.is_absolute() {
            return Err(SandboxedFileError::PathValidation {
                path: PathBuf::from(filepath),
                reason: "Absolute paths not allowed - use relative paths within sandbox"
                    .to_string(),
            });
        }

        // Construct full path within sandbox
        let full_path = self.base_dir.join(filepath);

        // Get canonical base directory (must exist)
        let canonical_base =
            self.base_dir
                .canonicalize()
                .map_err(|e| SandboxedFileError::PathValidation {
                    path: self.base_dir.clone(),
                    reason: format!("Failed to canonicalize base directory: {e}"),
                })?;

        // Create parent directories if they don't exist
        if let Some(parent) = full_path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| SandboxedFileError::DirectoryCreation {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        // Use OS to resolve the actual path the file would have
        let resolved_path = if full_path.exists() {
            // File exists - use canonicalize to resolve everything
            full_path
                .canonicalize()
                .map_err(|e| SandboxedFileError::PathValidation {
                    path: full_path.clone(),
                    reason: format!("Failed to resolve existing file path: {e}"),
                })?
        } else {
            // File doesn't exist - resolve parent and construct final path
            let parent = full_path
                .parent()
                .ok_or_else(|| SandboxedFileError::PathValidation {
                    path: full_path.clone(),
                    reason: "Path has no parent directory".to_string(),
                })?;

            let canonical_parent =
                parent
                    .canonicalize()
                    .map_err(|e| SandboxedFileError::PathValidation {
                        path: parent.to_path_buf(),
                        reason: format!("Failed to resolve parent directory: {e}"),
                    })?;

            let filename =
                full_path
                    .file_name()
                    .ok_or_else(|| SandboxedFileError::PathValidation {
                        path: full_path.clone(),
                        reason: "Invalid filename".to_string(),
                    })?;

            canonical_parent.join(filename)
        };

        // Security check: ensure resolved path is within sandbox
        if !resolved_path.starts_with(&canonical_base) {
            return Err(SandboxedFileError::PathValidation {
                path: full_path,
                reason: format!(
                    "Path escapes sandbox: '{}' resolves to '{}' (outside '{}')",
                    filepath,
                    resolved_path.display(),
                    canonical_base.display()
                ),
            });
        }

        tracing::trace!(
            "Path validated: '{}' -> '{}' (within '{}')",
            filepath,
            resolved_path.display(),
            canonical_base.display()
        );

        Ok(full_path)
    }
}

/// Builder for configuring a `SandboxedManager`.
pub struct SandboxedManagerBuilder {
    base_directory: Option<PathBuf>,
}

impl SandboxedManagerBuilder {
    fn new() -> Self {
        Self { base_directory: None }
    }

    /// Set the base directory for file storage.
    #[must_use]
    pub fn base_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_directory = Some(path.into());
        self
    }

    /// Build the `SandboxedManager`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Base directory is not set
    /// - Base directory cannot be created or secured
    pub async fn build(self) -> Result<SandboxedManager> {
        let base_dir = self
            .base_directory
            .ok_or_else(|| SandboxedFileError::Configuration {
                message: "Base directory is required".to_string(),
            })?;

        // Ensure base directory exists and set secure permissions
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| SandboxedFileError::DirectoryCreation {
                path: base_dir.clone(),
                source: e,
            })?;

        set_secure_permissions(&base_dir).await?;

        let manager = SandboxedManager { base_dir };

        tracing::info!("SandboxedManager initialized - base_dir: {:?}", manager.base_dir);

        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_replaces_content_and_leaves_no_tmp_file()
    -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = SandboxedManager::builder().base_directory(temp_dir.path()).build().await?;

        manager.write_atomic("playlist.m3u", "#EXTM3U\n").await?;
        assert_eq!(manager.read_to_string("playlist.m3u").await?, "#EXTM3U\n");

        manager
            .write_atomic("playlist.m3u", "#EXTM3U\n#EXTINF:-1,Ch\nhttp://x\n")
            .await?;
        assert_eq!(
            manager.read_to_string("playlist.m3u").await?,
            "#EXTM3U\n#EXTINF:-1,Ch\nhttp://x\n"
        );

        let tmp_dir = temp_dir.path().join(".tmp");
        if tmp_dir.exists() {
            let mut entries = tokio::fs::read_dir(&tmp_dir).await?;
            assert!(entries.next_entry().await?.is_none(), "temp dir should be empty after rename");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_nested_paths() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = SandboxedManager::builder().base_directory(temp_dir.path()).build().await?;

        let nested_file = "config/app/settings.json";
        manager.write_atomic(nested_file, r#"{"debug": true}"#).await?;

        let content = manager.read_to_string(nested_file).await?;
        assert_eq!(content, r#"{"debug": true}"#);
        Ok(())
    }

    #[tokio::test]
    async fn test_path_traversal_resolution() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let temp_dir = tempfile::tempdir()?;
        let manager = SandboxedManager::builder().base_directory(temp_dir.path()).build().await?;

        // Paths with .. that resolve within the sandbox should be allowed.
        let valid_traversal_paths = vec![
            "dir/../file.txt",
            "deep/nested/../other/file.txt",
            "a/b/c/../../d/file.txt",
        ];

        for path in valid_traversal_paths {
            manager.write_atomic(path, "test content").await?;
            let content = manager.read_to_string(path).await?;
            assert_eq!(content, "test content");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_escape_attempts() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let base_path = temp_dir.path();

        if let Some(parent) = temp_dir.path().parent() {
            let outside_file = parent.join("outside_target.txt");
            std::fs::write(&outside_file, "sensitive data")?;
        }

        let manager = SandboxedManager::builder().base_directory(base_path).build().await?;

        let escape_attempts = vec![
            "../outside_target.txt",
            "../../outside_target.txt",
            "/etc/passwd",
            "file\0.txt",
        ];

        for attempt in escape_attempts {
            let result = manager.write_atomic(attempt, "attack payload").await;
            assert!(result.is_err(), "Should reject escape attempt: {attempt}");
        }

        let allowed_traversal = vec![
            "a/b/../file.txt",
            "deep/nested/../other.txt",
            "x/y/z/../../file.txt",
        ];
        for allowed in allowed_traversal {
            let result = manager.write_atomic(allowed, "content").await;
            assert!(result.is_ok(), "Should allow path that resolves within sandbox: {allowed}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_paths() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = SandboxedManager::builder().base_directory(temp_dir.path()).build().await?;

        let invalid_paths = vec!["/etc/passwd", "file\0name.txt", ""];

        for path in invalid_paths {
            let result = manager.write_atomic(path, "malicious content").await;
            assert!(result.is_err(), "Should reject invalid path: {path:?}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_symlink_within_sandbox() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let base_path = temp_dir.path();

        let real_file = base_path.join("realfile.txt");
        std::fs::write(&real_file, "real content")?;

        let symlink_path = base_path.join("symlink.txt");
        #[cfg(unix)]
        {
            if std::os::unix::fs::symlink(&real_file, &symlink_path).is_err() {
                return Ok(());
            }
        }
        #[cfg(windows)]
        {
            if std::os::windows::fs::symlink_file(&real_file, &symlink_path).is_err() {
                return Ok(());
            }
        }

        let manager = SandboxedManager::builder().base_directory(base_path).build().await?;

        manager.write_atomic("symlink.txt", "symlink content").await?;
        let _content = manager.read_to_string("symlink.txt").await?;
        Ok(())
    }
}
