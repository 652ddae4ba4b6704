//! Security utilities for path validation and sandboxing.

use crate::error::{Result, SandboxedFileError};
use std::path::Path;

/// Sets secure permissions on a directory (Unix only).
pub async fn set_secure_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|_e| SandboxedFileError::Permission {
                operation: "set secure permissions".to_string(),
                path: path.to_path_buf(),
            })?;
    }

    #[cfg(not(unix))]
    {
        // On non-Unix systems, we can't set specific permissions
        // but we can still validate the directory exists
        if !path.exists() {
            return Err(SandboxedFileError::PathValidation {
                path: path.to_path_buf(),
                reason: "Directory does not exist".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_secure_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        set_secure_permissions(temp_dir.path()).await.unwrap();

        let mode = std::fs::metadata(temp_dir.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
