//! Persisted contract bytecode.
//!
//! Code is stored as `<data_dir>/wasm/<checksum hex>.wasm`. Files are
//! verified against their checksum when loaded, so a corrupted or swapped
//! file is reported instead of being compiled.

use crate::error::{VmError, VmResult};
use sealvm_core::Checksum;
use std::path::{Path, PathBuf};

const CODE_DIR: &str = "wasm";
const CODE_EXTENSION: &str = "wasm";

/// Directory of checksum-named bytecode files
#[derive(Debug, Clone)]
pub struct CodeStore {
    dir: PathBuf,
}

impl CodeStore {
    /// Open the code directory under `data_dir`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if directory creation fails
    pub fn open(data_dir: impl AsRef<Path>) -> VmResult<Self> {
        let dir = data_dir.as_ref().join(CODE_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| {
            VmError::Io(format!(
                "Failed to create code directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    /// Directory holding the code files
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `code` under its checksum
    ///
    /// Existing files are left alone; the content is fixed by the name.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails
    pub fn save(&self, checksum: &Checksum, code: &[u8]) -> VmResult<()> {
        let path = self.code_path(checksum);
        if path.exists() {
            return Ok(());
        }
        // never a truncated file under the final name
        let partial = path.with_extension("partial");
        std::fs::write(&partial, code)?;
        std::fs::rename(&partial, &path)?;
        Ok(())
    }

    /// Read the code stored under `checksum`
    ///
    /// # Errors
    ///
    /// Returns error if the read fails or the content does not match
    pub fn load(&self, checksum: &Checksum) -> VmResult<Option<Vec<u8>>> {
        let path = self.code_path(checksum);
        let code = match std::fs::read(&path) {
            Ok(code) => code,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        checksum.verify(&code).map_err(|e| {
            VmError::Io(format!("Corrupted code file {}: {}", path.display(), e))
        })?;
        Ok(Some(code))
    }

    /// Check if code is stored under `checksum`
    #[must_use]
    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.code_path(checksum).is_file()
    }

    fn code_path(&self, checksum: &Checksum) -> PathBuf {
        self.dir
            .join(checksum.to_hex())
            .with_extension(CODE_EXTENSION)
    }
}
