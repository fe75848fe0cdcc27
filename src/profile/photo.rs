//! Local temporary copies of incoming profile photos.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// One image waiting to be uploaded. The backing file is deleted on drop.
#[derive(Debug)]
pub struct PhotoPayload {
    file: NamedTempFile,
}

impl PhotoPayload {
    /// Creates an empty temporary file to download into.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be created.
    pub fn empty() -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix("tg_upload_")
            .suffix(".jpg")
            .tempfile()?;
        Ok(Self { file })
    }

    /// Creates a temporary copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> std::io::Result<Self> {
        let mut payload = Self::empty()?;
        payload.file.write_all(bytes)?;
        payload.file.flush()?;
        Ok(payload)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_removed_on_drop() {
        let payload = PhotoPayload::from_bytes(b"\xFF\xD8\xFF").unwrap();
        let path = payload.path().to_owned();
        assert_eq!(std::fs::read(&path).unwrap(), b"\xFF\xD8\xFF");

        drop(payload);
        assert!(!path.exists());
    }
}
