//! Secret reading

use crate::error::{ChurnError, ErrorCategory, ErrorKind, Result};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Trait for reading the churn secret from various sources
pub trait SecretReader {
    /// Read the secret as arbitrary bytes (not necessarily UTF-8)
    ///
    /// Returns the secret wrapped in `Zeroizing` so it is wiped from memory
    /// when dropped. An empty secret is an error.
    fn read_secret(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Returns a fixed secret (for testing)
pub struct ConstantSecretReader {
    secret: Zeroizing<Vec<u8>>,
}

impl ConstantSecretReader {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret: Zeroizing::new(secret),
        }
    }
}

impl SecretReader for ConstantSecretReader {
    fn read_secret(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        non_empty(Zeroizing::new((*self.secret).clone()))
    }
}

/// Reads the secret from any io::Read source, byte for byte
pub struct ReaderSecretReader {
    reader: Box<dyn Read>,
}

impl ReaderSecretReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl SecretReader for ReaderSecretReader {
    fn read_secret(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            ChurnError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading secret: {}", e),
                e,
            )
        })?;
        non_empty(data)
    }
}

/// Reads the whole of a key file as the secret
pub struct FileSecretReader {
    path: PathBuf,
}

impl FileSecretReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretReader for FileSecretReader {
    fn read_secret(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let data = fs::read(&self.path).map_err(|e| ChurnError::path("read", &self.path, e))?;
        non_empty(Zeroizing::new(data))
    }
}

fn non_empty(secret: Zeroizing<Vec<u8>>) -> Result<Zeroizing<Vec<u8>>> {
    if secret.is_empty() {
        return Err(ChurnError::invalid_argument("secret is empty"));
    }
    Ok(secret)
}
