use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use rand::Rng;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Supplies a stable identity for the current caller when a request does not
/// carry one.
///
/// Implementations must return the same value on every call until
/// [`reset`](IdentityProvider::reset) is called.
pub trait IdentityProvider {
    fn resolve(&self) -> Result<String>;

    fn reset(&self) -> Result<()> {
        Ok(())
    }
}

/// Generates a fresh numeric identity in `[0, 100_000_000)`.
pub fn generate_identity() -> String {
    rand::thread_rng().gen_range(0..100_000_000u32).to_string()
}

/// Identity persisted in a small text file, created on first use.
#[derive(Debug, Clone)]
pub struct FileIdentity {
    path: PathBuf,
}

impl FileIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl IdentityProvider for FileIdentity {
    fn resolve(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let id = content.trim();
                if id.is_empty() {
                    return Err(Error::identity(format!(
                        "identity file {} is empty",
                        self.path.display()
                    )));
                }
                debug!(path = %self.path.display(), "loaded stored identity");
                Ok(id.to_owned())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let id = generate_identity();
                fs::write(&self.path, &id).map_err(|e| {
                    Error::identity(format!(
                        "failed to write identity file {}: {e}",
                        self.path.display()
                    ))
                })?;
                info!(path = %self.path.display(), "issued new identity");
                Ok(id)
            }
            Err(e) => Err(Error::identity(format!(
                "failed to read identity file {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn reset(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::identity(format!(
                "failed to remove identity file {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// Identity generated on first use and kept for the lifetime of the value.
#[derive(Debug, Default)]
pub struct MemoryIdentity {
    id: Mutex<Option<String>>,
}

impl IdentityProvider for MemoryIdentity {
    fn resolve(&self) -> Result<String> {
        let mut guard = self
            .id
            .lock()
            .map_err(|_| Error::identity("identity lock poisoned"))?;
        Ok(guard.get_or_insert_with(generate_identity).clone())
    }

    fn reset(&self) -> Result<()> {
        let mut guard = self
            .id
            .lock()
            .map_err(|_| Error::identity("identity lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

/// Identity carried by an incoming request cookie, or issued for it.
///
/// [`issued`](CookieIdentity::issued) reports a freshly generated value so
/// the caller can hand it back to the client.
#[derive(Debug, Default)]
pub struct CookieIdentity {
    cookie: Option<String>,
    issued: OnceLock<String>,
}

impl CookieIdentity {
    pub fn new(cookie: Option<String>) -> Self {
        Self {
            cookie: cookie.filter(|c| !c.is_empty()),
            issued: OnceLock::new(),
        }
    }

    pub fn issued(&self) -> Option<&str> {
        self.issued.get().map(String::as_str)
    }
}

impl IdentityProvider for CookieIdentity {
    fn resolve(&self) -> Result<String> {
        if let Some(cookie) = &self.cookie {
            return Ok(cookie.clone());
        }
        Ok(self.issued.get_or_init(generate_identity).clone())
    }
}

/// Provider for contexts where every request must name its identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireExplicit;

impl IdentityProvider for RequireExplicit {
    fn resolve(&self) -> Result<String> {
        Err(Error::identity("request carries no identity"))
    }
}
