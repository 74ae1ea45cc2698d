use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// File extension of pre-rendered candidate configs.
const CANDIDATE_EXTENSION: &str = "conf";

/// A device's candidate configuration: identity plus opaque text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateConfig {
    /// Device the candidate belongs to
    pub fqdn: String,
    /// Configuration text to converge the device to
    pub text: String,
}

/// Loads pre-rendered candidate configurations from a directory.
///
/// Rendering is an upstream concern; this store only maps a device identity
/// to `<dir>/<fqdn>.conf`. A missing or unreadable candidate is an error the
/// engine reports as a per-device failure: it means generation did not
/// produce what the run is about to push.
#[derive(Debug, Clone)]
pub struct CandidateStore {
    dir: PathBuf,
}

impl CandidateStore {
    /// Create a store over the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the candidate file for a device.
    pub fn path_for(&self, fqdn: &str) -> PathBuf {
        self.dir.join(format!("{fqdn}.{CANDIDATE_EXTENSION}"))
    }

    /// Load the candidate configuration for a device.
    pub fn load(&self, fqdn: &str) -> Result<CandidateConfig> {
        let path = self.path_for(fqdn);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Could not read candidate config {}", path.display()))?;
        Ok(CandidateConfig {
            fqdn: fqdn.to_string(),
            text,
        })
    }
}
