//! Model artifact persistence
//!
//! Parameter snapshots are stored as JSON beside a SHA-256 checksum
//! sidecar. Writes go to a temp file first and are renamed into place so
//! a crashed save never leaves a half-written artifact.

use crate::error::LoadError;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Directory-backed store for model parameter snapshots.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn artifact_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn checksum_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.sha256"))
    }

    /// Persist a parameter snapshot with its checksum.
    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create artifact directory {:?}", self.dir))?;

        let bytes = serde_json::to_vec_pretty(value).context("Failed to serialize artifact")?;
        let checksum = compute_checksum(&bytes);

        write_atomic(&self.artifact_path(name), &bytes)?;
        write_atomic(&self.checksum_path(name), checksum.as_bytes())?;
        Ok(())
    }

    /// Load and checksum-validate a parameter snapshot.
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T, LoadError> {
        let path = self.artifact_path(name);
        if !path.exists() {
            return Err(LoadError::MissingArtifact {
                path: path.display().to_string(),
            });
        }

        let bytes = fs::read(&path)?;
        let expected = fs::read_to_string(self.checksum_path(name)).map_err(|_| {
            LoadError::CorruptArtifact {
                path: path.display().to_string(),
                reason: "missing checksum sidecar".to_string(),
            }
        })?;
        let actual = compute_checksum(&bytes);
        if actual != expected.trim() {
            return Err(LoadError::CorruptArtifact {
                path: path.display().to_string(),
                reason: format!("checksum mismatch: expected {}, got {}", expected.trim(), actual),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| LoadError::CorruptArtifact {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp artifact file {:?}", temp_path))?;
    file.write_all(bytes).context("Failed to write artifact")?;
    file.sync_all().context("Failed to sync artifact")?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
    Ok(())
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestParams {
        weights: Vec<f64>,
        version: u32,
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"model parameters");
        assert_eq!(checksum.len(), 64); // SHA256 hex is 64 chars
        assert_eq!(checksum, compute_checksum(b"model parameters"));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let params = TestParams {
            weights: vec![0.1, -0.2, 0.3],
            version: 7,
        };

        store.save("price_prediction", &params).unwrap();
        let loaded: TestParams = store.load("price_prediction").unwrap();
        assert_eq!(loaded, params);
    }

    #[test]
    fn test_load_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let result: Result<TestParams, _> = store.load("credit_risk");
        assert!(matches!(result, Err(LoadError::MissingArtifact { .. })));
    }

    #[test]
    fn test_load_rejects_tampered_artifact() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let params = TestParams {
            weights: vec![1.0],
            version: 1,
        };
        store.save("credit_risk", &params).unwrap();

        fs::write(
            dir.path().join("credit_risk.json"),
            b"{\"weights\":[9.0],\"version\":1}",
        )
        .unwrap();

        let result: Result<TestParams, _> = store.load("credit_risk");
        assert!(matches!(result, Err(LoadError::CorruptArtifact { .. })));
    }

    #[test]
    fn test_load_rejects_missing_checksum() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let params = TestParams {
            weights: vec![1.0],
            version: 1,
        };
        store.save("liquidity_forecasting", &params).unwrap();
        fs::remove_file(dir.path().join("liquidity_forecasting.sha256")).unwrap();

        let result: Result<TestParams, _> = store.load("liquidity_forecasting");
        assert!(matches!(result, Err(LoadError::CorruptArtifact { .. })));
    }
}
