use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha1::{Digest as _, Sha1};
use thiserror::Error;

/// Content address of a stored blob: lowercase hex SHA-1 of its canonical
/// JSON bytes. Doubles as the blob's filename.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Digest(String);

impl Digest {
    fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let hash = hasher.finalize();
        let mut hex = String::with_capacity(hash.len() * 2);
        for byte in hash {
            hex.push_str(&format!("{byte:02x}"));
        }
        Digest(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Digest {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Digest(s.to_ascii_lowercase()))
        } else {
            Err(StoreError::InvalidDigest(s.to_string()))
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no blob stored under {0}")]
    NotFound(Digest),
    #[error("blob {digest} is corrupt: {source}")]
    Corrupt {
        digest: Digest,
        source: serde_json::Error,
    },
    #[error("invalid campaign set id {0:?} (expected 40 hex characters)")]
    InvalidDigest(String),
    #[error("failed to serialize blob: {0}")]
    Serialize(serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Write-once, content-addressed JSON blobs in a flat directory. Identical
/// content always lands at the identical address, so concurrent writers
/// racing on one blob are harmless.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: PathBuf) -> Self {
        BlobStore { dir }
    }

    pub fn put<T: Serialize>(&self, object: &T) -> Result<Digest, StoreError> {
        let data = canonical_json(object)?;
        let digest = Digest::of(&data);
        let path = self.dir.join(digest.as_str());
        if path.exists() {
            return Ok(digest);
        }

        fs::create_dir_all(&self.dir)?;
        // Stage and rename so a racing reader never sees partial bytes.
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, &path)?;
        Ok(digest)
    }

    pub fn get<T: DeserializeOwned>(&self, digest: &Digest) -> Result<T, StoreError> {
        let path = self.dir.join(digest.as_str());
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(digest.clone()))
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&data).map_err(|source| StoreError::Corrupt {
            digest: digest.clone(),
            source,
        })
    }
}

/// Deterministic bytes for hashing: compact JSON with object keys sorted.
/// Round-tripping through `serde_json::Value` sorts keys because the default
/// `Map` is a BTreeMap.
fn canonical_json<T: Serialize>(object: &T) -> Result<Vec<u8>, StoreError> {
    let value = serde_json::to_value(object).map_err(StoreError::Serialize)?;
    serde_json::to_vec(&value).map_err(StoreError::Serialize)
}
