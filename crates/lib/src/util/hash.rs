//! SHA-256 digests for artifacts and source-tree fingerprints.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// A full 64-character SHA256 hash, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// First `len` characters, for names and display.
  pub fn short(&self, len: usize) -> &str {
    &self.0[..len.min(self.0.len())]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, thiserror::Error)]
pub enum HashError {
  #[error("failed to walk {}: {source}", .root.display())]
  Walk {
    root: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Fingerprint a source tree.
///
/// Relative paths, file contents and symlink targets contribute; timestamps
/// and permissions do not. Entries named in `exclude` are pruned together
/// with everything beneath them. Other special files are ignored.
pub fn hash_directory(root: &Path, exclude: &[&str]) -> Result<ContentHash, HashError> {
  let walker = WalkDir::new(root)
    .min_depth(1)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.file_name().to_str().is_none_or(|name| !exclude.contains(&name)));

  let mut hasher = Sha256::new();
  for entry in walker {
    let entry = entry.map_err(|source| HashError::Walk {
      root: root.to_path_buf(),
      source,
    })?;
    let path = entry.path();
    let rel = path.strip_prefix(root).unwrap_or(path).to_string_lossy().replace('\\', "/");

    let file_type = entry.file_type();
    let line = if file_type.is_file() {
      format!("F {} {}", rel, hash_file(path)?)
    } else if file_type.is_dir() {
      format!("D {}", rel)
    } else if file_type.is_symlink() {
      let target = fs::read_link(path).map_err(|source| HashError::Read {
        path: path.to_path_buf(),
        source,
      })?;
      format!("L {} {}", rel, target.to_string_lossy())
    } else {
      continue;
    };
    hasher.update(line.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// SHA-256 of a file, streamed.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  let read_err = |source| HashError::Read {
    path: path.to_path_buf(),
    source,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher).map_err(read_err)?;
  Ok(ContentHash(hex::encode(hasher.finalize())))
}

pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}
