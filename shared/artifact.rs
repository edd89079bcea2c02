//! Durable storage helpers shared by every stage that persists an artifact.
//!
//! All writes go to a sibling `.partial` file first and are renamed into
//! place, so an interrupted stage never leaves a truncated artifact behind
//! for the next run to mistake as complete.

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to read or write artifact '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode or decode JSON artifact: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to parse TOML artifact: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize artifact to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Writes `bytes` to `path` through a temporary sibling and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    let tmp = partial_path(path);
    {
        let file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes).map_err(io_error(&tmp))?;
        writer.flush().map_err(io_error(&tmp))?;
    }
    fs::rename(&tmp, path).map_err(io_error(path))
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let bytes = serde_json::to_vec(value)?;
    write_atomic(path, &bytes)
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn save_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let toml_string = toml::to_string_pretty(value)?;
    write_atomic(path, toml_string.as_bytes())
}

pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let toml_string = fs::read_to_string(path).map_err(io_error(path))?;
    Ok(toml::from_str(&toml_string)?)
}

/// Incremental SHA-256 over the inputs that determine an artifact.
#[derive(Default)]
pub struct Fingerprinter {
    hasher: Sha256,
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_str(&mut self, value: &str) -> &mut Self {
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn update_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.update(value.to_le_bytes());
        self
    }

    pub fn update_f64s<'a, I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = &'a f64>,
    {
        for value in values {
            self.hasher.update(value.to_bits().to_le_bytes());
        }
        self
    }

    pub fn update_json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, ArtifactError> {
        let bytes = serde_json::to_vec(value)?;
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(&bytes);
        Ok(self)
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
