//! Caching of compiled models.
//!
//! Compiling a model is far more expensive than encoding it, so [`ModelBuilder`] persists
//! compiled artifacts in an [`ArtifactStore`] keyed by model name and reuses them on later
//! builds.
//!
//! The key is the model name alone. An artifact cached before a model's template was edited
//! keeps being served under the same name; a template mismatch is logged when detected, and
//! [`ModelBuilder::rebuild`] forces a fresh compile.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::io::ErrorKind;
use std::ops::{Add, AddAssign};
use std::path::{Path, PathBuf};
use std::time::Instant;

use bincode::error::{DecodeError, EncodeError};
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::inference::Engine;
use crate::model::template::CompileError;
use crate::model::ModelIdentity;

/// Key-value persistence of encoded artifacts.
pub trait ArtifactStore {
    /// Reads the bytes stored under `key`. An absent entry must be reported as
    /// [`ErrorKind::NotFound`].
    fn read(&self, key: &str) -> Result<Vec<u8>, io::Error>;

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), io::Error>;
}

impl<S: ArtifactStore + ?Sized> ArtifactStore for &S {
    fn read(&self, key: &str) -> Result<Vec<u8>, io::Error> {
        (**self).read(key)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), io::Error> {
        (**self).write(key, bytes)
    }
}

/// Stores each artifact as `<key>.bin` in a directory, creating the directory on first write.
///
/// A key must name a single file within the directory: empty keys, `.`, `..` and keys containing
/// a path separator or NUL are rejected with [`ErrorKind::InvalidInput`].
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}
impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf, io::Error> {
        let invalid = key.is_empty()
            || key == "."
            || key == ".."
            || key.contains(['/', '\\', '\0', std::path::MAIN_SEPARATOR]);
        if invalid {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!("'{key}' cannot be used as a file name"),
            ));
        }
        Ok(self.dir.join(format!("{key}.bin")))
    }
}

impl ArtifactStore for DirStore {
    fn read(&self, key: &str) -> Result<Vec<u8>, io::Error> {
        fs::read(self.path_for(key)?)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), io::Error> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        let staging = path.with_extension("bin.partial");
        fs::write(&staging, bytes)?;
        fs::rename(staging, path)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<FxHashMap<String, Vec<u8>>>,
}
impl MemoryStore {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl ArtifactStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Vec<u8>, io::Error> {
        self.entries
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, format!("no artifact for '{key}'")))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), io::Error> {
        self.entries.borrow_mut().insert(key.into(), bytes.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub compiles: usize,
    pub stores: usize,
}

impl Add<bool> for CacheStats {
    type Output = CacheStats;

    fn add(mut self, cache_hit: bool) -> Self::Output {
        self += cache_hit;
        self
    }
}

impl AddAssign<bool> for CacheStats {
    fn add_assign(&mut self, cache_hit: bool) {
        if cache_hit {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheCorruptionError {
    #[error("cannot read cached model '{name}': {err}")]
    Read { name: String, err: io::Error },

    #[error("cannot decode cached model '{name}': {err}")]
    Decode { name: String, err: DecodeError },
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{0}")]
    Compile(#[from] CompileError),

    #[error("{0}")]
    CacheCorruption(#[from] CacheCorruptionError),

    #[error("cannot encode compiled model '{name}': {err}")]
    Encode { name: String, err: EncodeError },

    #[error("cannot store compiled model '{name}': {err}")]
    Store { name: String, err: io::Error },

    #[error("model '{name}' cannot be cached under its name: {err}")]
    InvalidKey { name: String, err: io::Error },
}

/// Builds compiled models through an engine, optionally caching them in a store.
pub struct ModelBuilder<'a, E: Engine, S: ArtifactStore> {
    engine: &'a E,
    store: S,
    stats: CacheStats,
}
impl<'a, E: Engine, S: ArtifactStore> ModelBuilder<'a, E, S> {
    pub fn new(engine: &'a E, store: S) -> Self {
        Self {
            engine,
            store,
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the compiled model for `identity`.
    ///
    /// Without caching, the template is compiled afresh and the store is left untouched. With
    /// caching, a stored artifact is decoded and returned; if there is none, the template is
    /// compiled and the result stored before being returned. A name the store cannot use as a
    /// key is a [`BuildError::InvalidKey`], raised before anything is compiled. Any other
    /// failure to read or decode the stored artifact is a [`CacheCorruptionError`]; it is never
    /// papered over by recompiling. Compile errors are returned as is and nothing is stored.
    pub fn build(&mut self, identity: &ModelIdentity, use_cache: bool) -> Result<E::Artifact, BuildError> {
        if !use_cache {
            return self.compile(identity);
        }

        match self.store.read(&identity.name) {
            Ok(bytes) => {
                let ((template, artifact), _): ((String, E::Artifact), usize) =
                    bincode::decode_from_slice(&bytes, bincode::config::standard()).map_err(|err| {
                        CacheCorruptionError::Decode {
                            name: identity.name.clone(),
                            err,
                        }
                    })?;
                self.stats += true;
                if template != identity.template {
                    warn!(
                        "cached model '{}' was compiled from a different template; rebuild to pick up the change",
                        identity.name
                    );
                }
                debug!("loaded '{}' from cache ({} bytes)", identity.name, bytes.len());
                Ok(artifact)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.stats += false;
                debug!("no cached model for '{}'", identity.name);
                let artifact = self.compile(identity)?;
                self.persist(identity, &artifact)?;
                Ok(artifact)
            }
            Err(err) if err.kind() == ErrorKind::InvalidInput => Err(BuildError::InvalidKey {
                name: identity.name.clone(),
                err,
            }),
            Err(err) => Err(CacheCorruptionError::Read {
                name: identity.name.clone(),
                err,
            }
            .into()),
        }
    }

    /// Compiles `identity` afresh and overwrites any stored artifact.
    pub fn rebuild(&mut self, identity: &ModelIdentity) -> Result<E::Artifact, BuildError> {
        let artifact = self.compile(identity)?;
        self.persist(identity, &artifact)?;
        Ok(artifact)
    }

    fn compile(&mut self, identity: &ModelIdentity) -> Result<E::Artifact, BuildError> {
        self.stats.compiles += 1;
        let start_time = Instant::now();
        let artifact = self.engine.compile(identity)?;
        info!(
            "compiled '{}' in {:.3}s",
            identity.name,
            start_time.elapsed().as_secs_f64()
        );
        Ok(artifact)
    }

    fn persist(&mut self, identity: &ModelIdentity, artifact: &E::Artifact) -> Result<(), BuildError> {
        let bytes = bincode::encode_to_vec(
            (identity.template.as_str(), artifact),
            bincode::config::standard(),
        )
        .map_err(|err| BuildError::Encode {
            name: identity.name.clone(),
            err,
        })?;
        self.store
            .write(&identity.name, &bytes)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidInput => BuildError::InvalidKey {
                    name: identity.name.clone(),
                    err,
                },
                _ => BuildError::Store {
                    name: identity.name.clone(),
                    err,
                },
            })?;
        self.stats.stores += 1;
        debug!("stored '{}' ({} bytes)", identity.name, bytes.len());
        Ok(())
    }
}
