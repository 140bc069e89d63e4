//! JSON file loading.

use std::fs::File;
use std::io;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("cannot read {path:?}: {err}")]
pub struct JsonFileError {
    pub path: PathBuf,
    pub err: io::Error,
}

/// Reads a JSON-encoded type from the file at `path`. Syntax and schema errors are reported as
/// [`io::ErrorKind::InvalidData`].
pub fn read_json<D: DeserializeOwned>(path: impl AsRef<Path>) -> Result<D, JsonFileError> {
    let path = path.as_ref();
    let in_context = |err: io::Error| JsonFileError {
        path: path.to_path_buf(),
        err,
    };
    let file = File::open(path).map_err(in_context)?;
    serde_json::from_reader(BufReader::new(file)).map_err(|err| in_context(err.into()))
}

pub trait ReadJsonFile: Sized {
    fn read_json_file(path: impl AsRef<Path>) -> Result<Self, JsonFileError>;
}

impl<D: DeserializeOwned> ReadJsonFile for D {
    fn read_json_file(path: impl AsRef<Path>) -> Result<Self, JsonFileError> {
        read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
    }

    fn scratch_file(test: &str, contents: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("soccerstan-file-{test}-{}.json", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn reads_json() {
        let path = scratch_file("ok", r#"{"name": "maher"}"#);
        assert_eq!(
            Sample { name: "maher".into() },
            Sample::read_json_file(&path).unwrap()
        );
    }

    #[test]
    fn malformed_json_is_invalid_data() {
        let path = scratch_file("malformed", r#"{"name": 5}"#);
        let err = read_json::<Sample>(&path).unwrap_err();
        assert_eq!(path, err.path);
        assert_eq!(io::ErrorKind::InvalidData, err.err.kind());
    }

    #[test]
    fn missing_file() {
        let path = env::temp_dir().join("soccerstan-file-absent.json");
        let err = read_json::<Sample>(&path).unwrap_err();
        assert_eq!(io::ErrorKind::NotFound, err.err.kind());
    }
}
