use std::{
    io::Write,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("could not write model collection to {path:?}: {source}")]
pub struct ModelWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Derives the emission file for a base output name by appending the
/// `.random.json` suffix.
pub fn ensemble_output_path(base: &Path) -> PathBuf {
    let mut path = base.as_os_str().to_os_string();
    path.push(".random.json");
    PathBuf::from(path)
}

/// Writes the emitted model artifacts as a single JSON object with one
/// `"Automaton k"` entry per artifact, `k` counting from one. The artifacts
/// are already serialized and are interpolated verbatim, re-encoding them
/// would escape their contents. The file appears atomically: the content
/// goes to a temporary file in the target directory first and is moved into
/// place once complete.
pub fn write_model_collection(path: &Path, artifacts: &[String]) -> Result<(), ModelWriteError> {
    let body = artifacts
        .iter()
        .enumerate()
        .map(|(i, artifact)| format!("\"Automaton {}\": {artifact}", i + 1))
        .join(", ");

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let fail = |source| ModelWriteError {
        path: path.to_path_buf(),
        source,
    };

    let mut file = NamedTempFile::new_in(directory).map_err(&fail)?;
    write!(file, "{{{body}}}").map_err(&fail)?;
    file.persist(path).map_err(|error| fail(error.error))?;

    debug!("wrote {} models to {path:?}", artifacts.len());
    Ok(())
}
