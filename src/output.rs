//! Destination handling shared by streamed and whole-table stages.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{EtlError, Result};

/// Open `source` for reading, mapping a missing file to [`EtlError::SourceNotFound`].
pub fn open_source(source: &Path) -> Result<File> {
    File::open(source).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => EtlError::SourceNotFound {
            path: source.to_path_buf(),
        },
        _ => EtlError::Io(e),
    })
}

/// Remove any previous output at `destination` and create it empty.
///
/// Refuses to proceed when `destination` is the source file.
pub fn prepare_destination(source: &Path, destination: &Path) -> Result<File> {
    if same_file(source, destination) {
        return Err(EtlError::Config(format!(
            "destination {} would overwrite the source",
            destination.display()
        )));
    }

    let unwritable = |e: io::Error| EtlError::DestinationUnwritable {
        path: destination.to_path_buf(),
        source: e,
    };

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(unwritable)?;
    }

    match fs::remove_file(destination) {
        Ok(()) => debug!(path = %destination.display(), "Removed previous output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(unwritable(e)),
    }

    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .map_err(unwritable)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Hex SHA-256 of a finished output file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
