//! Packaging and safe extraction of `.tar.gz` containers.
//!
//! The protocol treats archives as opaque payloads; this module is the
//! collaborator that creates them before publishing and unpacks them
//! after downloading. Extraction refuses any entry whose path would
//! resolve outside the destination directory.
//!
//! Both operations are blocking; call them through
//! `tokio::task::spawn_blocking` from async contexts.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::{Component, Path, PathBuf};

use crate::error::TransferError;

/// File suffix of packaged archives.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// True if `path` names a packaged archive.
pub fn is_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(ARCHIVE_SUFFIX))
}

/// Package a file or directory into `<basename>.tar.gz` under `out_dir`,
/// containing `src` under its base name. Returns the archive path.
pub fn package_path(src: &Path, out_dir: &Path) -> Result<PathBuf, TransferError> {
    let basename = src.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("cannot package {}: no base name", src.display()),
        )
    })?;
    let archive_name = format!("{}{}", basename.to_string_lossy(), ARCHIVE_SUFFIX);
    let archive_path = out_dir.join(&archive_name);

    let encoder = GzEncoder::new(File::create(&archive_path)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    if src.is_dir() {
        builder.append_dir_all(basename, src)?;
    } else {
        builder.append_path_with_name(src, basename)?;
    }
    builder.into_inner()?.finish()?;

    tracing::info!(
        "Packaged {} into {}",
        basename.to_string_lossy(),
        archive_name
    );
    Ok(archive_path)
}

/// Extract `archive` into `dest`, refusing any entry whose path would
/// resolve outside `dest`.
///
/// Entry paths are checked before anything is unpacked, so a crafted
/// archive causes no write at all.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), TransferError> {
    let gz = GzDecoder::new(File::open(archive)?);
    let mut scan = tar::Archive::new(gz);
    for entry in scan.entries()? {
        let entry = entry?;
        let path = entry.path()?.into_owned();
        if !is_contained(&path) {
            return Err(TransferError::PathTraversal(path));
        }
    }

    let gz = GzDecoder::new(File::open(archive)?);
    let mut unpacker = tar::Archive::new(gz);
    std::fs::create_dir_all(dest)?;
    unpacker.unpack(dest)?;
    Ok(())
}

/// An entry path is contained if it is relative and never steps above
/// its starting directory.
fn is_contained(path: &Path) -> bool {
    let mut depth: i32 = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}
