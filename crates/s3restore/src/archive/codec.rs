//! Unpacking of gzip-compressed tar and zip archives.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to open archive '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported archive format for '{path}'")]
    UnsupportedFormat { path: PathBuf },

    #[error("Corrupt tar archive: {0}")]
    Tar(#[source] std::io::Error),

    #[error("Corrupt zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive entry '{entry}' would be written outside the target directory")]
    EntryEscapes { entry: String },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to inspect unpacked files: {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Detects the format from the leading magic bytes.
    pub fn detect(path: &Path) -> Result<Self, ArchiveError> {
        let mut file = File::open(path).map_err(|e| ArchiveError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut magic = [0u8; 4];
        let read = file.read(&mut magic).map_err(|e| ArchiveError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

        match &magic[..read] {
            [0x1f, 0x8b, ..] => Ok(Self::TarGz),
            [b'P', b'K', 0x03, 0x04] | [b'P', b'K', 0x05, 0x06] => Ok(Self::Zip),
            _ => Err(ArchiveError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnpackSummary {
    pub format: ArchiveFormat,
    pub files: usize,
    pub bytes: u64,
}

/// Unpacks `archive` into `dest`, which must already exist.
///
/// Entries with absolute paths or `..` components are rejected before
/// anything is written for them.
pub fn unpack_archive(archive: &Path, dest: &Path) -> Result<UnpackSummary, ArchiveError> {
    let format = ArchiveFormat::detect(archive)?;
    let file = File::open(archive).map_err(|e| ArchiveError::Open {
        path: archive.to_path_buf(),
        source: e,
    })?;

    match format {
        ArchiveFormat::TarGz => unpack_tar_gz(file, dest)?,
        ArchiveFormat::Zip => unpack_zip(file, dest)?,
    }

    let mut files = 0usize;
    let mut bytes = 0u64;
    for entry in WalkDir::new(dest) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files += 1;
            bytes += entry.metadata()?.len();
        }
    }

    log::debug!(
        "Unpacked {:?} archive: {} files, {} bytes",
        format,
        files,
        bytes
    );

    Ok(UnpackSummary {
        format,
        files,
        bytes,
    })
}

fn unpack_tar_gz(file: File, dest: &Path) -> Result<(), ArchiveError> {
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive.entries().map_err(ArchiveError::Tar)? {
        let mut entry = entry.map_err(ArchiveError::Tar)?;
        let name = entry
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "<invalid path>".to_string());
        // unpack_in refuses paths that leave `dest` and reports it as false.
        if !entry.unpack_in(dest).map_err(ArchiveError::Tar)? {
            return Err(ArchiveError::EntryEscapes { entry: name });
        }
    }
    Ok(())
}

fn unpack_zip(file: File, dest: &Path) -> Result<(), ArchiveError> {
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::EntryEscapes {
                entry: entry.name().to_string(),
            })?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| ArchiveError::Write {
                path: out_path.clone(),
                source: e,
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let mut out = File::create(&out_path).map_err(|e| ArchiveError::Write {
            path: out_path.clone(),
            source: e,
        })?;
        std::io::copy(&mut entry, &mut out).map_err(|e| ArchiveError::Write {
            path: out_path.clone(),
            source: e,
        })?;
    }
    Ok(())
}
