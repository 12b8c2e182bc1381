use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::PointpackError;
use crate::serialize::SerializedDatasetHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub content: Vec<u8>,
}

/// Zips every file of every handle into one flat in-memory archive.
///
/// All files are read before the archive is started, so a missing file fails
/// the whole call instead of yielding a partial archive.
pub fn package(handles: &[SerializedDatasetHandle]) -> Result<Vec<u8>, PointpackError> {
    if handles.is_empty() {
        return Err(PointpackError::NothingToPackage);
    }

    let entries = collect_entries(handles)?;
    if entries.is_empty() {
        return Err(PointpackError::NothingToPackage);
    }
    write_entries(&entries)
}

pub fn collect_entries(
    handles: &[SerializedDatasetHandle],
) -> Result<Vec<ArchiveEntry>, PointpackError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for handle in handles {
        for path in handle.files() {
            let name = path
                .file_name()
                .ok_or_else(|| PointpackError::PackagingIo(format!("no file name in {path}")))?
                .to_string();
            if !seen.insert(name.clone()) {
                return Err(PointpackError::DuplicateArchiveEntry(name));
            }
            let content = fs::read(path.as_std_path())
                .map_err(|err| PointpackError::PackagingIo(format!("read {path}: {err}")))?;
            entries.push(ArchiveEntry { name, content });
        }
    }
    Ok(entries)
}

pub fn write_entries(entries: &[ArchiveEntry]) -> Result<Vec<u8>, PointpackError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|err| PointpackError::PackagingIo(err.to_string()))?;
        writer
            .write_all(&entry.content)
            .map_err(|err| PointpackError::PackagingIo(err.to_string()))?;
        debug!(entry = %entry.name, bytes = entry.content.len(), "archive entry written");
    }
    let cursor = writer
        .finish()
        .map_err(|err| PointpackError::PackagingIo(err.to_string()))?;
    Ok(cursor.into_inner())
}

/// Member names of an archive, in archive order.
pub fn list_entries(bytes: &[u8]) -> Result<Vec<String>, PointpackError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| PointpackError::PackagingIo(err.to_string()))?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|err| PointpackError::PackagingIo(err.to_string()))?;
        names.push(entry.name().to_string());
    }
    Ok(names)
}

/// Extracts a flat archive into `target_dir` and returns the written paths.
///
/// Members must be bare file names. Nested paths, directory members and
/// names already present in `target_dir` are refused.
pub fn unpack(bytes: &[u8], target_dir: &Path) -> Result<Vec<PathBuf>, PointpackError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| PointpackError::PackagingIo(err.to_string()))?;
    fs::create_dir_all(target_dir).map_err(|err| {
        PointpackError::Filesystem(format!("create {}: {err}", target_dir.display()))
    })?;

    let mut written = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut member = archive
            .by_index(i)
            .map_err(|err| PointpackError::PackagingIo(err.to_string()))?;
        let file_name = member
            .enclosed_name()
            .filter(|path| !member.is_dir() && path.components().count() == 1)
            .ok_or_else(|| {
                PointpackError::UnsupportedInput(format!(
                    "archive member {:?} is not a plain file name",
                    member.name()
                ))
            })?;

        let dest = target_dir.join(file_name);
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&dest)
            .map_err(|err| PointpackError::Filesystem(format!("create {}: {err}", dest.display())))?;
        io::copy(&mut member, &mut file)
            .map_err(|err| PointpackError::Filesystem(format!("write {}: {err}", dest.display())))?;
        debug!(path = %dest.display(), "archive member extracted");
        written.push(dest);
    }
    Ok(written)
}

/// Writes archive bytes next to `dest` first and renames into place.
pub fn write_archive_atomic(dest: &Path, bytes: &[u8]) -> Result<(), PointpackError> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| PointpackError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("pointpack-archive")
        .tempfile_in(parent)
        .map_err(|err| PointpackError::Filesystem(err.to_string()))?;
    temp.write_all(bytes)
        .map_err(|err| PointpackError::Filesystem(err.to_string()))?;
    temp.persist(dest)
        .map_err(|err| PointpackError::Filesystem(err.to_string()))?;
    Ok(())
}
