//! Strict chart archive unpacking
//!
//! Archives are gzip-compressed tarballs with a single top-level chart
//! directory. Entries are checked one by one before anything is written:
//! absolute paths, `..` components, links pointing outside the destination
//! and device or fifo entries are rejected. Link targets are resolved through
//! whatever is already on disk, and every symlink is re-checked once the
//! whole archive is written, so chains of individually harmless links cannot
//! reach outside either.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use walkdir::WalkDir;

use crate::error::{FetchError, Result};
use crate::workspace::ARCHIVE_FILE_NAME;

/// Directory names that are never taken as the chart directory
const RESERVED_NAMES: &[&str] = &["lost+found"];

/// Unpack `<workspace>/chart.tgz` into the workspace and locate the chart directory
pub fn unpack(workspace_root: &Path) -> Result<PathBuf> {
    let archive_path = workspace_root.join(ARCHIVE_FILE_NAME);
    let file = File::open(&archive_path).map_err(|source| FetchError::Archive { source })?;

    let count = unpack_archive(file, workspace_root)?;
    tracing::debug!(entries = count, dest = %workspace_root.display(), "archive unpacked");

    find_chart_directory(workspace_root)
}

/// Extract a tar.gz stream into `dest`, returning the number of entries written
pub fn unpack_archive<R: Read>(reader: R, dest: &Path) -> Result<usize> {
    let root = dest
        .canonicalize()
        .map_err(|source| FetchError::Archive { source })?;

    let mut archive = Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(false);
    archive.set_overwrite(true);

    let mut count = 0;
    for entry in archive
        .entries()
        .map_err(|source| FetchError::Archive { source })?
    {
        let mut entry = entry.map_err(|source| FetchError::Archive { source })?;
        let entry_type = entry.header().entry_type();

        if matches!(entry_type, EntryType::XGlobalHeader | EntryType::XHeader) {
            continue;
        }

        let path = entry
            .path()
            .map_err(|source| FetchError::Archive { source })?
            .into_owned();
        let display = path.display().to_string();

        check_entry_path(&path).map_err(|reason| unsafe_entry(&display, reason))?;

        match entry_type {
            EntryType::Char | EntryType::Block | EntryType::Fifo => {
                return Err(unsafe_entry(&display, "device and fifo entries are not allowed"));
            }
            EntryType::Symlink | EntryType::Link => {
                let target = entry
                    .link_name()
                    .map_err(|source| FetchError::Archive { source })?
                    .ok_or_else(|| unsafe_entry(&display, "link entry without a target"))?
                    .into_owned();

                let base = if entry_type == EntryType::Symlink {
                    path.parent().unwrap_or(Path::new("")).to_path_buf()
                } else {
                    PathBuf::new()
                };
                if escapes(&base, &target)
                    || !resolve_on_disk(&root.join(&base).join(&target)).starts_with(&root)
                {
                    return Err(unsafe_entry(
                        &display,
                        &format!("link target {} escapes the workspace", target.display()),
                    ));
                }
            }
            _ => {}
        }

        let unpacked = entry
            .unpack_in(dest)
            .map_err(|source| FetchError::Archive { source })?;
        if !unpacked {
            return Err(unsafe_entry(&display, "entry escapes the workspace"));
        }
        count += 1;
    }

    verify_links(&root)?;
    Ok(count)
}

/// Re-check every symlink under `root` now that all of them exist
///
/// Dangling links are left alone; they cannot be read through.
fn verify_links(root: &Path) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| FetchError::Archive { source: e.into() })?;
        if !entry.path_is_symlink() {
            continue;
        }
        if let Ok(real) = entry.path().canonicalize() {
            if !real.starts_with(root) {
                let display = entry
                    .path()
                    .strip_prefix(root)
                    .unwrap_or(entry.path())
                    .display()
                    .to_string();
                return Err(unsafe_entry(&display, "link resolves outside the workspace"));
            }
        }
    }
    Ok(())
}

/// Find the chart directory among the immediate children of `root`
///
/// Subdirectories are taken in name order and the first one wins.
pub fn find_chart_directory(root: &Path) -> Result<PathBuf> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(root).map_err(|source| FetchError::Archive { source })? {
        let entry = entry.map_err(|source| FetchError::Archive { source })?;
        let is_dir = entry
            .file_type()
            .map_err(|source| FetchError::Archive { source })?
            .is_dir();
        let name = entry.file_name();
        if is_dir && !RESERVED_NAMES.iter().any(|r| name == *r) {
            candidates.push(entry.path());
        }
    }
    candidates.sort();

    if candidates.len() > 1 {
        tracing::debug!(
            candidates = candidates.len(),
            "multiple top-level directories, using the first"
        );
    }

    candidates
        .into_iter()
        .next()
        .ok_or(FetchError::ChartDirectoryNotFound)
}

fn unsafe_entry(path: &str, reason: &str) -> FetchError {
    FetchError::UnsafeArchiveEntry {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn check_entry_path(path: &Path) -> std::result::Result<(), &'static str> {
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => return Err("absolute path"),
            Component::ParentDir => return Err("path contains `..`"),
            Component::CurDir | Component::Normal(_) => {}
        }
    }
    Ok(())
}

/// Whether `target`, resolved against `base`, leaves the destination
fn escapes(base: &Path, target: &Path) -> bool {
    let mut depth: usize = 0;
    for component in base.components().chain(target.components()) {
        match component {
            Component::Prefix(_) | Component::RootDir => return true,
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return true,
            },
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
        }
    }
    false
}

/// Resolve `path` through its longest existing prefix, then lexically
fn resolve_on_disk(path: &Path) -> PathBuf {
    for ancestor in path.ancestors() {
        if let Ok(mut resolved) = ancestor.canonicalize() {
            let rest = path.strip_prefix(ancestor).unwrap_or(Path::new(""));
            for component in rest.components() {
                match component {
                    Component::ParentDir => {
                        resolved.pop();
                    }
                    Component::Normal(part) => resolved.push(part),
                    _ => {}
                }
            }
            return resolved;
        }
    }
    path.to_path_buf()
}
