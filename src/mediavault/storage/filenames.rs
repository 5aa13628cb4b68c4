use std::path::{Path, PathBuf};

use url::Url;

use crate::mediavault::error::{MediavaultError, Result};

/// Inserted before the extension of a source filename to name its thumbnail.
pub const THUMBNAIL_SUFFIX: &str = "-thumbnail";

/// Last path component of a `file://` URL.
pub fn file_name_of(url: &Url) -> Option<String> {
    let path = url.to_file_path().ok()?;
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// Converts an absolute path to a `file://` URL.
pub fn file_url(path: &Path) -> Result<Url> {
    Url::from_file_path(path)
        .map_err(|_| MediavaultError::InvalidMediaUrl(path.display().to_string()))
}

/// Desired filename before any collision search.
///
/// With an extension the base name loses its own extension, is lower-cased,
/// and gets `extension` appended. Without one the name is used as given.
pub fn normalized_filename(filename: &str, extension: Option<&str>) -> String {
    match extension {
        Some(extension) => {
            let stem = Path::new(filename)
                .file_stem()
                .map(|stem| stem.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            format!("{stem}.{extension}")
        }
        None => filename.to_string(),
    }
}

/// Splits `name` into base and extension (extension without the dot).
fn split_extension(name: &str) -> (&str, Option<&str>) {
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(_), Some(extension)) => {
            let extension = extension.to_str().unwrap_or_default();
            let base = &name[..name.len() - extension.len() - 1];
            (base, Some(extension))
        }
        _ => (name, None),
    }
}

fn with_counter(name: &str, counter: u64) -> String {
    match split_extension(name) {
        (base, Some(extension)) => format!("{base}-{counter}.{extension}"),
        (base, None) => format!("{base}-{counter}"),
    }
}

/// First free candidate for `filename` in `directory`: the name itself, then
/// `<base>-1.<ext>`, `<base>-2.<ext>` and so on until `is_taken` says no.
pub fn incremental_path<F>(directory: &Path, filename: &str, is_taken: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    let mut candidate = directory.join(filename);
    let mut counter: u64 = 0;
    while is_taken(&candidate) {
        counter += 1;
        candidate = directory.join(with_counter(filename, counter));
    }
    candidate
}

/// Collision-free path for a new file in `directory`.
///
/// Only checks the filesystem, so two callers racing on the same name may get
/// the same answer. Route writes through [`super::allocator::AllocationQueue`]
/// when that matters.
pub fn allocate_path(directory: &Path, filename: &str, extension: Option<&str>) -> PathBuf {
    let desired = normalized_filename(filename, extension);
    incremental_path(directory, &desired, |candidate| candidate.exists())
}

/// [`allocate_path`] as a `file://` URL. `directory` must be absolute.
pub fn allocate_url(directory: &Path, filename: &str, extension: Option<&str>) -> Result<Url> {
    file_url(&allocate_path(directory, filename, extension))
}

/// `a.jpg` becomes `a-thumbnail.jpg`. No collision search: thumbnails pair
/// one-to-one with their source file.
pub fn thumbnail_filename(filename: &str) -> String {
    match split_extension(filename) {
        (base, Some(extension)) => format!("{base}{THUMBNAIL_SUFFIX}.{extension}"),
        (base, None) => format!("{base}{THUMBNAIL_SUFFIX}"),
    }
}

/// Sibling thumbnail URL for a local media file URL.
pub fn thumbnail_url(url: &Url) -> Result<Url> {
    let path = url
        .to_file_path()
        .map_err(|_| MediavaultError::InvalidMediaUrl(url.to_string()))?;
    let name = file_name_of(url).ok_or_else(|| MediavaultError::InvalidMediaUrl(url.to_string()))?;
    file_url(&path.with_file_name(thumbnail_filename(&name)))
}
