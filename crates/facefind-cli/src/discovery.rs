use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Extensions picked up from the input folder (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Dot-files and dot-directories, e.g. `.thumb.jpg` or macOS `._IMG_1004.JPG`.
fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// List image files in `directory`, sorted by path.
///
/// Only the folder itself is searched unless `recursive` is set. Hidden
/// entries are skipped. Symlinks to files are listed; symlinked
/// directories are not descended into.
pub fn discover_images(directory: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        bail!("input folder not found: {}", directory.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut images: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(false)
        .min_depth(1)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        // path().is_file() follows symlinks, file_type() does not
        .filter(|entry| entry.path().is_file() && is_image(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    images.sort();
    Ok(images)
}
