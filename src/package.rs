//! Zip packaging of the output tree.

use crate::error::{DishGenError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Path of the archive written for `root`: `<root>.zip` beside it.
pub fn archive_path(root: &Path) -> PathBuf {
    let mut path = root.as_os_str().to_owned();
    path.push(".zip");
    PathBuf::from(path)
}

/// Archives every file under `root` into `<root>.zip`, replacing any existing
/// archive. Entry names are relative to `root` and use `/` separators.
pub fn archive_dir(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(DishGenError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        )));
    }

    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let target = archive_path(root);
    let mut zip = ZipWriter::new(BufWriter::new(File::create(&target)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in &files {
        let name = entry_name(root, file)?;
        zip.start_file(name, options)?;
        zip.write_all(&std::fs::read(file)?)?;
    }
    zip.finish()?.flush()?;

    tracing::info!(archive = %target.display(), files = files.len(), "archive written");
    Ok(target)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn entry_name(root: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| {
        DishGenError::Io(std::io::Error::other(format!(
            "{} is outside {}",
            file.display(),
            root.display()
        )))
    })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
