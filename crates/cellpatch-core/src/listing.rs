use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Directory a missing source would have lived in (`.` for a bare name).
pub fn containing_dir(src: &Path) -> PathBuf {
    match src.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Names of the entries directly inside `dir`, sorted.
pub fn list_entries(dir: &Path) -> io::Result<Vec<String>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| io::Error::other(e.to_string()))?;
        out.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(out)
}
