use std::io;
use std::path::{Path, PathBuf};
use walkdir::{WalkDir, DirEntry};

/// Every regular file below `root`, skipping hidden files and directories.
pub fn scan_directory(root: &Path) -> io::Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root).follow_links(false).into_iter();

    let mut files = Vec::new();
    for entry in walker.filter_entry(|e| e.depth() == 0 || !is_hidden(e)) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name()
         .to_str()
         .map(|s| s.starts_with('.'))
         .unwrap_or(false)
}
