use std::fs;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use ignore::Walk;
use tracing::{debug, warn};

use crate::error::UploadError;

use super::types::SelectedFile;

const NAME_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

pub fn describe(path: &Path) -> Result<SelectedFile, UploadError> {
    let metadata = fs::metadata(path).map_err(|source| UploadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(SelectedFile {
        path: path.to_path_buf(),
        name,
        size_bytes: metadata.len(),
    })
}

/// Describes explicitly picked files. Unreadable paths are returned as errors
/// next to the files that could be described.
pub fn select_paths(paths: Vec<PathBuf>) -> (Vec<SelectedFile>, Vec<UploadError>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();
    for path in paths {
        match describe(&path) {
            Ok(file) => files.push(file),
            Err(e) => {
                warn!("{}", e);
                errors.push(e);
            }
        }
    }
    (files, errors)
}

/// Walks `folder` (honouring ignore files) and picks every file whose name
/// matches `pattern`, case-insensitively, sorted by path.
pub fn collect_folder(folder: &Path, pattern: &Pattern) -> Vec<SelectedFile> {
    let mut paths: Vec<PathBuf> = Walk::new(folder)
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.into_path()),
            Err(e) => {
                warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |name| pattern.matches_with(name, NAME_MATCH))
        })
        .collect();
    paths.sort();

    debug!(
        "found {} files matching {} under {}",
        paths.len(),
        pattern,
        folder.display()
    );

    let (files, _) = select_paths(paths);
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn describe_reads_name_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("math.csv");
        touch(&path, "student_id,student_name,subject,grade\n");

        let file = describe(&path).unwrap();
        assert_eq!(file.name, "math.csv");
        assert_eq!(file.size_bytes, 38);
    }

    #[test]
    fn select_paths_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.csv");
        touch(&present, "x");

        let (files, errors) = select_paths(vec![present, dir.path().join("gone.csv")]);
        assert_eq!(files.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], UploadError::Io { .. }));
    }

    #[test]
    fn collect_folder_filters_by_pattern() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.csv"), "1");
        touch(&dir.path().join("A.CSV"), "1");
        touch(&dir.path().join("notes.txt"), "1");
        touch(&dir.path().join("term2").join("c.csv"), "1");

        let pattern = Pattern::new("*.csv").unwrap();
        let names: Vec<String> = collect_folder(dir.path(), &pattern)
            .into_iter()
            .map(|f| f.name)
            .collect();

        assert_eq!(names, vec!["A.CSV", "b.csv", "c.csv"]);
    }
}
