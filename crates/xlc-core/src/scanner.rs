//! Directory scanner for discovering workbook files

use crate::error::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions recognized as workbooks
pub const WORKBOOK_EXTENSIONS: &[&str] = &["csv", "json"];

/// Recursively collect workbook files under `root`, sorted by path.
///
/// Editor lock files (`~$name.csv`) are skipped.
pub fn scan_directory<P: AsRef<Path>>(root: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root.as_ref()).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_workbook(path) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Whether a path names a workbook this compiler reads
pub fn is_workbook(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if file_name.starts_with("~$") {
        return false;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_workbook() {
        assert!(is_workbook(Path::new("data/Item.csv")));
        assert!(is_workbook(Path::new("data/Book.JSON")));
        assert!(!is_workbook(Path::new("data/~$Item.csv")));
        assert!(!is_workbook(Path::new("data/types.yaml")));
        assert!(!is_workbook(Path::new("data/README")));
    }

    #[test]
    fn test_scan_directory_sorted_and_recursive() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.csv"), "").unwrap();
        fs::write(dir.path().join("a.json"), "").unwrap();
        fs::write(dir.path().join("sub").join("c.csv"), "").unwrap();
        fs::write(dir.path().join("~$b.csv"), "").unwrap();
        fs::write(dir.path().join("types.yaml"), "").unwrap();

        let files = scan_directory(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.json"),
                PathBuf::from("b.csv"),
                PathBuf::from("sub").join("c.csv"),
            ]
        );
    }

    #[test]
    fn test_scan_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_directory(dir.path().join("missing")).is_err());
    }
}
