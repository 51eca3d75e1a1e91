//! Source tree walk: regular files only, depth-first, sorted by name

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Version control metadata directories, never descended into
const VCS_DIRS: &[&str] = &[".hg", ".git", ".svn", ".bzr"];

/// Files skipped by name
const SKIPPED_FILES: &[&str] = &[".DS_Store"];

/// A regular file of the tree
#[derive(Debug, Clone)]
pub struct TreeFile {
    pub file_name: String,
    /// Relative to the tree root, `/`-separated
    pub path_in_tree: String,
    pub absolute_path: PathBuf,
}

fn is_vcs_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .map(|name| VCS_DIRS.contains(&name))
            .unwrap_or(false)
}

/// Regular files under `root`. Symbolic links are reported by walkdir with
/// their own file type and are skipped, never followed.
pub fn tree_files(root: &Path) -> impl Iterator<Item = TreeFile> + '_ {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_vcs_dir(e))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!("Skipping unreadable entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter_map(move |entry| {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if SKIPPED_FILES.contains(&file_name.as_str()) {
                return None;
            }
            let path_in_tree = entry
                .path()
                .strip_prefix(root)
                .ok()?
                .to_string_lossy()
                .replace('\\', "/");
            Some(TreeFile {
                file_name,
                path_in_tree,
                absolute_path: entry.into_path(),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_skips_vcs_metadata_and_ds_store() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::create_dir_all(dir.path().join("app/src")).unwrap();
        fs::write(dir.path().join(".git/objects/blob"), "x").unwrap();
        fs::write(dir.path().join(".DS_Store"), "x").unwrap();
        fs::write(dir.path().join("app/src/Main.java"), "x").unwrap();
        fs::write(dir.path().join("build.gradle"), "x").unwrap();

        let paths: Vec<String> = tree_files(dir.path()).map(|f| f.path_in_tree).collect();
        assert_eq!(paths, vec!["app/src/Main.java", "build.gradle"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("libevil.so"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("libevil.so"),
            dir.path().join("libalias.so"),
        )
        .unwrap();

        assert_eq!(tree_files(dir.path()).count(), 0);
    }
}
