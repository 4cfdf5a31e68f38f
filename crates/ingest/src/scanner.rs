use advisor_parser::Language;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Directory names never worth descending into.
pub const IGNORED_SCOPES: &[&str] = &[
    ".git",
    ".venv",
    "venv",
    "node_modules",
    "__pycache__",
    ".pytest_cache",
    "target",
    "dist",
    "build",
];

const MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;

/// Scanner for source files eligible for ingestion (.gitignore aware).
pub struct FileScanner {
    root: PathBuf,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// All parseable source files under the root, sorted for
    /// deterministic scan order.
    #[must_use]
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let root = self.root.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true);
        builder.filter_entry(move |entry| !is_ignored_scope(entry.path(), &root));

        for result in builder.build() {
            let Ok(entry) = result else {
                continue;
            };
            let Some(file_type) = entry.file_type() else {
                continue;
            };
            if !file_type.is_file() {
                continue;
            }

            let path = entry.path();
            if let Ok(meta) = entry.metadata() {
                if meta.len() > MAX_FILE_SIZE_BYTES {
                    log::debug!("Skipping large file {}", path.display());
                    continue;
                }
            }
            if Language::from_path(&path.to_string_lossy()).is_none() {
                continue;
            }
            files.push(path.to_path_buf());
        }

        files.sort();
        files
    }
}

fn is_ignored_scope(path: &Path, root: &Path) -> bool {
    if path == root {
        return false;
    }
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative.components().any(|component| {
        if let std::path::Component::Normal(name) = component {
            let lowered = name.to_string_lossy().to_lowercase();
            IGNORED_SCOPES.iter().any(|ignored| *ignored == lowered)
        } else {
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scan_finds_sources_and_skips_ignored_scopes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules/pkg")).unwrap();
        std::fs::write(dir.path().join("src/app.py"), "x = 1\n").unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn a() {}\n").unwrap();
        std::fs::write(dir.path().join("src/notes.txt"), "skip me\n").unwrap();
        std::fs::write(dir.path().join("node_modules/pkg/index.py"), "x = 1\n").unwrap();

        let files = FileScanner::new(dir.path()).scan();
        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(names, vec!["src/app.py".to_string(), "src/lib.rs".to_string()]);
    }
}
