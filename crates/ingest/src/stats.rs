use serde::Serialize;
use std::collections::HashMap;

/// Genesis-scan statistics, reported to the caller and logged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub files: usize,
    pub lines: usize,
    pub nodes: usize,
    pub unparsable: usize,
    pub by_language: HashMap<String, usize>,
    pub errors: Vec<String>,
    /// True when the wall-clock budget expired before every file was
    /// ingested; the committed prefix is still a consistent graph.
    pub partial: bool,
    pub time_ms: u64,
}

impl ScanStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, language: &str, lines: usize, nodes: usize) {
        self.files += 1;
        self.lines += lines;
        self.nodes += nodes;
        *self.by_language.entry(language.to_string()).or_insert(0) += 1;
    }

    pub fn add_unparsable(&mut self) {
        self.unparsable += 1;
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }
}
