use crate::error::{ParserError, Result};

/// Languages the bundled parse adapter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Python,
}

impl Language {
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let extension = path.rsplit('.').next()?;
        match extension {
            "rs" => Some(Self::Rust),
            "py" => Some(Self::Python),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
        }
    }

    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        let language: tree_sitter::Language = match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
        };
        Ok(language)
    }

    /// Node kinds that count as decision points for cyclomatic complexity.
    #[must_use]
    pub const fn decision_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &[
                "if_expression",
                "while_expression",
                "for_expression",
                "loop_expression",
                "match_arm",
            ],
            Self::Python => &[
                "if_statement",
                "for_statement",
                "while_statement",
                "except_clause",
                "boolean_operator",
            ],
        }
    }
}

impl std::str::FromStr for Language {
    type Err = ParserError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "rust" => Ok(Self::Rust),
            "python" => Ok(Self::Python),
            other => Err(ParserError::UnsupportedLanguage(other.to_string())),
        }
    }
}
