use serde::{Deserialize, Serialize};

/// Provenance record attached to an assistant turn that used retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Name of the knowledge-base document.
    pub filename: String,

    /// Page within the document.
    pub page: i64,
}

impl Source {
    /// Creates a new source record.
    pub fn new(filename: impl Into<String>, page: i64) -> Self {
        Self {
            filename: filename.into(),
            page,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (p. {})", self.filename, self.page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialization() {
        let source: Source =
            serde_json::from_str(r#"{"filename": "manual.pdf", "page": 12}"#).unwrap();
        assert_eq!(source, Source::new("manual.pdf", 12));
        assert_eq!(source.to_string(), "manual.pdf (p. 12)");
    }
}
