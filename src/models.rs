use serde::Deserialize;

/// GET /v2/_catalog response
#[derive(Debug, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub repositories: Vec<String>,
}

/// GET /v2/<repo>/tags/list response
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct TagList {
    pub name: String,
    pub tags: Option<Vec<String>>,
}

/// Repository -> tags for one host, in catalog order.
///
/// `None` marks a repository whose tag list could not be fetched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    pub host: String,
    pub entries: Vec<(String, Option<Vec<String>>)>,
}

impl Catalog {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            entries: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn tags(&self, repo: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == repo)
            .and_then(|(_, tags)| tags.as_deref())
    }

    /// `repo:tag` row names; repositories without a tag list are skipped.
    pub fn rows(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|(repo, tags)| tags.as_ref().map(|t| (repo, t)))
            .flat_map(|(repo, tags)| tags.iter().map(move |tag| format!("{}:{}", repo, tag)))
            .collect()
    }
}

/// Result of deleting one repo:tag.
#[derive(Debug)]
pub enum DeleteOutcome {
    Deleted {
        repository: String,
        tag: String,
        digest: String,
    },
    /// The tag no longer resolves to a digest.
    NothingToDelete,
    Failed(crate::error::RequestError),
}

impl DeleteOutcome {
    /// Confirmation line for the result log; only successful deletes have one.
    pub fn message(&self) -> Option<String> {
        match self {
            DeleteOutcome::Deleted {
                repository,
                tag,
                digest,
            } => Some(format!("[DEL][{}:{}] {}", repository, tag, digest)),
            _ => None,
        }
    }
}
