use tracing::warn;

use crate::catalog::CatalogReader;
use crate::error::RequestError;
use crate::http::HttpAdapter;
use crate::manifest::ManifestDeleter;
use crate::models::{Catalog, DeleteOutcome};

/// `repo:tag` row names with their checkbox state, in submission order.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    items: Vec<(String, bool)>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every name selected, e.g. from command-line arguments.
    pub fn all<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .map(|n| (Into::<String>::into(n), true))
            .collect()
    }

    /// Setting an existing name again updates it in place.
    pub fn insert(&mut self, name: impl Into<String>, selected: bool) {
        let name = name.into();
        match self.items.iter_mut().find(|(n, _)| *n == name) {
            Some(item) => item.1 = selected,
            None => self.items.push((name, selected)),
        }
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|(_, selected)| *selected)
            .map(|(name, _)| name.as_str())
    }
}

impl<S: Into<String>> FromIterator<(S, bool)> for Selection {
    fn from_iter<T: IntoIterator<Item = (S, bool)>>(iter: T) -> Self {
        let mut selection = Selection::new();
        for (name, selected) in iter {
            selection.insert(name, selected);
        }
        selection
    }
}

#[derive(Debug)]
pub enum BatchItem {
    /// Row name without a `:` separator.
    Malformed(String),
    Processed { name: String, outcome: DeleteOutcome },
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Confirmation lines, one per deleted manifest, in selection order.
    pub messages: Vec<String>,
    pub items: Vec<BatchItem>,
    /// Catalog fetched after the batch; `None` when nothing was attempted.
    pub catalog: Option<Result<Catalog, RequestError>>,
}

impl BatchReport {
    pub fn failures(&self) -> usize {
        self.items
            .iter()
            .filter(|item| {
                matches!(
                    item,
                    BatchItem::Malformed(_)
                        | BatchItem::Processed {
                            outcome: DeleteOutcome::Failed(_),
                            ..
                        }
                )
            })
            .count()
    }
}

/// Deletes a selection one item at a time; one failure never stops the rest.
pub struct BatchDeleteCoordinator<'a> {
    reader: CatalogReader<'a>,
    deleter: ManifestDeleter<'a>,
}

impl<'a> BatchDeleteCoordinator<'a> {
    pub fn new(http: &'a HttpAdapter) -> Self {
        Self {
            reader: CatalogReader::new(http),
            deleter: ManifestDeleter::new(http),
        }
    }

    pub async fn run(&self, host: &str, selection: &Selection) -> BatchReport {
        let mut report = BatchReport::default();

        for name in selection.selected() {
            let Some((repo, tag)) = name.split_once(':') else {
                warn!(host, name, "selection is not in repo:tag form");
                report.items.push(BatchItem::Malformed(name.to_string()));
                continue;
            };

            let outcome = self.deleter.delete_manifest(host, repo, tag).await;
            if let Some(msg) = outcome.message() {
                report.messages.push(msg);
            }
            if let DeleteOutcome::Failed(e) = &outcome {
                warn!(host, repo, tag, error = %e, "delete failed");
            }
            report.items.push(BatchItem::Processed {
                name: name.to_string(),
                outcome,
            });
        }

        let attempted = report
            .items
            .iter()
            .any(|item| matches!(item, BatchItem::Processed { .. }));
        if attempted {
            report.catalog = Some(self.reader.build_catalog(host).await);
        }

        report
    }
}
