use std::collections::HashSet;

use reqwest::header::{HeaderMap, LINK};
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::error::RequestError;
use crate::http::HttpAdapter;
use crate::models::{Catalog, CatalogResponse, TagList};

/// Upper bound on pages followed for a single listing.
const MAX_PAGES: usize = 1000;

/// Reads repositories and tags from a registry host.
pub struct CatalogReader<'a> {
    http: &'a HttpAdapter,
}

impl<'a> CatalogReader<'a> {
    pub fn new(http: &'a HttpAdapter) -> Self {
        Self { http }
    }

    /// GET /v2/_catalog, following pagination
    pub async fn list_repositories(&self, host: &str) -> Result<Vec<String>, RequestError> {
        let mut repos = Vec::new();
        let mut url = format!("{}/v2/_catalog", host);
        let mut visited = HashSet::from([url.clone()]);

        loop {
            let resp = self
                .http
                .execute(Method::GET, &url, StatusCode::OK, HeaderMap::new())
                .await?;

            let next_link = parse_next_link(&resp);

            let catalog: CatalogResponse = resp.json().await?;
            repos.extend(catalog.repositories);

            match next_page(host, &mut visited, next_link) {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(repos)
    }

    /// GET /v2/<repo>/tags/list, following pagination
    pub async fn list_tags(&self, host: &str, repo: &str) -> Result<Vec<String>, RequestError> {
        let mut tags = Vec::new();
        let mut url = format!("{}/v2/{}/tags/list", host, repo);
        let mut visited = HashSet::from([url.clone()]);

        loop {
            let resp = self
                .http
                .execute(Method::GET, &url, StatusCode::OK, HeaderMap::new())
                .await?;

            let next_link = parse_next_link(&resp);

            let tag_list: TagList = resp.json().await?;
            if let Some(t) = tag_list.tags {
                tags.extend(t);
            }

            match next_page(host, &mut visited, next_link) {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(tags)
    }

    /// Catalog plus the tag list of every repository in it.
    ///
    /// A repository whose tags cannot be listed stays in the catalog with
    /// `None` so it is left out of the rows.
    pub async fn build_catalog(&self, host: &str) -> Result<Catalog, RequestError> {
        let repos = self.list_repositories(host).await?;
        debug!(host, count = repos.len(), "listed repositories");

        let mut catalog = Catalog::new(host);
        for repo in repos {
            let tags = match self.list_tags(host, &repo).await {
                Ok(tags) => Some(tags),
                Err(e) => {
                    warn!(host, repo = %repo, error = %e, "failed to list tags");
                    None
                }
            };
            catalog.entries.push((repo, tags));
        }

        Ok(catalog)
    }
}

/// Parse the Link header for pagination (next URL)
fn parse_next_link(resp: &reqwest::Response) -> Option<String> {
    let link = resp.headers().get(LINK)?.to_str().ok()?;
    next_link(link)
}

/// Target of the `rel="next"` entry of a Link header value, e.g.
/// `</v2/_catalog?n=100&last=xxx>; rel="next"`. Anything malformed yields `None`.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let (target, params) = entry.trim().split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let target = target.trim().strip_prefix('<')?;
        let end = target.find('>')?;
        let url = &target[..end];
        (!url.is_empty()).then(|| url.to_string())
    })
}

/// Resolves the next page and stops on a repeated URL or past `MAX_PAGES`.
fn next_page(host: &str, visited: &mut HashSet<String>, next: Option<String>) -> Option<String> {
    let url = resolve_url(host, &next?);
    if visited.len() >= MAX_PAGES {
        warn!(host, pages = visited.len(), "pagination limit reached");
        return None;
    }
    if !visited.insert(url.clone()) {
        warn!(host, url = %url, "pagination link repeats a fetched page");
        return None;
    }
    Some(url)
}

fn resolve_url(host: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{}{}", host, path)
    }
}
