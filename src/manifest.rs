use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, StatusCode};
use tracing::{debug, info};

use crate::error::RequestError;
use crate::http::HttpAdapter;
use crate::models::DeleteOutcome;

/// Without this Accept header registries hand back the schema1 digest,
/// which cannot be used for deletion.
pub const MANIFEST_V2_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

pub struct ManifestDeleter<'a> {
    http: &'a HttpAdapter,
}

impl<'a> ManifestDeleter<'a> {
    pub fn new(http: &'a HttpAdapter) -> Self {
        Self { http }
    }

    /// HEAD /v2/<repo>/manifests/<tag> — extract Docker-Content-Digest header
    pub async fn resolve_digest(
        &self,
        host: &str,
        repo: &str,
        tag: &str,
    ) -> Result<String, RequestError> {
        let url = format!("{}/v2/{}/manifests/{}", host, repo, tag);
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MANIFEST_V2_MEDIA_TYPE));

        let resp = self
            .http
            .execute(Method::HEAD, &url, StatusCode::OK, headers)
            .await?;

        resp.headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                RequestError::NotFound(format!("{} header for {}:{}", CONTENT_DIGEST_HEADER, repo, tag))
            })
    }

    /// Resolve the tag's current digest, then DELETE /v2/<repo>/manifests/<digest>.
    ///
    /// The digest is always fetched fresh; tags move, digests do not.
    pub async fn delete_manifest(&self, host: &str, repo: &str, tag: &str) -> DeleteOutcome {
        let digest = match self.resolve_digest(host, repo, tag).await {
            Ok(digest) => digest,
            Err(e) if e.is_not_found() => {
                debug!(host, repo, tag, "tag does not resolve, nothing to delete");
                return DeleteOutcome::NothingToDelete;
            }
            Err(e) => return DeleteOutcome::Failed(e),
        };

        let url = format!("{}/v2/{}/manifests/{}", host, repo, digest);
        match self
            .http
            .execute(Method::DELETE, &url, StatusCode::ACCEPTED, HeaderMap::new())
            .await
        {
            Ok(_) => {
                info!(host, repo, tag, digest = %digest, "manifest deleted");
                DeleteOutcome::Deleted {
                    repository: repo.to_string(),
                    tag: tag.to_string(),
                    digest,
                }
            }
            Err(e) => DeleteOutcome::Failed(e),
        }
    }
}
