//! Artifact fetching from declared repositories.

use crate::error::ResolutionError;
use crate::resolver::{Coordinate, RepositoryDescriptor};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Fetches artifact bytes for a coordinate from one repository.
///
/// `Ok(None)` means the repository does not have the artifact, so resolution moves on to the
/// next repository. `Err` means the repository could not be consulted.
pub trait ArtifactFetcher: Send + Sync {
    fn fetch(
        &self,
        repository: &RepositoryDescriptor,
        coordinate: &Coordinate,
    ) -> Result<Option<Vec<u8>>, ResolutionError>;
}

const REPOSITORY_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REPOSITORY_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetcher for `http(s)://` and `file:` repositories using the Maven-style layout.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ResolutionError> {
        let client = Client::builder()
            .connect_timeout(REPOSITORY_HTTP_CONNECT_TIMEOUT)
            .timeout(REPOSITORY_HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ResolutionError::Client(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    fn fetch_local(
        &self,
        repository: &RepositoryDescriptor,
        coordinate: &Coordinate,
    ) -> Result<Option<Vec<u8>>, ResolutionError> {
        let Some(root) = repository.local_path() else {
            return Ok(None);
        };
        let path = root.join(coordinate.relative_path());
        if !path.is_file() {
            return Ok(None);
        }
        std::fs::read(&path)
            .map(Some)
            .map_err(|e| ResolutionError::Fetch {
                coordinate: coordinate.clone(),
                repository: repository.id.clone(),
                message: format!("Failed to read {}: {}", path.display(), e),
            })
    }

    fn fetch_remote(
        &self,
        repository: &RepositoryDescriptor,
        coordinate: &Coordinate,
    ) -> Result<Option<Vec<u8>>, ResolutionError> {
        let url = artifact_url(&repository.address, coordinate);
        debug!(url = %url, repository = %repository.id, "Fetching artifact");
        let fetch_err = |message: String| ResolutionError::Fetch {
            coordinate: coordinate.clone(),
            repository: repository.id.clone(),
            message,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| fetch_err(map_http_error(&e)))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .bytes()
                .map(|b| Some(b.to_vec()))
                .map_err(|e| fetch_err(map_http_error(&e))),
            status => Err(fetch_err(format!("Request for {} failed with status {}", url, status))),
        }
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch(
        &self,
        repository: &RepositoryDescriptor,
        coordinate: &Coordinate,
    ) -> Result<Option<Vec<u8>>, ResolutionError> {
        if repository.local_path().is_some() {
            self.fetch_local(repository, coordinate)
        } else {
            self.fetch_remote(repository, coordinate)
        }
    }
}

/// Full artifact URL below a repository base address.
pub fn artifact_url(base: &str, coordinate: &Coordinate) -> String {
    format!("{}/{}", base.trim_end_matches('/'), coordinate.url_path())
}

fn map_http_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("Request timeout: {}", error)
    } else if error.is_connect() {
        format!("Connection error: {}", error)
    } else {
        format!("HTTP error: {}", error)
    }
}
