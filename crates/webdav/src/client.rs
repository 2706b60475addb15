use std::time::Duration;

use nav_backup_core::Credentials;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use tracing::debug;

use crate::propfind::{parse_multistatus, PROPFIND_BODY};
use crate::transport::{Connector, RemoteEntry, RemoteTransport, TransportError};

/// WebDAV transport over HTTP basic auth.
pub struct WebDavClient {
    http: reqwest::Client,
    base: Url,
    username: String,
    password: String,
}

impl WebDavClient {
    pub fn new(credentials: &Credentials, timeout: Duration) -> Result<Self, TransportError> {
        let base = Url::parse(&credentials.url).map_err(|e| TransportError::InvalidUrl {
            url: credentials.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl {
                url: credentials.url.clone(),
                reason: format!("unsupported scheme {}", base.scheme()),
            });
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self {
            http,
            base,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        })
    }

    /// Path component of the full URL for a remote path, without trailing slash.
    fn full_path(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(&self.full_path(path));
        url
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.url(path))
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn propfind(&self, path: &str, depth: &'static str) -> Result<reqwest::Response, TransportError> {
        let response = self
            .request(dav_method(b"PROPFIND")?, path)
            .header("Depth", depth)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/xml"))
            .body(PROPFIND_BODY)
            .send()
            .await?;
        Ok(response)
    }
}

fn dav_method(name: &[u8]) -> Result<Method, TransportError> {
    Method::from_bytes(name).map_err(|e| TransportError::Request(e.to_string()))
}

fn check(
    response: reqwest::Response,
    method: &str,
    path: &str,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(TransportError::Status {
        method: method.to_owned(),
        path: path.to_owned(),
        status: status.as_u16(),
    })
}

#[async_trait::async_trait]
impl RemoteTransport for WebDavClient {
    async fn exists(&self, path: &str) -> Result<bool, TransportError> {
        let response = self.propfind(path, "0").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(response, "PROPFIND", path)?;
        Ok(true)
    }

    async fn create_directory(&self, path: &str) -> Result<(), TransportError> {
        let response = self.request(dav_method(b"MKCOL")?, path).send().await?;
        // 405: the collection is already there.
        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            debug!(path, "directory already exists");
            return Ok(());
        }
        check(response, "MKCOL", path)?;
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<RemoteEntry>, TransportError> {
        let response = check(self.propfind(path, "1").await?, "PROPFIND", path)?;
        let body = response.text().await?;
        let own_path = self.full_path(path);
        let own_path = own_path.trim_end_matches('/');

        Ok(parse_multistatus(&body)?
            .into_iter()
            .filter(|entry| {
                let href = match Url::parse(&entry.href) {
                    Ok(url) => url.path().to_owned(),
                    Err(_) => entry.href.clone(),
                };
                href.trim_end_matches('/') != own_path
            })
            .map(|entry| RemoteEntry {
                basename: entry.basename().to_owned(),
                size: entry.size,
                last_modified: entry.last_modified,
                is_dir: entry.is_dir,
            })
            .collect())
    }

    async fn write(
        &self,
        path: &str,
        content: Vec<u8>,
        overwrite: bool,
    ) -> Result<(), TransportError> {
        let mut request = self.request(Method::PUT, path).body(content);
        if !overwrite {
            request = request.header("If-None-Match", "*");
        }
        check(request.send().await?, "PUT", path)?;
        Ok(())
    }

    async fn read_text(&self, path: &str) -> Result<String, TransportError> {
        let response = check(self.request(Method::GET, path).send().await?, "GET", path)?;
        Ok(response.text().await?)
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        check(
            self.request(Method::DELETE, path).send().await?,
            "DELETE",
            path,
        )?;
        Ok(())
    }
}

/// Builds a [`WebDavClient`] per session.
#[derive(Debug, Clone)]
pub struct WebDavConnector {
    timeout: Duration,
}

impl WebDavConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for WebDavConnector {
    fn connect(&self, credentials: &Credentials) -> Result<Box<dyn RemoteTransport>, TransportError> {
        Ok(Box::new(WebDavClient::new(credentials, self.timeout)?))
    }
}
