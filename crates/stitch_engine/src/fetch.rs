//! Downloads of the images and fonts a page references, for inlining.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as Base64, Engine as _};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_TYPE, REFERER};
use reqwest::{Client, Response, Url};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    /// Accepted content types, matched as prefixes (`image/` accepts every image type).
    pub allowed_content_types: Vec<String>,
    /// Sent as `Referer`; image hosts of reader sites commonly refuse requests without one.
    pub referer: Option<String>,
    pub user_agent: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 10 * 1024 * 1024,
            allowed_content_types: vec![
                "image/".to_string(),
                "font/".to_string(),
                "application/octet-stream".to_string(),
            ],
            referer: None,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    /// The URL as requested.
    pub url: String,
    pub final_url: String,
    pub redirects: usize,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    #[error("invalid url")]
    InvalidUrl,
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("timeout")]
    Timeout,
    #[error("redirect limit exceeded")]
    RedirectLimitExceeded,
    #[error("response too large (max {max_bytes}, actual {actual:?})")]
    TooLarge { max_bytes: u64, actual: Option<u64> },
    #[error("unsupported content type {content_type}")]
    UnsupportedContentType { content_type: String },
    #[error("network error")]
    Network,
}

/// Fetches binary assets referenced by page fragments.
#[async_trait::async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAssetFetcher {
    settings: FetchSettings,
}

impl ReqwestAssetFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    /// A client per request: the redirect policy reports into `redirects`.
    fn client(&self, redirects: Arc<AtomicUsize>) -> Result<Client, FetchError> {
        let limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let seen = attempt.previous().len();
            redirects.store(seen, Ordering::Relaxed);
            if seen >= limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });
        let builder = Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(policy);
        let builder = match &self.settings.user_agent {
            Some(agent) => builder.user_agent(agent.clone()),
            None => builder,
        };
        builder
            .build()
            .map_err(|err| FetchError::new(FailureKind::Network, err.to_string()))
    }

    fn accepts(&self, content_type: &str) -> bool {
        let essence = mime_essence(content_type);
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| essence.starts_with(&allowed.to_ascii_lowercase()))
    }

    /// Status, declared length and content type, before any body is read.
    fn check_headers(&self, response: &Response) -> Result<Option<String>, FetchError> {
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        let max_bytes = self.settings.max_bytes;
        if let Some(declared) = response.content_length().filter(|len| *len > max_bytes) {
            return Err(too_large(max_bytes, declared));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        match content_type {
            Some(ct) if !self.accepts(&ct) => Err(FetchError::new(
                FailureKind::UnsupportedContentType { content_type: ct },
                "not an image or font",
            )),
            other => Ok(other),
        }
    }
}

#[async_trait::async_trait]
impl AssetFetcher for ReqwestAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        let target = Url::parse(url)
            .map_err(|err| FetchError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let redirects = Arc::new(AtomicUsize::new(0));

        let mut request = self.client(redirects.clone())?.get(target);
        if let Some(referer) = &self.settings.referer {
            request = request.header(REFERER, referer.as_str());
        }
        let response = request.send().await.map_err(classify)?;

        let content_type = self.check_headers(&response)?;
        let final_url = response.url().to_string();
        let bytes = read_capped(response, self.settings.max_bytes).await?;

        Ok(FetchOutput {
            bytes,
            metadata: FetchMetadata {
                url: url.to_string(),
                final_url,
                redirects: redirects.load(Ordering::Relaxed),
                content_type,
            },
        })
    }
}

/// Stream the body, giving up as soon as it passes `max_bytes`.
async fn read_capped(response: Response, max_bytes: u64) -> Result<Vec<u8>, FetchError> {
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(classify)?;
        let len = (bytes.len() + chunk.len()) as u64;
        if len > max_bytes {
            return Err(too_large(max_bytes, len));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn too_large(max_bytes: u64, actual: u64) -> FetchError {
    FetchError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "asset exceeds the size limit",
    )
}

fn classify(err: reqwest::Error) -> FetchError {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_redirect() {
        FailureKind::RedirectLimitExceeded
    } else {
        FailureKind::Network
    };
    FetchError::new(kind, err.to_string())
}

/// `image/png; charset=binary` -> `image/png`.
fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Encode a fetched asset as a `data:` URL.
///
/// The response's content type wins; without one the type is guessed from the
/// URL's extension.
pub fn to_data_url(output: &FetchOutput) -> String {
    let mime = output
        .metadata
        .content_type
        .as_deref()
        .map(mime_essence)
        .filter(|mime| !mime.is_empty())
        .unwrap_or_else(|| guess_mime(&output.metadata.url).to_string());
    format!("data:{mime};base64,{}", Base64.encode(&output.bytes))
}

fn guess_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(url: &str, content_type: Option<&str>, bytes: &[u8]) -> FetchOutput {
        FetchOutput {
            bytes: bytes.to_vec(),
            metadata: FetchMetadata {
                url: url.to_string(),
                final_url: url.to_string(),
                redirects: 0,
                content_type: content_type.map(str::to_string),
            },
        }
    }

    #[test]
    fn data_url_uses_header_type() {
        let out = output("https://x/a.bin", Some("image/png; charset=binary"), b"abc");
        assert_eq!(to_data_url(&out), "data:image/png;base64,YWJj");
    }

    #[test]
    fn data_url_guesses_from_extension() {
        let out = output("https://x/pic.JPG?v=2", None, b"abc");
        assert_eq!(to_data_url(&out), "data:image/jpeg;base64,YWJj");
        let out = output("https://x/blob", None, b"");
        assert_eq!(to_data_url(&out), "data:application/octet-stream;base64,");
    }

    #[test]
    fn content_type_prefixes_match() {
        let fetcher = ReqwestAssetFetcher::new(FetchSettings::default());
        assert!(fetcher.accepts("image/webp"));
        assert!(fetcher.accepts("IMAGE/PNG; q=1"));
        assert!(!fetcher.accepts("text/html"));
    }

    #[test]
    fn failures_describe_themselves() {
        let err = too_large(10, 11);
        assert_eq!(
            err.to_string(),
            "response too large (max 10, actual Some(11)): asset exceeds the size limit"
        );
    }
}
