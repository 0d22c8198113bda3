use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;

use crate::{error::Rejection, validate::NormalizedRequest};

const SAMPLE_TITLE: &str = "Sample Video Title";
const SAMPLE_THUMBNAIL: &str = "https://via.placeholder.com/480x270.png?text=Video+Thumbnail";
const SAMPLE_DURATION: &str = "3:45";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOption {
    pub label: String,
    pub url: String,
    pub quality_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail_url: String,
    pub duration_label: String,
    pub formats: Vec<FormatOption>,
    pub download_url: String,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct LookupError(pub String);

/// Source of title, thumbnail and format information for a validated URL.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn lookup(&self, request: &NormalizedRequest) -> Result<MediaInfo, LookupError>;
}

/// Returns fixed placeholder metadata. Nothing is fetched; the download links
/// point at the local download notice.
#[derive(Debug, Clone)]
pub struct SimulatedLookup {
    download_base_path: String,
}

impl SimulatedLookup {
    pub fn new(download_base_path: impl Into<String>) -> Self {
        Self {
            download_base_path: download_base_path.into(),
        }
    }

    fn download_link(&self, format: &str, source: &str) -> String {
        format!(
            "{}?format={format}&url={}",
            self.download_base_path,
            urlencoding::encode(source)
        )
    }
}

#[async_trait]
impl MetadataLookup for SimulatedLookup {
    async fn lookup(&self, request: &NormalizedRequest) -> Result<MediaInfo, LookupError> {
        let source = request.url.as_str();
        let formats = vec![
            FormatOption {
                label: "MP4 (720p)".to_string(),
                url: self.download_link("mp4", source),
                quality_tag: "720p".to_string(),
            },
            FormatOption {
                label: "MP3 (Audio Only)".to_string(),
                url: self.download_link("mp3", source),
                quality_tag: "audio".to_string(),
            },
        ];
        let download_url = formats[0].url.clone();

        Ok(MediaInfo {
            title: SAMPLE_TITLE.to_string(),
            thumbnail_url: SAMPLE_THUMBNAIL.to_string(),
            duration_label: SAMPLE_DURATION.to_string(),
            formats,
            download_url,
        })
    }
}

/// Calls the collaborator under `limit` and folds every failure, including an
/// empty format list, into `Rejection::LookupFailed`.
pub async fn fetch_media_info(
    lookup: &dyn MetadataLookup,
    request: &NormalizedRequest,
    limit: Duration,
) -> Result<MediaInfo, Rejection> {
    let info = match timeout(limit, lookup.lookup(request)).await {
        Ok(Ok(info)) => info,
        Ok(Err(error)) => {
            warn!("Metadata lookup failed for {}: {error}", request.url);
            return Err(Rejection::LookupFailed(error.to_string()));
        }
        Err(_) => {
            warn!(
                "Metadata lookup for {} exceeded {}s",
                request.url,
                limit.as_secs_f32()
            );
            return Err(Rejection::LookupFailed("timed out".to_string()));
        }
    };

    if info.formats.is_empty() {
        warn!("Metadata lookup for {} returned no formats", request.url);
        return Err(Rejection::LookupFailed("no formats available".to_string()));
    }

    Ok(info)
}
