//! Publication change feed and text extraction collaborators.
//!
//! The ingestion pipeline pulls a paginated change feed of open council
//! items from an external publication API, keyed by an opaque cursor and a
//! per-item version. Items either carry inline text or reference an
//! attachment that needs a separate fetch plus text extraction (OCR is a
//! drop-in [`TextExtractor`] implementation outside this crate).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

use crate::config::FeedConfig;
use crate::error::{Error, Result};
use crate::models::{SourceDocument, SourceType};

/// One page of the publication change feed.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    /// Opaque cursor for the next page; `None` when the feed is drained.
    pub next_cursor: Option<String>,
}

/// A changed council item as reported by the publication API.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub committee: String,
    pub case_number: String,
    pub source_type: String,
    pub published_at: DateTime<Utc>,
    pub version: u64,
    /// Inline text, when the item carries it directly.
    #[serde(default)]
    pub body: Option<String>,
    /// Reference to a document/attachment requiring a separate fetch.
    #[serde(default)]
    pub attachment: Option<AttachmentRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentRef {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Pull-based change feed over open (non-restricted) council items.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Fetch one page of changes after `cursor`. Transient failures are
    /// reported as [`Error::TransientSource`] so the pipeline retries them.
    async fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage>;
}

/// Pluggable text extraction for fetched attachments.
///
/// The core never interprets attachment bytes itself; an OCR-backed
/// implementation can replace [`PlainTextExtractor`] without touching the
/// pipeline.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, attachment: &AttachmentRef) -> Result<String>;
}

// ============ HTTP change feed ============

#[derive(Debug, Deserialize)]
struct FeedResponse {
    items: Vec<FeedItem>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Change feed client for `GET {base_url}/changes?cursor=…&limit=…`.
pub struct HttpChangeFeed {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl HttpChangeFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::TransientSource(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl ChangeFeed for HttpChangeFeed {
    async fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> Result<FeedPage> {
        let url = format!("{}/changes", self.base_url);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.get(&url).query(&[("limit", limit.to_string())]);
            if let Some(cursor) = cursor {
                request = request.query(&[("cursor", cursor)]);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let parsed: FeedResponse = response
                            .json()
                            .await
                            .map_err(|e| Error::TransientSource(e.to_string()))?;
                        return Ok(FeedPage {
                            items: parsed.items,
                            next_cursor: parsed.next_cursor,
                        });
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(Error::TransientSource(format!(
                            "feed error {status} from {url}"
                        )));
                        continue;
                    }

                    return Err(Error::TransientSource(format!(
                        "feed error {status} from {url}"
                    )));
                }
                Err(e) => {
                    last_err = Some(Error::TransientSource(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::TransientSource("feed fetch failed after retries".into())))
    }
}

// ============ Plain-text extractor ============

/// Fetches an attachment and returns its body as text, unmodified.
/// Suitable for text/plain and markdown attachments; scanned documents
/// need an OCR-backed [`TextExtractor`] instead.
pub struct PlainTextExtractor {
    client: reqwest::Client,
}

impl PlainTextExtractor {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::TransientSource(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract_text(&self, attachment: &AttachmentRef) -> Result<String> {
        let response = self
            .client
            .get(&attachment.url)
            .send()
            .await
            .map_err(|e| Error::TransientSource(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::TransientSource(format!(
                "attachment fetch failed with {} for {}",
                response.status(),
                attachment.url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::TransientSource(e.to_string()))
    }
}

// ============ Normalization ============

/// Normalize a feed item into a [`SourceDocument`], resolving attachment
/// references through the extractor when the item has no inline text.
pub async fn normalize_item(
    item: &FeedItem,
    extractor: &dyn TextExtractor,
) -> Result<SourceDocument> {
    let source_type = SourceType::parse(item.source_type.trim())?;

    let body = match (&item.body, &item.attachment) {
        (Some(body), _) => body.clone(),
        (None, Some(attachment)) => extractor.extract_text(attachment).await?,
        (None, None) => String::new(),
    };

    Ok(SourceDocument {
        id: item.id.trim().to_string(),
        source_type,
        committee: item.committee.trim().to_string(),
        case_number: item.case_number.trim().to_string(),
        published_at: item.published_at,
        version: item.version,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExtractor(&'static str);

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        async fn extract_text(&self, _attachment: &AttachmentRef) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn item(body: Option<&str>, attachment: bool) -> FeedItem {
        FeedItem {
            id: " sag-42 ".to_string(),
            committee: " Teknisk Udvalg ".to_string(),
            case_number: "SAG-2024-42".to_string(),
            source_type: "minutes".to_string(),
            published_at: Utc::now(),
            version: 3,
            body: body.map(str::to_string),
            attachment: attachment.then(|| AttachmentRef {
                url: "https://publication.example.dk/doc/42.pdf".to_string(),
                content_type: Some("application/pdf".to_string()),
            }),
        }
    }

    #[tokio::test]
    async fn test_normalize_inline_body() {
        let doc = normalize_item(&item(Some("inline text"), false), &FixedExtractor("unused"))
            .await
            .unwrap();
        assert_eq!(doc.id, "sag-42");
        assert_eq!(doc.committee, "Teknisk Udvalg");
        assert_eq!(doc.body, "inline text");
        assert_eq!(doc.version, 3);
    }

    #[tokio::test]
    async fn test_normalize_attachment_goes_through_extractor() {
        let doc = normalize_item(&item(None, true), &FixedExtractor("extracted text"))
            .await
            .unwrap();
        assert_eq!(doc.body, "extracted text");
    }

    #[tokio::test]
    async fn test_normalize_rejects_unknown_source_type() {
        let mut bad = item(Some("x"), false);
        bad.source_type = "press-release".to_string();
        assert!(normalize_item(&bad, &FixedExtractor("")).await.is_err());
    }

    #[test]
    fn test_feed_item_deserializes_wire_format() {
        let json = r#"{
            "id": "sag-7",
            "committee": "Byrådet",
            "case_number": "SAG-2024-7",
            "source_type": "agenda",
            "published_at": "2024-06-15T10:00:00Z",
            "version": 1,
            "body": "Dagsorden for mødet"
        }"#;
        let item: FeedItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.id, "sag-7");
        assert_eq!(item.version, 1);
        assert!(item.attachment.is_none());
    }
}
