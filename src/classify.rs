//! Image labeling against the vision service

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::{Result, TriageError};
use crate::models::Image;
use crate::session::Session;

const VISION_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";
const MAX_LABELS_PER_IMAGE: u32 = 10;

/// Labels the service assigned to one image
///
/// A per-image error rides inside an otherwise successful response, so it is
/// carried here rather than as an `Err`.
#[derive(Debug, Clone, Default)]
pub struct ImageAnnotation {
    pub labels: Vec<String>,
    pub error: Option<String>,
}

/// Narrow classifier seam so the pipeline is testable with fakes
#[async_trait]
pub trait LabelClassifier: Send + Sync {
    async fn annotate(&self, session: &Session, image: &Image) -> Result<ImageAnnotation>;
}

/// Classify every image and flatten the per-image label lists into one
///
/// One annotation request per image, joined concurrently. Only the first
/// annotation in the result list is inspected for a per-image error; an error
/// carried by any later annotation contributes no labels and is otherwise
/// ignored. Labels keep the input image order, provider order within an
/// image, no deduplication.
pub async fn classify_images<C: LabelClassifier + ?Sized>(
    classifier: &C,
    session: &Session,
    images: &[Image],
) -> Result<Vec<String>> {
    let annotations =
        try_join_all(images.iter().map(|image| classifier.annotate(session, image))).await?;

    if let Some(first) = annotations.first() {
        if let Some(message) = &first.error {
            return Err(TriageError::ClassificationError(message.clone()));
        }
    }

    let labels: Vec<String> = annotations.into_iter().flat_map(|a| a.labels).collect();
    debug!("Classified {} images into {} labels", images.len(), labels.len());
    Ok(labels)
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateBatchResponse {
    #[serde(default)]
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResult {
    #[serde(rename = "labelAnnotations", default)]
    label_annotations: Option<Vec<LabelAnnotation>>,
    #[serde(default)]
    error: Option<RpcStatus>,
}

#[derive(Debug, Deserialize)]
struct LabelAnnotation {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    message: Option<String>,
}

/// Production classifier calling the Vision `images:annotate` endpoint
pub struct VisionClassifier {
    http: reqwest::Client,
    endpoint: String,
}

impl VisionClassifier {
    pub fn new() -> Self {
        Self::with_endpoint(VISION_ANNOTATE_URL)
    }

    /// Construct against a non-default endpoint (used by tests)
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

impl Default for VisionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LabelClassifier for VisionClassifier {
    async fn annotate(&self, session: &Session, image: &Image) -> Result<ImageAnnotation> {
        let image_value = match image {
            Image::Url(url) => json!({ "source": { "imageUri": url } }),
            Image::Bytes(bytes) => json!({ "content": STANDARD.encode(bytes) }),
        };
        let body = json!({
            "requests": [{
                "image": image_value,
                "features": [{ "type": "LABEL_DETECTION", "maxResults": MAX_LABELS_PER_IMAGE }]
            }]
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", session.access_token()))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                TriageError::ClassificationError(format!("annotate request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(TriageError::ClassificationError(format!(
                "annotate failed with status {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let parsed: AnnotateBatchResponse = response.json().await.map_err(|e| {
            TriageError::ClassificationError(format!("failed to parse annotate response: {}", e))
        })?;

        let result = parsed.responses.into_iter().next().unwrap_or_default();
        Ok(ImageAnnotation {
            labels: result
                .label_annotations
                .unwrap_or_default()
                .into_iter()
                .filter_map(|l| l.description)
                .collect(),
            error: result.error.map(|e| {
                e.message
                    .unwrap_or_else(|| "unspecified annotation error".to_string())
            }),
        })
    }
}
