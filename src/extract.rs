//! Image extraction: embedded HTML `<img>` URLs and inline attachments

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;

use crate::error::Result;
use crate::gateway::MailGateway;
use crate::models::{Image, MailMessage};
use crate::session::Session;

static IMG_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());

/// Collect the `src` attribute of every `<img>` tag in the message body
///
/// Every part's decoded payload plus the top-level payload are concatenated
/// and parsed as one HTML document. No deduplication, no validation that the
/// `src` is a fetchable URL.
pub fn collect_embedded_urls(message: &MailMessage) -> Vec<String> {
    let mut text = String::new();
    for part in &message.parts {
        if let Some(data) = &part.body_data {
            text.push_str(&String::from_utf8_lossy(data));
        }
    }
    if let Some(data) = &message.body_data {
        text.push_str(&String::from_utf8_lossy(data));
    }

    let document = Html::parse_document(&text);
    document
        .select(&IMG_SELECTOR)
        .filter_map(|img| img.value().attr("src"))
        .map(str::to_string)
        .collect()
}

/// Pull every image out of a message, URL images first and attachment byte
/// images after
pub async fn extract_images<G: MailGateway + ?Sized>(
    gateway: &G,
    session: &Session,
    message: &MailMessage,
) -> Result<Vec<Image>> {
    let mut images: Vec<Image> = collect_embedded_urls(message)
        .into_iter()
        .map(Image::Url)
        .collect();
    let url_count = images.len();

    for part in &message.parts {
        if !part.is_image() {
            continue;
        }
        if let Some(attachment_id) = &part.attachment_id {
            let bytes = gateway
                .get_attachment(session, &message.id, attachment_id)
                .await?;
            images.push(Image::Bytes(bytes));
        }
    }

    debug!(
        "Extracted {} images from message {} ({} embedded URLs, {} attachments)",
        images.len(),
        message.id,
        url_count,
        images.len() - url_count
    );
    Ok(images)
}
