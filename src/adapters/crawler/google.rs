use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::{collect_urls, download_all, fetch_page, unescape_url};
use crate::application::ports::ImageSearchPort;
use crate::domain::errors::DomainResult;

const GOOGLE_URL: &str = "https://www.google.com/search";
const ENTRY_START: &str = "[\"http";
const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".bmp", ".webp"];

/// Buscador de respaldo: Google Images.
pub struct GoogleImageSearch {
    client: reqwest::Client,
}

impl GoogleImageSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn page(&self, keyword: &str, page: usize) -> DomainResult<Vec<String>> {
        let query = [
            ("q", keyword.to_string()),
            ("tbm", "isch".to_string()),
            ("ijn", page.to_string()),
        ];
        let html = fetch_page(&self.client, GOOGLE_URL, &query).await?;
        Ok(parse_results(&html))
    }
}

/// Google incrusta las imágenes originales como `["<url>",<alto>,<ancho>]`.
/// Se descartan las miniaturas de `gstatic`.
pub fn parse_results(html: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find(ENTRY_START) {
        rest = &rest[start + 2..];
        let Some(end) = rest.find('"') else { break };
        let candidate = unescape_url(&rest[..end]);
        let tail = &rest[end + 1..];
        rest = tail;

        if !is_dimension_tuple(tail) || candidate.contains("gstatic.com") {
            continue;
        }
        let lower = candidate.to_lowercase();
        let path = lower.split('?').next().unwrap_or_default();
        if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            urls.push(candidate);
        }
    }
    urls
}

/// `,<digitos>,<digitos>]`
fn is_dimension_tuple(tail: &str) -> bool {
    let Some(body) = tail.strip_prefix(',') else { return false };
    let Some(close) = body.find(']') else { return false };
    let parts: Vec<&str> = body[..close].split(',').collect();
    parts.len() == 2 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

#[async_trait]
impl ImageSearchPort for GoogleImageSearch {
    fn name(&self) -> &str {
        "google"
    }

    async fn crawl(&self, keyword: &str, max_num: usize, dest: &Path) -> DomainResult<usize> {
        let urls = collect_urls(max_num, move |page| self.page(keyword, page)).await?;
        info!("Google: {} resultados para '{}'", urls.len(), keyword);
        download_all(&self.client, &urls, dest).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_original_image_tuples() {
        let html = r#"var a=[["https://encrypted-tbn0.gstatic.com/images?q=tbn.jpg",194,259],
            ["https://cdn.example.org/bottle.JPG",1200,800],
            ["https://cdn.example.org/page.html",10,10],
            ["https://cdn.example.org/bag.png?w=600",600,600],
            ["https://cdn.example.org/x.jpg","not dims"]];"#;
        assert_eq!(
            parse_results(html),
            vec!["https://cdn.example.org/bottle.JPG", "https://cdn.example.org/bag.png?w=600"]
        );
    }

    #[test]
    fn dimension_tuple_shape() {
        assert!(is_dimension_tuple(",12,34]"));
        assert!(!is_dimension_tuple(",12]"));
        assert!(!is_dimension_tuple("12,34]"));
    }
}
