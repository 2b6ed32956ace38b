use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use super::{collect_urls, download_all, fetch_page, unescape_url};
use crate::application::ports::ImageSearchPort;
use crate::domain::errors::DomainResult;

const BING_URL: &str = "https://www.bing.com/images/async";
const PAGE_SIZE: usize = 35;
const MURL_START: &str = "murl&quot;:&quot;";
const MURL_END: &str = "&quot;";

/// Buscador primario: Bing Images.
pub struct BingImageSearch {
    client: reqwest::Client,
}

impl BingImageSearch {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn page(&self, keyword: &str, page: usize) -> DomainResult<Vec<String>> {
        let query = [
            ("q", keyword.to_string()),
            ("first", (page * PAGE_SIZE).to_string()),
            ("count", PAGE_SIZE.to_string()),
            ("adlt", "off".to_string()),
        ];
        let html = fetch_page(&self.client, BING_URL, &query).await?;
        Ok(parse_results(&html))
    }
}

/// Extrae las URLs originales (`murl`) de una página de resultados de Bing.
pub fn parse_results(html: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find(MURL_START) {
        rest = &rest[start + MURL_START.len()..];
        let Some(end) = rest.find(MURL_END) else { break };
        let url = unescape_url(&rest[..end]);
        if url.starts_with("http") {
            urls.push(url);
        }
        rest = &rest[end..];
    }
    urls
}

#[async_trait]
impl ImageSearchPort for BingImageSearch {
    fn name(&self) -> &str {
        "bing"
    }

    async fn crawl(&self, keyword: &str, max_num: usize, dest: &Path) -> DomainResult<usize> {
        let urls = collect_urls(max_num, move |page| self.page(keyword, page)).await?;
        info!("Bing: {} resultados para '{}'", urls.len(), keyword);
        download_all(&self.client, &urls, dest).await
    }
}
