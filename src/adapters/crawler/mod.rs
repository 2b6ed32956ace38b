pub mod bing;
pub mod google;

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Páginas de resultados consultadas como máximo por palabra clave.
const MAX_PAGES: usize = 10;

pub fn build_client(timeout_secs: u64) -> DomainResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| DomainError::OperationFailed(format!("cliente HTTP: {e}")))
}

/// Descarga una página de resultados. Un error aquí es un fallo del buscador.
pub(crate) async fn fetch_page(client: &reqwest::Client, url: &str, query: &[(&str, String)]) -> DomainResult<String> {
    let res = client
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| DomainError::OperationFailed(format!("búsqueda fallida: {e}")))?;

    if !res.status().is_success() {
        return Err(DomainError::OperationFailed(format!("búsqueda fallida: HTTP {}", res.status())));
    }
    res.text()
        .await
        .map_err(|e| DomainError::OperationFailed(format!("respuesta ilegible: {e}")))
}

/// Recorre páginas de resultados con `page_urls` hasta reunir `max_num` URLs únicas.
/// Si la primera página falla, el error se propaga para activar el buscador de respaldo.
pub(crate) async fn collect_urls<F, Fut>(max_num: usize, mut page_urls: F) -> DomainResult<Vec<String>>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = DomainResult<Vec<String>>>,
{
    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for page in 0..MAX_PAGES {
        if urls.len() >= max_num {
            break;
        }
        let found = match page_urls(page).await {
            Ok(found) => found,
            Err(e) if page == 0 => return Err(e),
            Err(e) => {
                warn!("Página {page} descartada: {e}");
                break;
            }
        };
        let before = urls.len();
        for url in found {
            if seen.insert(url.clone()) {
                urls.push(url);
            }
        }
        if urls.len() == before {
            break;
        }
    }

    urls.truncate(max_num);
    Ok(urls)
}

/// Siguiente índice libre en `dest`, para no sobrescribir descargas de otras palabras clave.
pub fn next_file_index(dest: &Path) -> usize {
    fs::read_dir(dest)
        .map(|entries| {
            entries
                .flatten()
                .filter_map(|e| e.path().file_stem()?.to_str()?.parse::<usize>().ok())
                .max()
                .map(|m| m + 1)
                .unwrap_or(1)
        })
        .unwrap_or(1)
}

fn extension_for(content_type: Option<&str>, url: &str) -> &'static str {
    match content_type {
        Some(ct) if ct.contains("png") => "png",
        Some(ct) if ct.contains("jpeg") || ct.contains("jpg") => "jpg",
        _ if url.to_lowercase().ends_with(".png") => "png",
        _ => "jpg",
    }
}

/// Descarga secuencialmente cada URL en `dest` con nombres `000001.jpg`, `000002.png`...
/// Las descargas fallidas se registran y se omiten.
pub(crate) async fn download_all(client: &reqwest::Client, urls: &[String], dest: &Path) -> DomainResult<usize> {
    fs::create_dir_all(dest)?;
    let mut index = next_file_index(dest);
    let mut downloaded = 0;

    for url in urls {
        let res = match client.get(url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                debug!("Descarga omitida ({}): {}", r.status(), url);
                continue;
            }
            Err(e) => {
                debug!("Descarga omitida: {url}: {e}");
                continue;
            }
        };

        let content_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = match res.bytes().await {
            Ok(b) if !b.is_empty() => b,
            _ => continue,
        };

        let path = dest.join(format!("{:06}.{}", index, extension_for(content_type.as_deref(), url)));
        fs::write(&path, &bytes)?;
        index += 1;
        downloaded += 1;
    }

    Ok(downloaded)
}

/// Deshace los escapes JSON/HTML más habituales en las URLs incrustadas.
pub(crate) fn unescape_url(raw: &str) -> String {
    raw.replace("\\u003d", "=")
        .replace("\\u0026", "&")
        .replace("&amp;", "&")
        .replace("\\/", "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_index_continues_after_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_file_index(dir.path()), 1);
        fs::write(dir.path().join("000004.jpg"), b"x").unwrap();
        fs::write(dir.path().join("000002.png"), b"x").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        assert_eq!(next_file_index(dir.path()), 5);
    }

    #[test]
    fn extension_prefers_content_type() {
        assert_eq!(extension_for(Some("image/png"), "http://a/b.jpg"), "png");
        assert_eq!(extension_for(None, "http://a/b.PNG"), "png");
        assert_eq!(extension_for(Some("application/octet-stream"), "http://a/b"), "jpg");
    }

    #[tokio::test]
    async fn collect_urls_dedups_and_caps() {
        let urls = collect_urls(3, |page| async move {
            Ok(vec![format!("u{page}"), format!("u{}", page + 1)])
        })
        .await
        .unwrap();
        assert_eq!(urls, vec!["u0", "u1", "u2"]);
    }

    #[tokio::test]
    async fn collect_urls_fails_only_on_first_page() {
        let err = collect_urls(5, |_| async { Err(DomainError::OperationFailed("down".into())) }).await;
        assert!(err.is_err());

        let partial = collect_urls(5, |page| async move {
            if page == 0 { Ok(vec!["a".to_string()]) } else { Err(DomainError::OperationFailed("down".into())) }
        })
        .await
        .unwrap();
        assert_eq!(partial, vec!["a"]);
    }
}
