//! Document source that resolves report links from a listing page.

use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use sheetocr_core::error::FetchError;
use sheetocr_core::models::config::FetchConfig;
use sheetocr_core::{DocumentSource, SourceDocument};

lazy_static! {
    static ref ROW_RE: Regex = Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr>").unwrap();
    static ref PDF_HREF_RE: Regex =
        Regex::new(r#"(?i)<a\b[^>]*?\bhref\s*=\s*["']([^"']+?\.pdf)["']"#).unwrap();
    static ref TAG_RE: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
}

/// Fetches `<listing_url><entity>`, picks the first table row mentioning
/// the keyword that links a PDF, and downloads that PDF.
pub struct HttpDocumentSource {
    client: reqwest::Client,
    listing_url: String,
    base_url: String,
    keyword: String,
}

impl HttpDocumentSource {
    pub fn from_config(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("sheetocr/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            listing_url: config.listing_url.clone(),
            base_url: config.base_url.clone(),
            keyword: config.link_keyword.clone(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Http(e.to_string()))
    }
}

#[async_trait]
impl DocumentSource for HttpDocumentSource {
    async fn fetch(&self, entity_id: &str) -> Result<SourceDocument, FetchError> {
        let listing = format!("{}{}", self.listing_url, entity_id);
        debug!(entity = entity_id, "GET {}", listing);

        let html = self
            .get(&listing)
            .await?
            .text()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let href = find_report_link(&html, &self.keyword).ok_or_else(|| {
            FetchError::NotFound(format!("{}: no row matching {:?} links a PDF", entity_id, self.keyword))
        })?;
        let url = absolutize(&self.base_url, &href);

        info!(entity = entity_id, "Downloading {}", url);
        let bytes = self
            .get(&url)
            .await?
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let name = url.rsplit('/').next().unwrap_or(entity_id).to_string();
        Ok(SourceDocument::new(name, bytes.to_vec()))
    }
}

/// First table row whose text contains `keyword` (case-insensitive) and
/// that links a `.pdf`.
///
/// Character references are decoded in both the row text and the href.
pub fn find_report_link(html: &str, keyword: &str) -> Option<String> {
    let keyword = keyword.to_lowercase();

    ROW_RE.captures_iter(html).find_map(|row| {
        let inner = row.get(1)?.as_str();
        let text = TAG_RE.replace_all(inner, " ");
        let text = html_escape::decode_html_entities(&text);
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if !text.contains(&keyword) {
            return None;
        }
        PDF_HREF_RE
            .captures(inner)
            .and_then(|c| c.get(1))
            .map(|m| html_escape::decode_html_entities(m.as_str().trim()).into_owned())
    })
}

/// Resolve a possibly relative link against `base`.
pub fn absolutize(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <table><tr><td>Menu</td></tr></table>
        <table>
          <tr><td>Báo cáo thường niên 2023</td><td><a href="/data/annual-2023.pdf">Tải</a></td></tr>
          <tr><td>BÁO CÁO TÀI CHÍNH
              HỢP NHẤT Quý 4/2023</td><td><a class="dl" href="/data/VNM_BCTC_Q4.pdf">Tải</a></td></tr>
          <tr><td>Báo cáo tài chính hợp nhất Quý 3/2023</td><td><a href="https://cdn.example.com/VNM_Q3.pdf">Tải</a></td></tr>
        </table>"#;

    #[test]
    fn test_finds_first_matching_row() {
        let href = find_report_link(LISTING, "báo cáo tài chính hợp nhất");
        assert_eq!(href.as_deref(), Some("/data/VNM_BCTC_Q4.pdf"));
    }

    #[test]
    fn test_row_without_pdf_is_skipped() {
        let html = r#"<tr><td>Báo cáo tài chính hợp nhất</td><td><a href="/view?id=3">Xem</a></td></tr>
                      <tr><td>Báo cáo tài chính hợp nhất</td><td><a href='/data/x.PDF'>Tải</a></td></tr>"#;
        assert_eq!(find_report_link(html, "báo cáo tài chính hợp nhất").as_deref(), Some("/data/x.PDF"));
        assert_eq!(find_report_link(html, "kiểm toán"), None);
    }

    #[test]
    fn test_character_references_are_decoded() {
        let html = r#"<tr><td>B&#225;o c&#225;o t&#224;i ch&#237;nh h&#7907;p nh&#7845;t Q4</td>
                      <td><a href="/data/x.pdf">T&#7843;i</a></td></tr>"#;
        assert_eq!(find_report_link(html, "báo cáo tài chính hợp nhất").as_deref(), Some("/data/x.pdf"));

        let html = r#"<tr><td>B&aacute;o c&aacute;o t&agrave;i ch&iacute;nh h&#x1EE3;p nh&#x1EA5;t</td>
                      <td><a href="/data/VNM&amp;Q4.pdf">Tải</a></td></tr>"#;
        assert_eq!(find_report_link(html, "báo cáo tài chính hợp nhất").as_deref(), Some("/data/VNM&Q4.pdf"));
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(absolutize("https://cafef.vn", "/data/a.pdf"), "https://cafef.vn/data/a.pdf");
        assert_eq!(absolutize("https://cafef.vn/", "data/a.pdf"), "https://cafef.vn/data/a.pdf");
        assert_eq!(absolutize("https://cafef.vn", "https://x.io/a.pdf"), "https://x.io/a.pdf");
        assert_eq!(absolutize("https://cafef.vn", "//x.io/a.pdf"), "https://x.io/a.pdf");
    }
}
