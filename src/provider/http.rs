use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::error::{DownloadError, Result};
use crate::provider::ChapterProvider;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid regex"));
static BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<\s*(br|/?p|/div|/h[1-6]|/li|/blockquote)\b[^>]*>").expect("valid regex")
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Generic provider: plain HTTP GET, HTML reduced to text.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    name: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| DownloadError::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            name: name.into(),
            client,
        })
    }
}

#[async_trait]
impl ChapterProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_chapter_content(&self, url: &str) -> Result<String> {
        tracing::debug!(provider = %self.name, url, "Fetching chapter");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Network(format!("HTTP {} for {}", status, url)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::Network(e.to_string()))?;
        Ok(html_to_text(&body))
    }
}

/// Reduce an HTML page to readable text.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = BREAK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    decode_entities(&text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_tags() {
        let html = r#"<html><head><style>p { color: red; }</style>
            <script type="text/javascript">alert("x")</script></head>
            <body><p>Hello <b>world</b></p><p>Second</p></body></html>"#;
        let text = html_to_text(html);
        assert!(text.contains("Hello world"));
        assert!(text.contains("Second"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn breaks_become_newlines() {
        let text = html_to_text("one<br/>two<BR>three</p>four");
        assert_eq!(text, "one\ntwo\nthree\nfour");
    }

    #[test]
    fn decodes_common_entities() {
        assert_eq!(
            html_to_text("Tom &amp; Jerry &lt;3&nbsp;&quot;hi&quot; it&#39;s"),
            "Tom & Jerry <3 \"hi\" it's"
        );
    }

    #[test]
    fn amp_is_decoded_last() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }

    #[test]
    fn provider_reports_its_name() {
        let provider = HttpProvider::new("generic").unwrap();
        assert_eq!(provider.name(), "generic");
    }
}
