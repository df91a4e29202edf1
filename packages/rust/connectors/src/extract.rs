//! Text extraction helpers shared by the connectors.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use sha2::{Digest, Sha256};

/// Convert an HTML document to Markdown-flavoured plain text.
pub(crate) fn html_to_text(html: &str) -> Result<String, String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg", "head"])
        .build();

    converter
        .convert(html)
        .map_err(|e| format!("htmd conversion failed: {e}"))
}

/// Text of the first `<title>` element, if any.
pub(crate) fn page_title(html: &str) -> Option<String> {
    static TITLE_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("title").expect("valid selector"));

    let doc = Html::parse_document(html);
    doc.select(&TITLE_SEL)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Decode bytes as UTF-8, dropping invalid sequences.
pub(crate) fn decode_lossy(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.utf8_chunks().map(|chunk| chunk.valid()).collect(),
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_drops_scripts() {
        let html = "<html><head><title>T</title></head><body><h1>Guide</h1>\
                    <script>track()</script><p>Install it.</p></body></html>";
        let text = html_to_text(html).expect("convert");
        assert!(text.contains("Guide"));
        assert!(text.contains("Install it."));
        assert!(!text.contains("track()"));
    }

    #[test]
    fn page_title_extracted() {
        let html = "<html><head><title> API Reference </title></head><body></body></html>";
        assert_eq!(page_title(html), Some("API Reference".into()));
        assert_eq!(page_title("<p>no title</p>"), None);
    }

    #[test]
    fn decode_lossy_drops_invalid_bytes() {
        let bytes = b"caf\xc3\xa9 \xff\xfeok";
        assert_eq!(decode_lossy(bytes), "café ok");
    }

    #[test]
    fn sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
