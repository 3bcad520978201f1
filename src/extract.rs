//! Text cleanup and selector-fallback extraction over parsed HTML.
//!
//! Detail pages move their content between containers across layouts, so most
//! fields are read through an ordered list of selectors where the first
//! non-empty hit wins.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static BR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_CLOSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(p|div|li|h[1-6]|section|article|tr|td|th)>").unwrap()
});
static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());

/// Every link that carries an `href`.
pub static LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("Failed to parse link selector"));

/// Parsed fallback-chain selectors, keyed by their CSS text.
static SELECTOR_CACHE: Lazy<Mutex<HashMap<String, Arc<Selector>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// How extracted text is whitespace-normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    /// Collapse all whitespace, including newlines, to single spaces.
    Flatten,
    /// Collapse whitespace within each line and keep non-empty lines.
    Lines,
}

impl TextMode {
    pub fn apply(self, text: &str) -> Option<String> {
        match self {
            TextMode::Flatten => clean(text),
            TextMode::Lines => normalize_text_block(text),
        }
    }
}

/// Collapse whitespace runs to one space and trim. Empty results are `None`.
///
/// Non-breaking spaces count as whitespace.
pub fn clean(text: &str) -> Option<String> {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    let collapsed = collapsed.trim();
    (!collapsed.is_empty()).then(|| collapsed.to_string())
}

/// Normalise each line separately, dropping blank lines, and keep the line
/// structure.
pub fn normalize_text_block(text: &str) -> Option<String> {
    let joined = text
        .lines()
        .filter_map(clean)
        .collect::<Vec<_>>()
        .join("\n");
    (!joined.is_empty()).then_some(joined)
}

/// Parse a selector from a fallback chain, reusing earlier parses.
///
/// Selector strings in this crate are literals; a bad one is a programming
/// error and is logged and skipped rather than aborting a crawl.
pub fn selector(css: &str) -> Option<Arc<Selector>> {
    let mut cache = SELECTOR_CACHE.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(sel) = cache.get(css) {
        return Some(Arc::clone(sel));
    }
    match Selector::parse(css) {
        Ok(sel) => {
            let sel = Arc::new(sel);
            cache.insert(css.to_string(), Arc::clone(&sel));
            Some(sel)
        }
        Err(e) => {
            warn!(css, error = %e, "Invalid CSS selector");
            None
        }
    }
}

/// All descendant text of an element, concatenated.
pub fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>()
}

/// The first element matching `css` under `root`.
pub fn first_element<'a>(root: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    root.select(&sel).next()
}

/// Text of the first element matching `css`, normalised with `mode`.
pub fn text_of(root: ElementRef<'_>, css: &str, mode: TextMode) -> Option<String> {
    first_element(root, css).and_then(|el| mode.apply(&element_text(&el)))
}

/// Try `selectors` in order; the first one whose first match has non-empty
/// text wins.
pub fn first_text(root: ElementRef<'_>, selectors: &[&str], mode: TextMode) -> Option<String> {
    selectors.iter().find_map(|css| text_of(root, css, mode))
}

/// Try `(selector, attribute)` pairs in order; first non-empty value wins.
pub fn first_attr(root: ElementRef<'_>, candidates: &[(&str, &str)]) -> Option<String> {
    candidates.iter().find_map(|(css, attr)| {
        first_element(root, css)
            .and_then(|el| el.value().attr(attr))
            .and_then(clean)
    })
}

/// Every text node under every match of `css`, each cleaned, empty ones
/// dropped.
pub fn text_nodes(root: ElementRef<'_>, css: &str) -> Vec<String> {
    let Some(sel) = selector(css) else {
        return Vec::new();
    };
    root.select(&sel)
        .flat_map(|el| el.text().filter_map(clean).collect::<Vec<_>>())
        .collect()
}

/// Convenience: the root element of a parsed document.
pub fn root(doc: &Html) -> ElementRef<'_> {
    doc.root_element()
}

/// Convert an HTML fragment to text, keeping paragraph and line breaks.
///
/// `<br>` and block-level closing tags become newlines, `<script>` and
/// `<style>` blocks are removed, then each line is whitespace-normalised.
pub fn html_to_text(html: &str) -> Option<String> {
    if html.trim().is_empty() {
        return None;
    }
    let html = BR_TAG.replace_all(html, "\n");
    let html = BLOCK_CLOSE.replace_all(&html, "$0\n");
    let html = SCRIPT_BLOCK.replace_all(&html, "");
    let html = STYLE_BLOCK.replace_all(&html, "");
    let fragment = Html::parse_fragment(&html);
    let text = fragment.root_element().text().collect::<String>();
    normalize_text_block(&text)
}

/// Collect every non-empty string stored under a `"value"` key anywhere in a
/// JSON document, in document order, joined by newlines.
///
/// Returns `None` for invalid JSON or when no values are found.
pub fn sw_json_values(raw: &str) -> Option<String> {
    let doc: Value = serde_json::from_str(raw).ok()?;
    let mut values = Vec::new();
    walk_values(&doc, &mut values);
    (!values.is_empty()).then(|| values.join("\n"))
}

fn walk_values(node: &Value, out: &mut Vec<String>) {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(v)) = map.get("value") {
                let v = v.trim();
                if !v.is_empty() {
                    out.push(v.to_string());
                }
            }
            for child in map.values() {
                walk_values(child, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|child| walk_values(child, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_collapses_whitespace() {
        assert_eq!(
            clean("  삼성전자\t\t주가 \n\n 상승\u{a0}마감  "),
            Some("삼성전자 주가 상승 마감".to_string())
        );
        assert_eq!(clean(" \n\t "), None);
    }

    #[test]
    fn test_normalize_text_block_keeps_lines() {
        let raw = "  첫 줄   입니다 \n\n\t\n 둘째\t줄 ";
        assert_eq!(
            normalize_text_block(raw),
            Some("첫 줄 입니다\n둘째 줄".to_string())
        );
        assert_eq!(clean(raw), Some("첫 줄 입니다 둘째 줄".to_string()));
    }

    #[test]
    fn test_first_text_falls_through_empty_containers() {
        let doc = Html::parse_document(
            r#"<html><body>
                <div id="dic_area">   </div>
                <div id="newsct_article"> 본문 <b>내용</b> </div>
                <article>다른 내용</article>
            </body></html>"#,
        );
        let text = first_text(
            root(&doc),
            &["#dic_area", "#newsct_article", "article"],
            TextMode::Flatten,
        );
        assert_eq!(text, Some("본문 내용".to_string()));
    }

    #[test]
    fn test_selector_is_parsed_once() {
        let a = selector("div.media_end_head_title h2").unwrap();
        let b = selector("div.media_end_head_title h2").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(selector("td[").is_none());
    }

    #[test]
    fn test_first_text_all_missing() {
        let doc = Html::parse_document("<html><body><p>x</p></body></html>");
        assert_eq!(first_text(root(&doc), &["#nope", ".also-nope"], TextMode::Lines), None);
    }

    #[test]
    fn test_first_attr_order() {
        let doc = Html::parse_document(
            r#"<html><head>
                <meta property="og:article:author" content="한국경제">
                <meta name="twitter:creator" content="다른값">
            </head><body></body></html>"#,
        );
        let press = first_attr(
            root(&doc),
            &[
                ("div.media_end_head_top a img", "title"),
                (r#"meta[property="og:article:author"]"#, "content"),
                (r#"meta[name="twitter:creator"]"#, "content"),
            ],
        );
        assert_eq!(press, Some("한국경제".to_string()));
    }

    #[test]
    fn test_html_to_text() {
        let html = "<p>첫 문단</p><p>둘째<br>줄</p><script>var x = 1;</script><style>p{}</style><div>  끝  </div>";
        assert_eq!(
            html_to_text(html),
            Some("첫 문단\n둘째\n줄\n끝".to_string())
        );
        assert_eq!(html_to_text("   "), None);
    }

    #[test]
    fn test_sw_json_values() {
        let raw = r#"{"document":{"components":[
            {"value":" 안녕하세요 "},
            {"paragraphs":[{"nodes":[{"value":"둘째"},{"value":""}]}]},
            {"value": 3}
        ]}}"#;
        assert_eq!(sw_json_values(raw), Some("안녕하세요\n둘째".to_string()));
        assert_eq!(sw_json_values("{not json"), None);
        assert_eq!(sw_json_values(r#"{"a":1}"#), None);
    }

    #[test]
    fn test_sw_json_values_keeps_key_order() {
        let raw = r#"{"title":{"value":"T"},"summary":{"value":"S"}}"#;
        assert_eq!(sw_json_values(raw), Some("T\nS".to_string()));

        let raw = r#"{"document":{
            "zeta":{"value":"첫째"},
            "alpha":[{"value":"둘째"}],
            "mid":{"nodes":{"value":"셋째"}}
        }}"#;
        assert_eq!(sw_json_values(raw), Some("첫째\n둘째\n셋째".to_string()));
    }
}
