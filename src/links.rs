//! Article URL canonicalisation, stable identifiers and query helpers.
//!
//! The same news article shows up under several URL shapes:
//!
//! ```text
//! https://n.news.naver.com/mnews/article/277/0005709756
//! https://news.naver.com/article/277/0005709756
//! https://finance.naver.com/item/news_read.naver?office_id=277&article_id=0005709756&code=005930
//! https://news.naver.com/main/read.naver?oid=277&aid=0005709756
//! ```
//!
//! All of them collapse to `https://news.naver.com/article/{oid}/{aid}`, and the
//! record identifier is a UUIDv5 of that canonical link.

use url::Url;
use uuid::Uuid;

/// Template for the canonical desktop article URL.
pub const CANONICAL_ARTICLE_BASE: &str = "https://news.naver.com/article";

/// Press (office) id and article id pulled from an article URL.
pub type OidAid = (Option<String>, Option<String>);

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Extract `(oid, aid)` from any known article URL shape.
///
/// Path form `…/article/{oid}/{aid}` wins when both trailing segments are
/// numeric. Otherwise the query string is consulted, `office_id`/`article_id`
/// first and `oid`/`aid` second. A URL that does not parse yields
/// `(None, None)`.
pub fn extract_oid_aid(url: &str) -> OidAid {
    let Ok(parsed) = Url::parse(url) else {
        return (None, None);
    };

    let parts: Vec<&str> = parsed
        .path_segments()
        .map(|segs| segs.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    if parts.len() >= 3 && parts[parts.len() - 3] == "article" {
        let (oid, aid) = (parts[parts.len() - 2], parts[parts.len() - 1]);
        if is_numeric(oid) && is_numeric(aid) {
            return (Some(oid.to_string()), Some(aid.to_string()));
        }
    }

    let oid = query_value(&parsed, "office_id").or_else(|| query_value(&parsed, "oid"));
    let aid = query_value(&parsed, "article_id").or_else(|| query_value(&parsed, "aid"));
    (oid, aid)
}

/// Build the canonical article URL when both ids are present.
pub fn canonical_article_url(oid: Option<&str>, aid: Option<&str>) -> Option<String> {
    match (oid, aid) {
        (Some(o), Some(a)) if !o.is_empty() && !a.is_empty() => {
            Some(format!("{CANONICAL_ARTICLE_BASE}/{o}/{a}"))
        }
        _ => None,
    }
}

/// A canonicalised article link together with the ids it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleLink {
    pub link: String,
    pub oid: Option<String>,
    pub aid: Option<String>,
}

impl ArticleLink {
    /// The record identifier for this link.
    pub fn stable_id(&self) -> String {
        stable_id(&self.link)
    }
}

/// Canonicalise `url`, falling back to the URL unchanged.
pub fn canonicalize(url: &str) -> ArticleLink {
    let (oid, aid) = extract_oid_aid(url);
    let link = canonical_article_url(oid.as_deref(), aid.as_deref())
        .unwrap_or_else(|| url.to_string());
    ArticleLink { link, oid, aid }
}

/// Deterministic, name-based identifier (UUIDv5, URL namespace) for a link.
pub fn stable_id(link: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, link.as_bytes()).to_string()
}

fn query_value(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Resolve `href` against `base` and read the query parameter `name`.
pub fn query_param(base: &Url, href: &str, name: &str) -> Option<String> {
    base.join(href).ok().and_then(|u| query_value(&u, name))
}

/// Resolve `href` against `base`, dropping anything that does not form a URL.
pub fn resolve(base: &Url, href: &str) -> Option<Url> {
    base.join(href.trim()).ok()
}

/// Read the numeric `page` parameter of a pagination link.
pub fn page_param(base: &Url, href: &str) -> Option<u32> {
    query_param(base, href, "page").and_then(|p| p.parse().ok())
}

/// The largest `page=` value among `hrefs`, if any.
pub fn max_page_in_links<'a, I>(base: &Url, hrefs: I) -> Option<u32>
where
    I: IntoIterator<Item = &'a str>,
{
    hrefs
        .into_iter()
        .filter(|h| h.contains("page="))
        .filter_map(|h| page_param(base, h))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "https://news.naver.com/article/277/0005709756";

    #[test]
    fn test_path_and_query_forms_agree() {
        for url in [
            "https://n.news.naver.com/mnews/article/277/0005709756",
            "https://news.naver.com/article/277/0005709756",
            "https://finance.naver.com/item/news_read.naver?office_id=277&article_id=0005709756&code=005930",
            "https://finance.naver.com/news/news_read.naver?article_id=0005709756&office_id=277",
            "https://news.naver.com/main/read.naver?mode=LSD&oid=277&aid=0005709756",
        ] {
            assert_eq!(canonicalize(url).link, CANONICAL, "{url}");
        }
    }

    #[test]
    fn test_path_form_requires_numeric_segments() {
        let (oid, aid) = extract_oid_aid("https://news.naver.com/article/abc/0005709756");
        assert_eq!((oid, aid), (None, None));
    }

    #[test]
    fn test_unparseable_url_falls_back() {
        assert_eq!(extract_oid_aid("not a url"), (None, None));
        let link = canonicalize("https://finance.naver.com/item/board_read.naver?nid=1");
        assert_eq!(link.link, "https://finance.naver.com/item/board_read.naver?nid=1");
        assert_eq!(link.aid, None);
    }

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_id(CANONICAL);
        let b = stable_id(CANONICAL);
        assert_eq!(a, b);
        assert_ne!(a, stable_id("https://news.naver.com/article/277/0005709757"));
        // Version nibble of a v5 UUID.
        assert_eq!(&a[14..15], "5");
    }

    #[test]
    fn test_stable_id_ignores_url_variant() {
        let from_query = canonicalize(
            "https://finance.naver.com/item/news_read.naver?office_id=277&article_id=0005709756",
        );
        let from_path = canonicalize("https://n.news.naver.com/mnews/article/277/0005709756");
        assert_eq!(from_query.stable_id(), from_path.stable_id());
    }

    #[test]
    fn test_page_helpers() {
        let base = Url::parse("https://finance.naver.com/item/news_news.naver?code=005930").unwrap();
        assert_eq!(page_param(&base, "/item/news_news.naver?code=005930&page=42"), Some(42));
        assert_eq!(page_param(&base, "/item/news_news.naver?code=005930"), None);
        let max = max_page_in_links(
            &base,
            ["?page=2", "?page=10", "#top", "?page=3", "?page=x"],
        );
        assert_eq!(max, Some(10));
    }
}
