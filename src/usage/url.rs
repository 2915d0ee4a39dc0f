//! Browser URL normalization.

use url::Url;

/// Schemes of browser-internal pages that are never tracked.
pub const INTERNAL_SCHEMES: &[&str] = &[
    "about",
    "brave",
    "chrome",
    "chrome-extension",
    "chrome-search",
    "devtools",
    "edge",
];

/// Strip the fragment, keeping scheme, host, path and query.
///
/// Strings that do not parse as a URL with a host are returned unchanged.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut url) if url.has_host() => {
            url.set_fragment(None);
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

/// Whether the tab shows a browser-internal page.
pub fn is_internal_url(raw: &str) -> bool {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(url) => INTERNAL_SCHEMES.contains(&url.scheme()),
        Err(_) => INTERNAL_SCHEMES
            .iter()
            .any(|scheme| raw.starts_with(&format!("{scheme}:"))),
    }
}
