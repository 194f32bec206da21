// Image URI rule.
//   absolute http(s)       -> routed through the proxy path
//   same-origin "/path"    -> used as-is
//   bare host ("cdn.x/a")  -> assumed https://, then proxied
// Normalising an already-proxied URI yields the same single-proxy form.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// Default proxy route.
pub const PROXY_PATH: &str = "/api/proxy";

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// What a normalised URI points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageUri {
    /// Proxied remote resource; carries the upstream absolute URL.
    Proxied(String),
    /// Same-origin path, starting with a single `/`.
    Local(String),
}

pub fn encode_component(s: &str) -> String {
    utf8_percent_encode(s, COMPONENT).to_string()
}

/// Percent-decode; malformed UTF-8 leaves the input untouched.
pub fn decode_component(s: &str) -> String {
    match percent_decode_str(s).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => s.to_string(),
    }
}

fn has_http_scheme(s: &str) -> bool {
    let lower = |n: usize| s.get(..n).map(str::to_ascii_lowercase);
    lower(7).as_deref() == Some("http://") || lower(8).as_deref() == Some("https://")
}

fn is_same_origin_path(s: &str) -> bool {
    s.starts_with('/') && !s.starts_with("//")
}

/// Upstream URL of an already-proxied URI (`<proxy>?url=<encoded>`).
pub fn proxied_upstream(s: &str, proxy_path: &str) -> Option<String> {
    let rest = s.strip_prefix(proxy_path)?.strip_prefix("?url=")?;
    // anything after another `&` is not part of the url parameter
    let encoded = rest.split('&').next().unwrap_or(rest);
    Some(decode_component(encoded))
}

fn wrap(upstream: &str, proxy_path: &str) -> String {
    format!("{proxy_path}?url={}", encode_component(upstream))
}

fn absolutize(s: &str) -> String {
    if has_http_scheme(s) {
        s.to_string()
    } else if let Some(rest) = s.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{s}")
    }
}

/// Normalise a raw image reference against `proxy_path`.
pub fn normalize_with(raw: &str, proxy_path: &str) -> String {
    let s = raw.trim();
    if let Some(upstream) = proxied_upstream(s, proxy_path) {
        return wrap(&absolutize(upstream.trim()), proxy_path);
    }
    let s = decode_component(s);
    let s = s.trim();
    if let Some(upstream) = proxied_upstream(s, proxy_path) {
        return wrap(&absolutize(upstream.trim()), proxy_path);
    }
    if is_same_origin_path(s) {
        return s.to_string();
    }
    wrap(&absolutize(s), proxy_path)
}

/// [`normalize_with`] against the default [`PROXY_PATH`].
pub fn normalize(raw: &str) -> String {
    normalize_with(raw, PROXY_PATH)
}

/// Classify a normalised URI.
pub fn classify(uri: &str, proxy_path: &str) -> ImageUri {
    match proxied_upstream(uri, proxy_path) {
        Some(upstream) => ImageUri::Proxied(upstream),
        None => ImageUri::Local(uri.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_urls_are_proxied() {
        assert_eq!(
            normalize("https://cdn.example.com/a.png"),
            "/api/proxy?url=https%3A%2F%2Fcdn.example.com%2Fa.png"
        );
        assert!(normalize("HTTP://cdn.example.com/a.png").starts_with("/api/proxy?url="));
    }

    #[test]
    fn bare_hosts_get_https() {
        assert_eq!(
            normalize("cdn.example.com/a.png"),
            "/api/proxy?url=https%3A%2F%2Fcdn.example.com%2Fa.png"
        );
        assert_eq!(normalize("//cdn.example.com/a.png"), normalize("https://cdn.example.com/a.png"));
    }

    #[test]
    fn same_origin_paths_pass_through() {
        assert_eq!(normalize("  /img/coat.png "), "/img/coat.png");
    }

    #[test]
    fn encoded_input_is_decoded_first() {
        assert_eq!(
            normalize("https%3A%2F%2Fcdn.example.com%2Fa.png"),
            normalize("https://cdn.example.com/a.png")
        );
    }

    #[test]
    fn normalisation_is_idempotent() {
        for raw in ["https://cdn.example.com/a.png", "cdn.example.com/a b.png", "/local.png", "http://x.io/?q=1&r=2"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "raw = {raw}");
        }
    }

    #[test]
    fn decoded_proxy_form_is_not_double_wrapped() {
        assert_eq!(
            normalize("/api/proxy?url=https://cdn.example.com/a.png"),
            normalize("https://cdn.example.com/a.png")
        );
    }

    #[test]
    fn classify_extracts_upstream() {
        let uri = normalize("https://cdn.example.com/a.png?v=2");
        assert_eq!(classify(&uri, PROXY_PATH), ImageUri::Proxied("https://cdn.example.com/a.png?v=2".into()));
        assert_eq!(classify("/a.png", PROXY_PATH), ImageUri::Local("/a.png".into()));
    }

    #[test]
    fn malformed_escapes_are_kept() {
        assert_eq!(decode_component("%E0%A4%A"), "%E0%A4%A");
    }
}
