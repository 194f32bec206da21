// Where products come from: a deep-link query (`?img=..&name=..&brand=..&type=..`)
// or the manual "add by URL" form. Both run the image through the same
// URI rule before a Product is built.

use chrono::Utc;

use crate::image_url::{decode_component, normalize_with};
use crate::layer::{Category, Product};

const LINKED_BRAND: &str = "Linked";
const MANUAL_BRAND: &str = "Manual";
const DEFAULT_NAME: &str = "Product";

/// Decoded deep-link parameters. `img` is required.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeepLink {
    pub img: String,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub kind: Option<String>,
}

impl DeepLink {
    /// Parse a query string; `None` when there's no non-empty `img`.
    pub fn parse(query: &str) -> Option<Self> {
        let query = query.trim().trim_start_matches('?');
        let mut link = DeepLink::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = decode_component(&value.replace('+', " "));
            match key {
                "img" => link.img = value,
                "name" => link.name = non_empty(value),
                "brand" => link.brand = non_empty(value),
                "type" => link.kind = non_empty(value),
                other => log::debug!("ignoring deep-link parameter '{other}'"),
            }
        }
        if link.img.trim().is_empty() { None } else { Some(link) }
    }

    pub fn into_product(self, proxy_path: &str) -> Product {
        Product {
            id: format!("linked-{}", Utc::now().timestamp_millis()),
            brand: self.brand.unwrap_or_else(|| LINKED_BRAND.to_string()),
            name: self.name.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            category: Category::parse(self.kind.as_deref().unwrap_or_default()),
            image_source: normalize_with(&self.img, proxy_path),
        }
    }
}

/// The manual add form.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManualEntry {
    pub url: String,
    pub name: String,
    pub brand: String,
    pub kind: String,
}

impl ManualEntry {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Self::default() }
    }

    /// `None` for an empty URL field: adding is then a no-op.
    pub fn to_product(&self, proxy_path: &str) -> Option<Product> {
        if self.url.trim().is_empty() {
            return None;
        }
        Some(Product {
            id: format!("manual-{}", Utc::now().timestamp_millis()),
            brand: or_default(&self.brand, MANUAL_BRAND),
            name: or_default(&self.name, DEFAULT_NAME),
            category: Category::parse(&self.kind),
            image_source: normalize_with(&self.url, proxy_path),
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() { None } else { Some(s) }
}

fn or_default(s: &str, default: &str) -> String {
    if s.trim().is_empty() { default.to_string() } else { s.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_url::PROXY_PATH;

    #[test]
    fn parses_full_deep_link() {
        let link = DeepLink::parse("?img=https%3A%2F%2Fcdn.example.com%2Fcoat.png&name=Kaban&brand=Demo&type=outer").unwrap();
        assert_eq!(link.img, "https://cdn.example.com/coat.png");
        let p = link.into_product(PROXY_PATH);
        assert_eq!(p.name, "Kaban");
        assert_eq!(p.brand, "Demo");
        assert_eq!(p.category, Category::Outer);
        assert_eq!(p.image_source, "/api/proxy?url=https%3A%2F%2Fcdn.example.com%2Fcoat.png");
        assert!(p.id.starts_with("linked-"));
    }

    #[test]
    fn missing_img_yields_nothing() {
        assert!(DeepLink::parse("name=x&brand=y").is_none());
        assert!(DeepLink::parse("img=").is_none());
        assert!(DeepLink::parse("").is_none());
    }

    #[test]
    fn deep_link_defaults() {
        let p = DeepLink::parse("img=/coat.png").unwrap().into_product(PROXY_PATH);
        assert_eq!(p.brand, "Linked");
        assert_eq!(p.name, "Product");
        assert_eq!(p.category, Category::Top);
        assert_eq!(p.image_source, "/coat.png");
    }

    #[test]
    fn plus_is_a_space() {
        let link = DeepLink::parse("img=/a.png&name=Wool+Coat").unwrap();
        assert_eq!(link.name.as_deref(), Some("Wool Coat"));
    }

    #[test]
    fn empty_manual_url_is_a_noop() {
        assert!(ManualEntry::from_url("   ").to_product(PROXY_PATH).is_none());
    }

    #[test]
    fn manual_entry_defaults_and_normalises() {
        let p = ManualEntry::from_url("cdn.site.com/p.png").to_product(PROXY_PATH).unwrap();
        assert_eq!(p.brand, "Manual");
        assert_eq!(p.name, "Product");
        assert!(p.image_source.starts_with("/api/proxy?url=https%3A%2F%2F"));
    }
}
