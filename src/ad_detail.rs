use indexmap::IndexMap;
use reqwest::Url;
use scraper::{ElementRef, Html};

use crate::config::CONFIG;
use crate::data_models::{AdDetail, Category};
use crate::encoding::normalize_to_utf8;
use crate::error::{ExtractError, Result};
use crate::normalize::{
    absolutize, ad_id_from_url, element_text, parse_amount, parse_content_amount,
    parse_published_at, text_with_breaks,
};
use crate::selectors::{AdDetailSelectors, SelectorSet};

const CONTEXT: &str = "ad detail page";

/// Builds an [`AdDetail`] from one ad page.
pub struct ItemDetailExtractor {
    base: Url,
    title: SelectorSet,
    price: SelectorSet,
    description: SelectorSet,
    images: SelectorSet,
    attribute_row: SelectorSet,
    attribute_label: SelectorSet,
    attribute_value: SelectorSet,
    location: SelectorSet,
    poster: SelectorSet,
    published: SelectorSet,
    breadcrumb_link: SelectorSet,
    canonical: SelectorSet,
    pro_badge: SelectorSet,
}

impl ItemDetailExtractor {
    pub fn new(site_host: &str) -> Result<Self> {
        Self::with_selectors(site_host, &AdDetailSelectors::default())
    }

    pub fn from_config() -> Result<Self> {
        Self::new(&CONFIG.site_host)
    }

    pub fn with_selectors(site_host: &str, selectors: &AdDetailSelectors) -> Result<Self> {
        let base = Url::parse(&format!("https://{site_host}/"))
            .map_err(|e| ExtractError::malformed_url(site_host, e.to_string()))?;
        Ok(Self {
            base,
            title: SelectorSet::compile("title", &selectors.title)?,
            price: SelectorSet::compile("price", &selectors.price)?,
            description: SelectorSet::compile("description", &selectors.description)?,
            images: SelectorSet::compile("images", &selectors.images)?,
            attribute_row: SelectorSet::compile("attribute_row", &selectors.attribute_row)?,
            attribute_label: SelectorSet::compile("attribute_label", &selectors.attribute_label)?,
            attribute_value: SelectorSet::compile("attribute_value", &selectors.attribute_value)?,
            location: SelectorSet::compile("location", &selectors.location)?,
            poster: SelectorSet::compile("poster", &selectors.poster)?,
            published: SelectorSet::compile("published", &selectors.published)?,
            breadcrumb_link: SelectorSet::compile("breadcrumb_link", &selectors.breadcrumb_link)?,
            canonical: SelectorSet::compile("canonical", &selectors.canonical)?,
            pro_badge: SelectorSet::compile("pro_badge", &selectors.pro_badge)?,
        })
    }

    /// Extracts an ad from raw bytes. The encoding is normalized to UTF-8
    /// before parsing so accented text survives Latin-1 pages.
    pub fn extract(&self, raw: &[u8], source_url: &str) -> Result<AdDetail> {
        let html = normalize_to_utf8(raw);
        self.extract_str(&html, source_url)
    }

    pub fn extract_str(&self, html: &str, source_url: &str) -> Result<AdDetail> {
        let doc = Html::parse_document(html);
        let root = doc.root_element();

        let title = self
            .title
            .first(root)
            .and_then(element_text)
            .ok_or_else(|| ExtractError::structure(self.title.name(), CONTEXT))?;

        // The anchor is mandatory, its value is not: some ads have no price.
        let price_node = self
            .price
            .first(root)
            .ok_or_else(|| ExtractError::structure(self.price.name(), CONTEXT))?;
        let price = price_node
            .value()
            .attr("content")
            .and_then(parse_content_amount)
            .or_else(|| parse_amount(&price_node.text().collect::<String>()));

        let canonical = self
            .canonical
            .first(root)
            .and_then(|link| link.value().attr("href"))
            .and_then(|href| absolutize(href, &self.base));
        let url = if source_url.trim().is_empty() {
            canonical.clone().unwrap_or_default()
        } else {
            source_url.trim().to_string()
        };

        let id = ad_id_from_url(&url)
            .or_else(|| canonical.as_deref().and_then(ad_id_from_url))
            .ok_or_else(|| ExtractError::structure("ad id", CONTEXT))?;

        let published_at = self.published.first(root).and_then(|p| {
            let text = p.text().collect::<String>();
            parse_published_at(p.value().attr("content"), Some(&text))
        });

        log::debug!("extracted ad {id}: {title}");
        Ok(AdDetail {
            id,
            category: self.category(&url, root),
            url,
            title,
            description: self.description.first(root).and_then(text_with_breaks),
            price,
            images: self.images(root),
            attributes: self.attributes(root),
            location_label: self.location.first(root).and_then(element_text),
            poster_label: self.poster.first(root).and_then(element_text),
            published_at,
            is_pro: self.pro_badge.matches_any(root),
        })
    }

    /// Every label present in the properties table, in document order. The
    /// set varies per category so nothing is assumed about which labels exist.
    fn attributes(&self, root: ElementRef<'_>) -> IndexMap<String, String> {
        let mut attributes = IndexMap::new();
        for row in self.attribute_row.all(root) {
            let Some(label) = self.attribute_label.first(row).and_then(element_text) else {
                continue;
            };
            let label = label.trim_end_matches(':').trim_end().to_string();
            if label.is_empty() {
                continue;
            }
            let value = self
                .attribute_value
                .first(row)
                .and_then(element_text)
                .unwrap_or_default();
            if attributes.contains_key(&label) {
                log::debug!("duplicate attribute '{label}', keeping the first value");
                continue;
            }
            attributes.insert(label, value);
        }
        attributes
    }

    /// Image URLs in document order. Duplicates are kept: the first entry is
    /// the primary image and the gallery may repeat it.
    fn images(&self, root: ElementRef<'_>) -> Vec<String> {
        self.images
            .all(root)
            .into_iter()
            .filter_map(|node| {
                let value = node.value();
                value
                    .attr("data-imgsrc")
                    .or_else(|| value.attr("data-src"))
                    .or_else(|| value.attr("content"))
                    .or_else(|| value.attr("src"))
                    .and_then(|src| absolutize(src, &self.base))
            })
            .collect()
    }

    /// Category from the `/<category>/<id>.htm` path, falling back to the
    /// first breadcrumb link that points at a known category.
    fn category(&self, url: &str, root: ElementRef<'_>) -> Option<Category> {
        if let Some(category) = category_from_ad_path(url, &self.base) {
            return Some(category);
        }
        self.breadcrumb_link
            .all(root)
            .into_iter()
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| absolutize(href, &self.base))
            .filter_map(|href| Url::parse(&href).ok())
            .find_map(|href| {
                let first = href.path_segments()?.next()?.to_string();
                let category = Category::from_param(&first);
                (category.is_known() && category != Category::All).then_some(category)
            })
    }
}

fn category_from_ad_path(url: &str, base: &Url) -> Option<Category> {
    let url = base.join(url).ok()?;
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [category, file] if file.ends_with(".htm") => Some(Category::from_param(category)),
        _ => None,
    }
}

#[test]
fn test_category_from_ad_path() {
    let base = Url::parse("https://www.leboncoin.fr/").unwrap();
    assert_eq!(
        category_from_ad_path("https://www.leboncoin.fr/voitures/1034567.htm", &base),
        Some(Category::Cars)
    );
    assert_eq!(
        category_from_ad_path("/jardinage/42.htm", &base),
        Some(Category::Other("jardinage".to_string()))
    );
    assert_eq!(category_from_ad_path("/recherche", &base), None);
}
