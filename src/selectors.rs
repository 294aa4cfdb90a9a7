//! CSS selectors for the two page kinds the extractors understand.
//!
//! Every anchor is a list of fallbacks tried in order, so a markup change on
//! the site usually only needs a new entry at the front of a list.

use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// A compiled list of fallback selectors for one anchor.
#[derive(Debug, Clone)]
pub struct SelectorSet {
    name: &'static str,
    selectors: Vec<Selector>,
}

impl SelectorSet {
    pub fn compile(name: &'static str, sources: &[String]) -> Result<Self> {
        let mut selectors = Vec::new();
        let mut errors = Vec::new();

        for source in sources {
            match Selector::parse(source) {
                Ok(selector) => selectors.push(selector),
                Err(e) => {
                    log::warn!("failed to compile {name} selector '{source}': {e}");
                    errors.push(format!("'{source}': {e}"));
                }
            }
        }

        if selectors.is_empty() {
            return Err(ExtractError::InvalidSelector {
                selector: name.to_string(),
                reason: if errors.is_empty() {
                    "no selectors configured".to_string()
                } else {
                    errors.join(", ")
                },
            });
        }
        Ok(Self { name, selectors })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// First match of the first selector that matches anything under `scope`.
    pub fn first<'a>(&self, scope: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.selectors
            .iter()
            .find_map(|selector| scope.select(selector).next())
    }

    /// All matches, in document order, of the first selector that matches
    /// anything under `scope`.
    pub fn all<'a>(&self, scope: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for selector in &self.selectors {
            let found: Vec<ElementRef<'a>> = scope.select(selector).collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    pub fn matches_any(&self, scope: ElementRef<'_>) -> bool {
        self.first(scope).is_some()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPageSelectors {
    /// The "N annonces" counter. Its absence means the page layout changed.
    pub total_count: Vec<String>,
    /// Pagination block, optionally carrying `data-ads-per-page`.
    pub pagination: Vec<String>,
    /// One node per ad, in displayed rank order.
    pub ad_node: Vec<String>,
    pub ad_link: Vec<String>,
    /// Element carrying `data-savead-id`.
    pub save_ad: Vec<String>,
    pub title: Vec<String>,
    pub price: Vec<String>,
    pub thumbnail: Vec<String>,
    pub location: Vec<String>,
    pub published: Vec<String>,
    pub pro_badge: Vec<String>,
}

impl Default for ResultPageSelectors {
    fn default() -> Self {
        Self {
            total_count: strings(&[
                "a.tabsSwitch span.tabsSwitchNumbers",
                "span.tabsSwitchNumbers",
                "[data-qa-id=\"results_count\"]",
            ]),
            pagination: strings(&["#pagination", "nav.pagination", ".pagination"]),
            ad_node: strings(&[
                "section.tabsContent li[itemtype=\"http://schema.org/Offer\"]",
                "[itemtype=\"http://schema.org/Offer\"]",
                "li[data-qa-id=\"aditem_container\"]",
            ]),
            ad_link: strings(&["a.list_item", "a[href*=\".htm\"]"]),
            save_ad: strings(&["[data-savead-id]"]),
            title: strings(&["[itemprop=\"name\"]", ".item_title"]),
            price: strings(&["[itemprop=\"price\"]", ".item_price"]),
            thumbnail: strings(&[
                ".item_imagePic [data-imgsrc]",
                ".item_imagePic img",
                "img",
            ]),
            location: strings(&["[itemprop=\"availableAtOrFrom\"]", ".item_location"]),
            published: strings(&["[itemprop=\"availabilityStarts\"]", ".item_date"]),
            pro_badge: strings(&[".ispro"]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdDetailSelectors {
    pub title: Vec<String>,
    pub price: Vec<String>,
    pub description: Vec<String>,
    /// Image nodes. Comma groups keep document order across gallery parts.
    pub images: Vec<String>,
    /// A label/value pair container in the properties table.
    pub attribute_row: Vec<String>,
    pub attribute_label: Vec<String>,
    pub attribute_value: Vec<String>,
    pub location: Vec<String>,
    pub poster: Vec<String>,
    pub published: Vec<String>,
    pub breadcrumb_link: Vec<String>,
    pub canonical: Vec<String>,
    pub pro_badge: Vec<String>,
}

impl Default for AdDetailSelectors {
    fn default() -> Self {
        Self {
            title: strings(&["h1[itemprop=\"name\"]", "h1.no-border", "h1"]),
            price: strings(&["h2.item_price[itemprop=\"price\"]", "[itemprop=\"price\"]", ".item_price"]),
            description: strings(&["p[itemprop=\"description\"]", "[itemprop=\"description\"]"]),
            images: strings(&[
                ".item_image [data-imgsrc], .thumbnails [data-imgsrc]",
                "meta[itemprop=\"image\"]",
            ]),
            attribute_row: strings(&["section.properties h2.clearfix", "h2.clearfix", ".properties .line"]),
            attribute_label: strings(&["span.property", ".property"]),
            attribute_value: strings(&["span.value", ".value"]),
            location: strings(&["[itemprop=\"address\"]", ".line_city .value"]),
            poster: strings(&[
                "[itemprop=\"seller\"] [itemprop=\"name\"]",
                ".line_pro .name",
                ".owner .name",
            ]),
            published: strings(&["[itemprop=\"availabilityStarts\"]", "p.line_pro"]),
            breadcrumb_link: strings(&["nav.breadcrumbsNav a", ".breadcrumbsNav a"]),
            canonical: strings(&["link[rel=\"canonical\"]"]),
            pro_badge: strings(&[".ispro", "[data-qa-id=\"adview_pro_badge\"]"]),
        }
    }
}

#[test]
fn test_default_selectors_compile() {
    let list = ResultPageSelectors::default();
    assert!(SelectorSet::compile("ad_node", &list.ad_node).is_ok());
    let detail = AdDetailSelectors::default();
    assert!(SelectorSet::compile("images", &detail.images).is_ok());
    assert!(SelectorSet::compile("attribute_row", &detail.attribute_row).is_ok());
}

#[test]
fn test_selector_set_rejects_all_invalid() {
    let err = SelectorSet::compile("broken", &strings(&["[[[", ""])).unwrap_err();
    assert!(matches!(err, ExtractError::InvalidSelector { .. }));
}
