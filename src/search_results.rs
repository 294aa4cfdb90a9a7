use reqwest::Url;
use scraper::{ElementRef, Html};

use crate::config::CONFIG;
use crate::data_models::{
    AdId, AdSummary, Extracted, PageCounts, PageItems, SearchResultPage, SoftFailure,
};
use crate::error::{ExtractError, Result};
use crate::normalize::{
    absolutize, ad_id_from_url, collapse_whitespace, element_text, parse_amount,
    parse_content_amount, parse_count, parse_published_at,
};
use crate::selectors::{ResultPageSelectors, SelectorSet};

const ADS_PER_PAGE_ATTR: &str = "data-ads-per-page";
const SAVE_AD_ATTR: &str = "data-savead-id";

/// Pulls counts and ad listings out of one search results page.
pub struct ResultPageExtractor {
    base: Url,
    default_ads_per_page: u32,
    total_count: SelectorSet,
    pagination: SelectorSet,
    ad_node: SelectorSet,
    ad_link: SelectorSet,
    save_ad: SelectorSet,
    title: SelectorSet,
    price: SelectorSet,
    thumbnail: SelectorSet,
    location: SelectorSet,
    published: SelectorSet,
    pro_badge: SelectorSet,
}

impl ResultPageExtractor {
    pub fn new(site_host: &str, default_ads_per_page: u32) -> Result<Self> {
        Self::with_selectors(site_host, default_ads_per_page, &ResultPageSelectors::default())
    }

    pub fn from_config() -> Result<Self> {
        Self::new(&CONFIG.site_host, CONFIG.ads_per_page)
    }

    pub fn with_selectors(
        site_host: &str,
        default_ads_per_page: u32,
        selectors: &ResultPageSelectors,
    ) -> Result<Self> {
        let base = Url::parse(&format!("https://{site_host}/"))
            .map_err(|e| ExtractError::malformed_url(site_host, e.to_string()))?;
        Ok(Self {
            base,
            default_ads_per_page: default_ads_per_page.max(1),
            total_count: SelectorSet::compile("total_count", &selectors.total_count)?,
            pagination: SelectorSet::compile("pagination", &selectors.pagination)?,
            ad_node: SelectorSet::compile("ad_node", &selectors.ad_node)?,
            ad_link: SelectorSet::compile("ad_link", &selectors.ad_link)?,
            save_ad: SelectorSet::compile("save_ad", &selectors.save_ad)?,
            title: SelectorSet::compile("title", &selectors.title)?,
            price: SelectorSet::compile("price", &selectors.price)?,
            thumbnail: SelectorSet::compile("thumbnail", &selectors.thumbnail)?,
            location: SelectorSet::compile("location", &selectors.location)?,
            published: SelectorSet::compile("published", &selectors.published)?,
            pro_badge: SelectorSet::compile("pro_badge", &selectors.pro_badge)?,
        })
    }

    pub fn parse_document(raw_html: &str) -> Html {
        Html::parse_document(raw_html)
    }

    /// Counts and either summaries or bare ids, depending on `with_summaries`.
    pub fn extract(&self, doc: &Html, with_summaries: bool) -> Result<SearchResultPage> {
        let counts = self.extract_counts(doc)?;
        let (items, soft_failures) = if with_summaries {
            let extracted = self.extract_summaries(doc);
            (PageItems::Summaries(extracted.items), extracted.soft_failures)
        } else {
            let extracted = self.extract_ids(doc);
            (PageItems::Ids(extracted.items), extracted.soft_failures)
        };
        Ok(SearchResultPage {
            counts,
            items,
            soft_failures,
        })
    }

    /// A missing counter is a [`ExtractError::Structure`]; a counter reading
    /// zero is a valid empty result.
    pub fn extract_counts(&self, doc: &Html) -> Result<PageCounts> {
        let counter = self
            .total_count
            .first(doc.root_element())
            .ok_or_else(|| ExtractError::structure(self.total_count.name(), "search results page"))?;
        let text = counter.text().collect::<String>();
        let total_ads = parse_count(&text).ok_or_else(|| {
            ExtractError::structure(
                self.total_count.name(),
                &format!("search results page (unreadable count {:?})", text.trim()),
            )
        })?;
        Ok(PageCounts::new(total_ads, self.ads_per_page(doc)))
    }

    /// Ad summaries in displayed order. Nodes without an id are skipped and
    /// reported in `soft_failures`; missing optional fields are left empty.
    pub fn extract_summaries(&self, doc: &Html) -> Extracted<AdSummary> {
        self.collect(doc, |node| self.summarize(node))
    }

    pub fn extract_ids(&self, doc: &Html) -> Extracted<AdId> {
        self.collect(doc, |node| self.ad_id(node))
    }

    fn collect<T>(&self, doc: &Html, extract: impl Fn(ElementRef<'_>) -> Option<T>) -> Extracted<T> {
        let limit = self.ads_per_page(doc) as usize;
        let mut extracted = Extracted::default();

        for (index, node) in self.ad_node.all(doc.root_element()).into_iter().enumerate() {
            match extract(node) {
                Some(item) => extracted.items.push(item),
                None => {
                    log::warn!("skipping ad node {index}: no ad id found");
                    extracted.soft_failures.push(SoftFailure {
                        index,
                        reason: "missing ad id".to_string(),
                    });
                }
            }
        }

        if extracted.items.len() > limit {
            log::warn!(
                "page lists {} ads but pages hold {limit}, dropping the overflow",
                extracted.items.len()
            );
            extracted.items.truncate(limit);
        }
        extracted
    }

    fn ads_per_page(&self, doc: &Html) -> u32 {
        self.pagination
            .first(doc.root_element())
            .and_then(|p| p.value().attr(ADS_PER_PAGE_ATTR))
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(self.default_ads_per_page)
    }

    fn ad_id(&self, node: ElementRef<'_>) -> Option<AdId> {
        let saved = node.value().attr(SAVE_AD_ATTR).or_else(|| {
            self.save_ad
                .first(node)
                .and_then(|e| e.value().attr(SAVE_AD_ATTR))
        });
        if let Some(id) = saved.map(str::trim).filter(|id| !id.is_empty()) {
            return Some(id.to_string());
        }
        self.link(node).and_then(ad_id_from_url)
    }

    fn link<'a>(&self, node: ElementRef<'a>) -> Option<&'a str> {
        if let Some(href) = node.value().attr("href") {
            return Some(href);
        }
        self.ad_link.first(node).and_then(|a| a.value().attr("href"))
    }

    fn summarize(&self, node: ElementRef<'_>) -> Option<AdSummary> {
        let id = self.ad_id(node)?;
        let link = self.link(node);

        let title = self.title.first(node).and_then(element_text).or_else(|| {
            self.ad_link
                .first(node)
                .and_then(|a| a.value().attr("title"))
                .map(collapse_whitespace)
                .filter(|t| !t.is_empty())
        });

        let price = self.price.first(node).and_then(|p| {
            p.value()
                .attr("content")
                .and_then(parse_content_amount)
                .or_else(|| parse_amount(&p.text().collect::<String>()))
        });

        let thumbnail_url = self.thumbnail.first(node).and_then(|img| {
            let value = img.value();
            value
                .attr("data-imgsrc")
                .or_else(|| value.attr("data-src"))
                .or_else(|| value.attr("src"))
                .and_then(|src| absolutize(src, &self.base))
        });

        let published_at = self.published.first(node).and_then(|p| {
            let text = p.text().collect::<String>();
            parse_published_at(p.value().attr("content"), Some(&text))
        });

        Some(AdSummary {
            id,
            url: link.and_then(|href| absolutize(href, &self.base)),
            title,
            price,
            thumbnail_url,
            location_label: self.location.first(node).and_then(element_text),
            published_at,
            is_pro: self.pro_badge.matches_any(node),
        })
    }
}
