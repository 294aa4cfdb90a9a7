use reqwest::Url;

use crate::config::CONFIG;
use crate::data_models::{AdType, Category, Location, Navigation, SearchArea, SearchQuery, SortType};
use crate::error::{ExtractError, Result};

/// Query parameter names, in the order `encode` writes them.
pub mod params {
    pub const CATEGORY: &str = "category";
    pub const LOCATION: &str = "location";
    pub const SEARCH_AREA: &str = "search_area";
    pub const SORT: &str = "sort";
    pub const TYPE: &str = "type";
    pub const PAGE: &str = "page";
}

/// Decodes search URLs into [`SearchQuery`] values and encodes them back.
///
/// Encoding is lossless for anything `parse` produced: unknown parameters
/// ride along in `SearchQuery::extra` and are written after the known ones.
#[derive(Debug, Clone)]
pub struct QueryCodec {
    base: Url,
    strict: bool,
}

impl QueryCodec {
    pub fn new(site_host: &str, strict: bool) -> Result<Self> {
        let base = Url::parse(&format!("https://{site_host}/"))
            .map_err(|e| ExtractError::malformed_url(site_host, e.to_string()))?;
        if base.host_str().is_none() {
            return Err(ExtractError::malformed_url(site_host, "site host is empty"));
        }
        Ok(Self { base, strict })
    }

    pub fn from_config() -> Result<Self> {
        Self::new(&CONFIG.site_host, CONFIG.strict_query)
    }

    pub fn site_host(&self) -> &str {
        self.base.host_str().unwrap_or_default()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// `www.` is optional on both sides.
    pub fn is_site_host(&self, host: &str) -> bool {
        let strip = |h: &str| {
            let h = h.trim_end_matches('.');
            h.strip_prefix("www.").unwrap_or(h).to_ascii_lowercase()
        };
        strip(host) == strip(self.site_host())
    }

    /// Parses `url` and checks it is an http(s) address on the site host.
    pub fn site_url(&self, url: &str) -> Result<Url> {
        let parsed = Url::parse(url.trim()).map_err(|e| ExtractError::malformed_url(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ExtractError::malformed_url(
                url,
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| ExtractError::malformed_url(url, "missing host"))?;
        if !self.is_site_host(host) {
            return Err(ExtractError::malformed_url(
                url,
                format!("host '{host}' does not belong to {}", self.site_host()),
            ));
        }
        Ok(parsed)
    }

    pub fn parse(&self, url: &str) -> Result<SearchQuery> {
        let parsed = self.site_url(url)?;
        let mut query = SearchQuery::new(parsed.path());
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                // open-ended: unknown categories are never rejected
                params::CATEGORY => query.category = Some(Category::from_param(&value)),
                params::LOCATION => query.location = Some(Location::from_param(&value)),
                params::SEARCH_AREA => {
                    let area = SearchArea::from_param(&value);
                    self.check_known(url, params::SEARCH_AREA, &value, area.is_known())?;
                    query.search_area = Some(area);
                }
                params::SORT => {
                    let sort = SortType::from_param(&value);
                    self.check_known(url, params::SORT, &value, sort.is_known())?;
                    query.sort = Some(sort);
                }
                params::TYPE => {
                    let kind = AdType::from_param(&value);
                    self.check_known(url, params::TYPE, &value, kind.is_known())?;
                    query.kind = Some(kind);
                }
                params::PAGE => query.page = self.parse_page(url, &value)?,
                _ => query.extra.push((key.into_owned(), value.into_owned())),
            }
        }
        Ok(query)
    }

    pub fn encode(&self, query: &SearchQuery) -> String {
        let mut url = self.base.clone();
        url.set_path(&query.path);
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(category) = &query.category {
                pairs.append_pair(params::CATEGORY, category.as_param());
            }
            if let Some(location) = &query.location {
                pairs.append_pair(params::LOCATION, &location.to_param());
            }
            if let Some(area) = &query.search_area {
                pairs.append_pair(params::SEARCH_AREA, area.as_param());
            }
            if let Some(sort) = &query.sort {
                pairs.append_pair(params::SORT, sort.as_param());
            }
            if let Some(kind) = &query.kind {
                pairs.append_pair(params::TYPE, kind.as_param());
            }
            pairs.append_pair(params::PAGE, &query.page.max(1).to_string());
            for (key, value) in &query.extra {
                pairs.append_pair(key, value);
            }
        }
        url.to_string()
    }

    /// Links for the first, previous, next and last pages of `query`.
    /// Every substituted page lies in `[1, total_pages]`.
    pub fn build_navigation(&self, query: &SearchQuery, total_pages: u64) -> Navigation {
        if total_pages == 0 {
            return Navigation::default();
        }
        let last = u32::try_from(total_pages).unwrap_or(u32::MAX);
        let page = query.page.max(1);
        let link = |p: u32| self.encode(&query.with_page(p));

        Navigation {
            first: Some(link(1)),
            prev: if page > 1 {
                Some(link((page - 1).min(last)))
            } else {
                None
            },
            next: if page < last { Some(link(page + 1)) } else { None },
            last: Some(link(last)),
        }
    }

    /// Canonical detail page URL for an ad, `https://<host>/<category>/<id>.htm`.
    pub fn ad_url(&self, category: &str, id: &str) -> String {
        let mut url = self.base.clone();
        url.set_path(&format!("/{category}/{id}.htm"));
        url.to_string()
    }

    fn check_known(&self, url: &str, key: &str, value: &str, known: bool) -> Result<()> {
        if known {
            return Ok(());
        }
        if self.strict {
            return Err(ExtractError::malformed_url(
                url,
                format!("illegal value '{value}' for '{key}'"),
            ));
        }
        log::debug!("keeping unrecognized {key} value '{value}' verbatim");
        Ok(())
    }

    fn parse_page(&self, url: &str, value: &str) -> Result<u32> {
        match value.trim().parse::<u32>() {
            Ok(page) if page >= 1 => Ok(page),
            _ if self.strict => Err(ExtractError::malformed_url(
                url,
                format!("page must be a positive integer, got '{value}'"),
            )),
            _ => {
                log::warn!("invalid page '{value}' in {url}, falling back to page 1");
                Ok(1)
            }
        }
    }
}

#[test]
fn test_site_host_ignores_www_and_case() {
    let codec = QueryCodec::new("www.leboncoin.fr", false).unwrap();
    assert!(codec.is_site_host("www.leboncoin.fr"));
    assert!(codec.is_site_host("leboncoin.fr"));
    assert!(codec.is_site_host("WWW.LeBonCoin.fr"));
    assert!(!codec.is_site_host("api.leboncoin.fr"));
    assert!(!codec.is_site_host("leboncoin.fr.evil.com"));
}
