use std::sync::Arc;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::ad_detail::ItemDetailExtractor;
use crate::config::CONFIG;
use crate::data_models::{
    AdDetail, AdSlot, AdSummary, Category, DetailLevel, PageItems, ResponseItems, SearchQuery,
    SearchResponse, SearchResultPage,
};
use crate::encoding::normalize_to_utf8;
use crate::error::{ExtractError, Result};
use crate::fetcher::AdFetcher;
use crate::query_codec::QueryCodec;
use crate::search_results::ResultPageExtractor;

/// Runs the search pipeline: query decoding, results extraction, navigation
/// and, in full-detail mode, one fetch and extraction per ad.
///
/// Holds no per-call state, so one coordinator can serve concurrent calls.
pub struct ExtractionCoordinator {
    codec: QueryCodec,
    results: ResultPageExtractor,
    details: ItemDetailExtractor,
    fetcher: Arc<dyn AdFetcher>,
    max_concurrent_fetches: usize,
}

impl ExtractionCoordinator {
    pub fn new(
        codec: QueryCodec,
        results: ResultPageExtractor,
        details: ItemDetailExtractor,
        fetcher: Arc<dyn AdFetcher>,
        max_concurrent_fetches: usize,
    ) -> Self {
        Self {
            codec,
            results,
            details,
            fetcher,
            max_concurrent_fetches: max_concurrent_fetches.max(1),
        }
    }

    pub fn from_config(fetcher: Arc<dyn AdFetcher>) -> Result<Self> {
        Ok(Self::new(
            QueryCodec::from_config()?,
            ResultPageExtractor::from_config()?,
            ItemDetailExtractor::from_config()?,
            fetcher,
            CONFIG.max_concurrent_fetches,
        ))
    }

    pub fn codec(&self) -> &QueryCodec {
        &self.codec
    }

    /// Fetches the results page behind `url` and runs the pipeline over it.
    pub async fn search(&self, url: &str, level: DetailLevel) -> Result<SearchResponse> {
        // fail on a bad url before touching the network
        self.codec.parse(url)?;
        let raw = self.fetcher.fetch_by_url(url).await?;
        let html = normalize_to_utf8(&raw).into_owned();
        self.run_search(&html, url, level).await
    }

    /// Only a bad `url` or a results page without its count anchor fail the
    /// call. Per-ad problems in [`DetailLevel::Full`] end up as
    /// [`AdSlot::Failed`] entries.
    pub async fn run_search(
        &self,
        raw_html: &str,
        url: &str,
        level: DetailLevel,
    ) -> Result<SearchResponse> {
        let (query, page) = self.extract_page(raw_html, url, level)?;
        let navigation = self.codec.build_navigation(&query, page.counts.total_pages);

        let ads = match (level, page.items) {
            (DetailLevel::Full, PageItems::Summaries(summaries)) => {
                ResponseItems::Details(self.fetch_details(&summaries, query.category.as_ref()).await)
            }
            (_, items) => ResponseItems::from(items),
        };

        log::info!(
            "search page {} of {}: {} ads listed out of {}",
            query.page,
            page.counts.total_pages,
            ads.len(),
            page.counts.total_ads
        );

        Ok(SearchResponse {
            navigation,
            total_ads: page.counts.total_ads,
            total_pages: page.counts.total_pages,
            ads_per_page: page.counts.ads_per_page,
            page: query.page,
            category: query.category,
            location: query.location,
            search_area: query.search_area,
            sort_by: query.sort,
            kind: query.kind,
            ads,
            soft_failures: page.soft_failures,
        })
    }

    /// [`Self::run_search`] that gives up as soon as `cancel` fires. Fetches
    /// still in flight are dropped and their results discarded.
    pub async fn run_search_until_cancelled(
        &self,
        raw_html: &str,
        url: &str,
        level: DetailLevel,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("search for {url} cancelled");
                Err(ExtractError::Cancelled)
            }
            response = self.run_search(raw_html, url, level) => response,
        }
    }

    /// Only addresses on the site host are fetched.
    pub async fn ad_by_url(&self, url: &str) -> Result<AdDetail> {
        self.codec.site_url(url)?;
        let raw = self.fetcher.fetch_by_url(url).await?;
        self.details.extract(&raw, url)
    }

    pub async fn ad_by_id(&self, id: &str, category: &str) -> Result<AdDetail> {
        let raw = self.fetcher.fetch_by_id(id, category).await?;
        self.details.extract(&raw, &self.codec.ad_url(category, id))
    }

    // Keeps the parsed document out of any await point.
    fn extract_page(
        &self,
        raw_html: &str,
        url: &str,
        level: DetailLevel,
    ) -> Result<(SearchQuery, SearchResultPage)> {
        let query = self.codec.parse(url)?;
        let doc = ResultPageExtractor::parse_document(raw_html);
        let page = self.results.extract(&doc, level != DetailLevel::Ids)?;
        Ok((query, page))
    }

    /// One slot per summary, in rank order whatever order fetches finish in.
    async fn fetch_details(
        &self,
        summaries: &[AdSummary],
        category: Option<&Category>,
    ) -> Vec<AdSlot> {
        let permits = Semaphore::new(self.max_concurrent_fetches);
        let permits = &permits;
        let all = Category::All;
        let category = category.unwrap_or(&all).as_param();

        let mut pending = FuturesUnordered::new();
        for (index, summary) in summaries.iter().enumerate() {
            pending.push(async move {
                let outcome = match permits.acquire().await {
                    Ok(_permit) => self.fetch_detail(summary, category).await,
                    Err(_) => Err(ExtractError::Cancelled),
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<AdSlot>> = vec![None; summaries.len()];
        while let Some((index, outcome)) = pending.next().await {
            slots[index] = Some(match outcome {
                Ok(detail) => AdSlot::Extracted(detail),
                Err(e) => {
                    log::warn!("ad {} failed: {:#}", summaries[index].id, e);
                    AdSlot::Failed {
                        id: summaries[index].id.clone(),
                        error: e.to_string(),
                    }
                }
            });
        }

        slots
            .into_iter()
            .zip(summaries)
            .map(|(slot, summary)| {
                slot.unwrap_or_else(|| AdSlot::Failed {
                    id: summary.id.clone(),
                    error: "no result".to_string(),
                })
            })
            .collect()
    }

    async fn fetch_detail(&self, summary: &AdSummary, category: &str) -> Result<AdDetail> {
        let on_site = summary.url.as_deref().filter(|url| match self.codec.site_url(url) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("ad {} links off site, fetching by id: {e}", summary.id);
                false
            }
        });
        match on_site {
            Some(url) => {
                let raw = self.fetcher.fetch_by_url(url).await?;
                self.details.extract(&raw, url)
            }
            None => {
                let raw = self.fetcher.fetch_by_id(&summary.id, category).await?;
                self.details.extract(&raw, &self.codec.ad_url(category, &summary.id))
            }
        }
    }
}
