use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use adharvest::coordinator::ExtractionCoordinator;
use adharvest::data_models::{AdSlot, Category, DetailLevel, Location, ResponseItems};
use adharvest::error::ExtractError;
use tokio_util::sync::CancellationToken;

mod test_helpers {
    use super::*;
    use adharvest::ad_detail::ItemDetailExtractor;
    use adharvest::error::FetchError;
    use adharvest::fetcher::AdFetcher;
    use adharvest::query_codec::QueryCodec;
    use adharvest::search_results::ResultPageExtractor;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub const HOST: &str = "www.leboncoin.fr";
    pub const RESULTS: &str = include_str!("fixtures/search_results.html");
    pub const INTERSTITIAL: &str = include_str!("fixtures/interstitial.html");
    pub const SEARCH_URL: &str =
        "https://www.leboncoin.fr/recherche?category=voitures&location=paris&page=2";
    pub const AD_IDS: [&str; 5] = ["1034567", "1034568", "1034569", "1034570", "1034571"];

    pub fn ad_url(id: &str) -> String {
        format!("https://www.leboncoin.fr/voitures/{id}.htm?ca=12_s")
    }

    pub fn detail_page(id: &str) -> String {
        format!(
            r#"<html><head><link rel="canonical" href="https://www.leboncoin.fr/voitures/{id}.htm"></head>
               <body><h1>Annonce {id}</h1>
               <section class="properties">
                 <h2 class="item_price clearfix" itemprop="price" content="{id}"><span class="property">Prix</span><span class="value">{id} €</span></h2>
                 <h2 class="clearfix"><span class="property">Référence</span><span class="value">{id}</span></h2>
               </section></body></html>"#
        )
    }

    /// Serves canned pages, records every request and tracks how many
    /// requests are in flight at once.
    #[derive(Default)]
    pub struct StubFetcher {
        pages: HashMap<String, Vec<u8>>,
        failing: HashSet<String>,
        delays: HashMap<String, Duration>,
        pub requests: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
    }

    impl StubFetcher {
        pub fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.as_bytes().to_vec());
            self
        }

        pub fn failing(mut self, url: &str) -> Self {
            self.failing.insert(url.to_string());
            self
        }

        pub fn delayed(mut self, url: &str, delay: Duration) -> Self {
            self.delays.insert(url.to_string(), delay);
            self
        }

        /// Results page plus one detail page per ad. Earlier ranks answer
        /// later so completion order is the reverse of rank order.
        pub fn for_results() -> Self {
            let mut stub = StubFetcher::default().with_page(SEARCH_URL, RESULTS);
            for (rank, id) in AD_IDS.iter().enumerate() {
                let delay = Duration::from_millis(10 * (AD_IDS.len() - rank) as u64);
                stub = stub.with_page(&ad_url(id), &detail_page(id)).delayed(&ad_url(id), delay);
            }
            stub
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AdFetcher for StubFetcher {
        async fn fetch_by_url(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delays.get(url) {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(url) {
                return Err(FetchError::Timeout { url: url.to_string() });
            }
            self.pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }

        async fn fetch_by_id(&self, id: &str, category: &str) -> std::result::Result<Vec<u8>, FetchError> {
            self.fetch_by_url(&format!("https://{HOST}/{category}/{id}.htm")).await
        }
    }

    pub fn coordinator(stub: Arc<StubFetcher>, max_concurrent: usize) -> ExtractionCoordinator {
        ExtractionCoordinator::new(
            QueryCodec::new(HOST, false).unwrap(),
            ResultPageExtractor::new(HOST, 35).unwrap(),
            ItemDetailExtractor::new(HOST).unwrap(),
            stub,
            max_concurrent,
        )
    }

    pub fn slots(items: &ResponseItems) -> &[AdSlot] {
        match items {
            ResponseItems::Details(slots) => slots,
            other => panic!("expected detailed items, got {other:?}"),
        }
    }
}

use test_helpers::*;

#[tokio::test]
async fn test_search_response_merges_query_counts_and_navigation() -> Result<()> {
    let stub = Arc::new(StubFetcher::for_results());
    let coordinator = coordinator(stub.clone(), 4);

    let response = coordinator.run_search(RESULTS, SEARCH_URL, DetailLevel::Summaries).await?;

    assert_eq!(response.total_ads, 47);
    assert_eq!(response.ads_per_page, 20);
    assert_eq!(response.total_pages, 3);
    assert_eq!(response.page, 2);
    assert_eq!(response.category, Some(Category::Cars));
    assert_eq!(response.location, Some(Location::Named("paris".to_string())));

    let link = |page: u32| {
        format!("https://www.leboncoin.fr/recherche?category=voitures&location=paris&page={page}")
    };
    assert_eq!(response.navigation.first, Some(link(1)));
    assert_eq!(response.navigation.prev, Some(link(1)));
    assert_eq!(response.navigation.next, Some(link(3)));
    assert_eq!(response.navigation.last, Some(link(3)));

    match &response.ads {
        ResponseItems::Summaries(summaries) => assert_eq!(summaries.len(), 5),
        other => panic!("expected summaries, got {other:?}"),
    }
    assert_eq!(response.soft_failures.len(), 1);
    assert_eq!(stub.request_count(), 0, "summaries never fetch");
    Ok(())
}

#[tokio::test]
async fn test_ids_mode_never_fetches() -> Result<()> {
    let stub = Arc::new(StubFetcher::for_results());
    let coordinator = coordinator(stub.clone(), 4);

    let response = coordinator.run_search(RESULTS, SEARCH_URL, DetailLevel::Ids).await?;

    let expected: Vec<String> = AD_IDS.iter().map(|id| id.to_string()).collect();
    assert_eq!(response.ads, ResponseItems::Ids(expected));
    assert_eq!(stub.request_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_full_detail_keeps_rank_order() -> Result<()> {
    let stub = Arc::new(StubFetcher::for_results());
    let coordinator = coordinator(stub.clone(), 5);

    let response = coordinator.run_search(RESULTS, SEARCH_URL, DetailLevel::Full).await?;
    let slots = slots(&response.ads);

    let ids: Vec<&str> = slots.iter().map(AdSlot::id).collect();
    assert_eq!(ids, AD_IDS.to_vec());
    for (slot, id) in slots.iter().zip(AD_IDS) {
        let detail = slot.detail().expect("every ad should be extracted");
        assert_eq!(detail.title, format!("Annonce {id}"));
        assert_eq!(detail.attributes.get("Référence").map(String::as_str), Some(id));
    }
    assert_eq!(stub.request_count(), 5);
    Ok(())
}

#[tokio::test]
async fn test_one_failed_fetch_does_not_abort_the_batch() -> Result<()> {
    let stub = Arc::new(StubFetcher::for_results().failing(&ad_url("1034569")));
    let coordinator = coordinator(stub, 2);

    let response = coordinator.run_search(RESULTS, SEARCH_URL, DetailLevel::Full).await?;
    let slots = slots(&response.ads);

    assert_eq!(slots.len(), 5);
    for (rank, slot) in slots.iter().enumerate() {
        assert_eq!(slot.id(), AD_IDS[rank]);
        if rank == 2 {
            assert!(slot.is_failed(), "slot 3 should carry the fetch error");
        } else {
            assert!(slot.detail().is_some(), "slot {} should be populated", rank + 1);
        }
    }
    match &slots[2] {
        AdSlot::Failed { error, .. } => assert!(error.contains("timed out")),
        other => panic!("expected failure marker, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_structure_error_on_one_ad_is_recorded_per_slot() -> Result<()> {
    let stub = Arc::new(StubFetcher::for_results().with_page(&ad_url("1034570"), INTERSTITIAL));
    let coordinator = coordinator(stub, 3);

    let response = coordinator.run_search(RESULTS, SEARCH_URL, DetailLevel::Full).await?;
    let slots = slots(&response.ads);

    let failed: Vec<&str> = slots.iter().filter(|s| s.is_failed()).map(AdSlot::id).collect();
    assert_eq!(failed, vec!["1034570"]);
    Ok(())
}

#[tokio::test]
async fn test_fetches_are_bounded() -> Result<()> {
    let stub = Arc::new(StubFetcher::for_results());
    let coordinator = coordinator(stub.clone(), 2);

    coordinator.run_search(RESULTS, SEARCH_URL, DetailLevel::Full).await?;

    let max = stub.max_in_flight.load(std::sync::atomic::Ordering::SeqCst);
    assert!(max <= 2, "saw {max} concurrent fetches");
    assert!(max >= 1);
    Ok(())
}

#[tokio::test]
async fn test_results_page_structure_error_aborts() {
    let stub = Arc::new(StubFetcher::for_results());
    let coordinator = coordinator(stub.clone(), 2);

    let err = coordinator
        .run_search(INTERSTITIAL, SEARCH_URL, DetailLevel::Full)
        .await
        .unwrap_err();
    assert!(err.is_structure_drift());
    assert_eq!(stub.request_count(), 0);
}

#[tokio::test]
async fn test_malformed_url_aborts_before_fetching() {
    let stub = Arc::new(StubFetcher::for_results());
    let coordinator = coordinator(stub.clone(), 2);

    let err = coordinator
        .search("https://www.example.com/recherche?category=voitures", DetailLevel::Ids)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::MalformedUrl { .. }));
    assert_eq!(stub.request_count(), 0);
}

#[tokio::test]
async fn test_search_fetches_results_page() -> Result<()> {
    let stub = Arc::new(StubFetcher::for_results());
    let coordinator = coordinator(stub.clone(), 2);

    let response = coordinator.search(SEARCH_URL, DetailLevel::Ids).await?;
    assert_eq!(response.total_ads, 47);
    assert_eq!(*stub.requests.lock().unwrap(), vec![SEARCH_URL.to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_search_passes_fetch_errors_through() {
    let stub = Arc::new(StubFetcher::default());
    let coordinator = coordinator(stub, 2);

    let err = coordinator.search(SEARCH_URL, DetailLevel::Ids).await.unwrap_err();
    assert!(matches!(err, ExtractError::Fetch(_)));
}

#[tokio::test]
async fn test_cancelled_search_discards_results() {
    let stub = StubFetcher::for_results();
    let slow = stub.delayed(&ad_url("1034571"), Duration::from_secs(30));
    let coordinator = coordinator(Arc::new(slow), 5);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = coordinator
        .run_search_until_cancelled(RESULTS, SEARCH_URL, DetailLevel::Full, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Cancelled));
}

#[tokio::test]
async fn test_ad_by_url_and_by_id() -> Result<()> {
    let by_id_url = "https://www.leboncoin.fr/voitures/1034568.htm";
    let stub = Arc::new(
        StubFetcher::for_results().with_page(by_id_url, &detail_page("1034568")),
    );
    let coordinator = coordinator(stub.clone(), 2);

    let ad = coordinator.ad_by_url(&ad_url("1034567")).await?;
    assert_eq!(ad.id, "1034567");
    assert_eq!(ad.price, Some(1034567));

    let ad = coordinator.ad_by_id("1034568", "voitures").await?;
    assert_eq!(ad.id, "1034568");
    assert_eq!(ad.url, by_id_url);
    assert_eq!(ad.category, Some(Category::Cars));
    Ok(())
}

#[tokio::test]
async fn test_ad_by_url_rejects_foreign_hosts() {
    let stub = Arc::new(StubFetcher::for_results());
    let coordinator = coordinator(stub.clone(), 2);

    for url in [
        "http://169.254.169.254/latest/1.htm",
        "https://www.example.com/voitures/1034567.htm",
        "file:///etc/voitures/1.htm",
    ] {
        let err = coordinator.ad_by_url(url).await.unwrap_err();
        assert!(matches!(err, ExtractError::MalformedUrl { .. }), "{url} gave {err:?}");
    }
    assert_eq!(stub.request_count(), 0);
}

#[tokio::test]
async fn test_off_site_ad_link_is_fetched_by_id() -> Result<()> {
    let results = r#"<html><body>
        <a class="tabsSwitch"><span class="tabsSwitchNumbers">1</span></a>
        <section class="tabsContent"><ul>
          <li itemscope itemtype="http://schema.org/Offer">
            <a href="//evil.host/voitures/777.htm" class="list_item">Leurre</a>
            <div class="saveAd" data-savead-id="777"></div>
          </li>
        </ul></section></body></html>"#;
    let by_id_url = "https://www.leboncoin.fr/voitures/777.htm";
    let stub = Arc::new(StubFetcher::default().with_page(by_id_url, &detail_page("777")));
    let coordinator = coordinator(stub.clone(), 2);

    let response = coordinator.run_search(results, SEARCH_URL, DetailLevel::Full).await?;
    let slots = slots(&response.ads);

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].detail().map(|d| d.url.as_str()), Some(by_id_url));
    assert_eq!(*stub.requests.lock().unwrap(), vec![by_id_url.to_string()]);
    Ok(())
}
