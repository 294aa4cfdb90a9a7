use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type AdId = String;

/// Declares a search parameter enum whose values outside the known set are
/// kept verbatim in `Other`.
macro_rules! query_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $param:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(into = "String", from = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn from_param(value: &str) -> Self {
                match value {
                    $($param => Self::$variant,)+
                    other => Self::Other(other.to_string()),
                }
            }

            pub fn as_param(&self) -> &str {
                match self {
                    $(Self::$variant => $param,)+
                    Self::Other(raw) => raw,
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::from_param(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_param().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_param())
            }
        }
    };
}

query_enum! {
    /// Listing category. The site adds categories over time so the set is open.
    pub enum Category {
        All => "annonces",
        Cars => "voitures",
        Motorbikes => "motos",
        Caravaning => "caravaning",
        Utility => "utilitaires",
        CarEquipment => "equipement_auto",
        RealEstateSales => "ventes_immobilieres",
        Rentals => "locations",
        FlatShares => "colocations",
        Offices => "bureaux_commerces",
        Jobs => "offres_d_emploi",
        Computers => "informatique",
        VideoGames => "consoles_jeux_video",
        Phones => "telephonie",
        ImageSound => "image_son",
        Furniture => "ameublement",
        Appliances => "electromenager",
        Decoration => "decoration",
        Clothing => "vetements",
        Shoes => "chaussures",
        Jewelry => "montres_bijoux",
        Pets => "animaux",
        Bikes => "velos",
        Services => "services",
    }
}

query_enum! {
    pub enum SearchArea {
        Around => "around",
        City => "city",
        Department => "department",
        Region => "region",
        Nationwide => "nationwide",
    }
}

query_enum! {
    pub enum SortType {
        Relevance => "relevance",
        Date => "date",
        PriceAsc => "price_asc",
        PriceDesc => "price_desc",
    }
}

query_enum! {
    pub enum AdType {
        Offer => "offer",
        Demand => "demand",
    }
}

/// Where a search is anchored: a free-form place name or one of the site's
/// structured place codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Location {
    Zipcode(String),
    Region(String),
    Department(String),
    Named(String),
}

impl Location {
    pub fn from_param(value: &str) -> Self {
        if let Some(code) = value.strip_prefix("r_").filter(|c| !c.is_empty()) {
            return Self::Region(code.to_string());
        }
        if let Some(code) = value.strip_prefix("d_").filter(|c| !c.is_empty()) {
            return Self::Department(code.to_string());
        }
        if value.len() == 5 && value.bytes().all(|b| b.is_ascii_digit()) {
            return Self::Zipcode(value.to_string());
        }
        Self::Named(value.to_string())
    }

    pub fn to_param(&self) -> String {
        match self {
            Self::Zipcode(zip) => zip.clone(),
            Self::Region(code) => format!("r_{code}"),
            Self::Department(code) => format!("d_{code}"),
            Self::Named(name) => name.clone(),
        }
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Self::from_param(&value)
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.to_param()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_param())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub path: String,
    pub category: Option<Category>,
    pub location: Option<Location>,
    pub search_area: Option<SearchArea>,
    pub sort: Option<SortType>,
    #[serde(rename = "type")]
    pub kind: Option<AdType>,
    /// Always >= 1.
    pub page: u32,
    /// Unrecognized query parameters in their original order.
    pub extra: Vec<(String, String)>,
}

impl SearchQuery {
    pub fn new(path: impl Into<String>) -> SearchQuery {
        SearchQuery {
            path: path.into(),
            category: None,
            location: None,
            search_area: None,
            sort: None,
            kind: None,
            page: 1,
            extra: Vec::new(),
        }
    }

    pub fn with_page(&self, page: u32) -> SearchQuery {
        SearchQuery {
            page: page.max(1),
            ..self.clone()
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    pub first: Option<String>,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub last: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCounts {
    pub total_ads: u64,
    pub total_pages: u64,
    pub ads_per_page: u32,
}

impl PageCounts {
    pub fn new(total_ads: u64, ads_per_page: u32) -> PageCounts {
        let total_pages = if ads_per_page == 0 {
            0
        } else {
            total_ads.div_ceil(u64::from(ads_per_page))
        };
        PageCounts {
            total_ads,
            total_pages,
            ads_per_page,
        }
    }
}

/// A results-page node that could not be turned into an item.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SoftFailure {
    /// Position of the node among the page's ad nodes.
    pub index: usize,
    pub reason: String,
}

/// Items pulled from a page plus the nodes that had to be skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub items: Vec<T>,
    pub soft_failures: Vec<SoftFailure>,
}

impl<T> Default for Extracted<T> {
    fn default() -> Self {
        Extracted {
            items: Vec::new(),
            soft_failures: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AdSummary {
    pub id: AdId,
    pub url: Option<String>,
    pub title: Option<String>,
    pub price: Option<u64>,
    pub thumbnail_url: Option<String>,
    pub location_label: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub is_pro: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AdDetail {
    pub id: AdId,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<u64>,
    pub images: Vec<String>,
    /// Category-specific label/value table, in document order.
    pub attributes: IndexMap<String, String>,
    pub location_label: Option<String>,
    pub category: Option<Category>,
    pub poster_label: Option<String>,
    pub published_at: Option<NaiveDateTime>,
    pub is_pro: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", content = "items", rename_all = "snake_case")]
pub enum PageItems {
    Ids(Vec<AdId>),
    Summaries(Vec<AdSummary>),
}

impl PageItems {
    pub fn len(&self) -> usize {
        match self {
            PageItems::Ids(ids) => ids.len(),
            PageItems::Summaries(summaries) => summaries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchResultPage {
    #[serde(flatten)]
    pub counts: PageCounts,
    pub items: PageItems,
    pub soft_failures: Vec<SoftFailure>,
}

/// One rank position in a full-detail search.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdSlot {
    Extracted(AdDetail),
    Failed { id: AdId, error: String },
}

impl AdSlot {
    pub fn id(&self) -> &str {
        match self {
            AdSlot::Extracted(detail) => &detail.id,
            AdSlot::Failed { id, .. } => id,
        }
    }

    pub fn detail(&self) -> Option<&AdDetail> {
        match self {
            AdSlot::Extracted(detail) => Some(detail),
            AdSlot::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AdSlot::Failed { .. })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Ids,
    Summaries,
    Full,
}

impl FromStr for DetailLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ids" | "id_only" | "idonly" => Ok(DetailLevel::Ids),
            "summaries" | "summary" => Ok(DetailLevel::Summaries),
            "full" | "detailed" => Ok(DetailLevel::Full),
            other => Err(format!("unknown detail level '{other}'")),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "mode", content = "items", rename_all = "snake_case")]
pub enum ResponseItems {
    Ids(Vec<AdId>),
    Summaries(Vec<AdSummary>),
    Details(Vec<AdSlot>),
}

impl ResponseItems {
    pub fn len(&self) -> usize {
        match self {
            ResponseItems::Ids(ids) => ids.len(),
            ResponseItems::Summaries(summaries) => summaries.len(),
            ResponseItems::Details(slots) => slots.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<PageItems> for ResponseItems {
    fn from(items: PageItems) -> Self {
        match items {
            PageItems::Ids(ids) => ResponseItems::Ids(ids),
            PageItems::Summaries(summaries) => ResponseItems::Summaries(summaries),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchResponse {
    #[serde(flatten)]
    pub navigation: Navigation,
    pub total_ads: u64,
    pub total_pages: u64,
    pub ads_per_page: u32,
    pub page: u32,
    pub category: Option<Category>,
    pub location: Option<Location>,
    pub search_area: Option<SearchArea>,
    pub sort_by: Option<SortType>,
    #[serde(rename = "type")]
    pub kind: Option<AdType>,
    pub ads: ResponseItems,
    pub soft_failures: Vec<SoftFailure>,
}

#[test]
fn test_page_counts_round_up() {
    assert_eq!(PageCounts::new(47, 20).total_pages, 3);
    assert_eq!(PageCounts::new(40, 20).total_pages, 2);
    assert_eq!(PageCounts::new(1, 35).total_pages, 1);
    assert_eq!(PageCounts::new(0, 35).total_pages, 0);
    assert_eq!(PageCounts::new(10, 0).total_pages, 0);
}
