use serde::Deserialize;

use crate::data_models::DetailLevel;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub url: String,
    #[serde(default = "default_detail")]
    pub detail: DetailLevel,
}

fn default_detail() -> DetailLevel {
    DetailLevel::Summaries
}

/// Either `url`, or `id` together with `category`.
#[derive(Debug, Deserialize)]
pub struct AdRequest {
    pub url: Option<String>,
    pub id: Option<String>,
    pub category: Option<String>,
}
