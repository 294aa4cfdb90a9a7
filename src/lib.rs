pub mod ad_detail;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod data_models;
pub mod encoding;
pub mod error;
pub mod fetcher;
pub mod normalize;
pub mod query_codec;
pub mod search_results;
pub mod selectors;
