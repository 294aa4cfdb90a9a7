use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    dotenv().ok(); // Load .env file if present
    Config {
        site_host: get_env_or_default("ADHARVEST_SITE_HOST", "www.leboncoin.fr"),
        strict_query: get_env_parsed_or("ADHARVEST_STRICT_QUERY", false),
        ads_per_page: get_env_parsed_or("ADHARVEST_ADS_PER_PAGE", 35),
        max_concurrent_fetches: get_env_parsed_or("ADHARVEST_MAX_CONCURRENT_FETCHES", 4),
        fetch_timeout_secs: get_env_parsed_or("ADHARVEST_FETCH_TIMEOUT_SECS", 20),
        user_agent: get_env_or_default(
            "ADHARVEST_USER_AGENT",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
        ),
        listen_addr: get_env_or_default("ADHARVEST_LISTEN_ADDR", "127.0.0.1:3000"),
    }
});

pub struct Config {
    /// Host every search and ad URL must belong to.
    pub site_host: String,
    /// Reject unknown enum values in search URLs instead of keeping them verbatim.
    pub strict_query: bool,
    pub ads_per_page: u32,
    pub max_concurrent_fetches: usize,
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub listen_addr: String,
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env_parsed_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring unparseable value for {key}: {raw:?}");
            default
        }),
        Err(_) => default,
    }
}
