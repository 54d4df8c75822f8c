use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input for the apify/website-content-crawler actor.
#[derive(Debug, Clone, Serialize)]
pub struct WebsiteCrawlerInput {
    #[serde(rename = "startUrls")]
    pub start_urls: Vec<StartUrl>,
    #[serde(rename = "maxCrawlPages")]
    pub max_crawl_pages: u32,
    #[serde(rename = "crawlerType")]
    pub crawler_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartUrl {
    pub url: String,
}

impl WebsiteCrawlerInput {
    pub fn for_site(url: &str, max_pages: u32) -> Self {
        Self {
            start_urls: vec![StartUrl {
                url: url.to_string(),
            }],
            max_crawl_pages: max_pages,
            crawler_type: "cheerio".to_string(),
        }
    }
}

/// A crawled page from the actor's dataset.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawledPage {
    pub url: String,
    pub text: Option<String>,
    pub markdown: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Apify actor run metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunData {
    /// Whether the run has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.status.as_str(),
            "SUCCEEDED" | "FAILED" | "ABORTED" | "TIMED-OUT"
        )
    }
}
