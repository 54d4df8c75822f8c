//! Pure Apify REST API client.
//!
//! A minimal client for the Apify platform API: start actor runs, read
//! run status, and fetch dataset results. Pacing is the caller's job -
//! this client never sleeps or long-polls, so a pipeline poller can drive
//! it on its own schedule.
//!
//! # Example
//!
//! ```rust,ignore
//! use apify_client::ApifyClient;
//!
//! let client = ApifyClient::new("your-api-token".into());
//!
//! let run = client.start_website_crawl("https://example.com", 10).await?;
//! // ... later ...
//! let run = client.get_run(&run.id).await?;
//! if run.status == "SUCCEEDED" {
//!     let pages: Vec<CrawledPage> = client.get_dataset_items(&run.default_dataset_id).await?;
//! }
//! ```

pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{ApiResponse, CrawledPage, RunData, StartUrl, WebsiteCrawlerInput};

use serde::de::DeserializeOwned;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor ID for apify/website-content-crawler.
const WEBSITE_CONTENT_CRAWLER: &str = "aYG0l9s7dbB7j3gbS";

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    /// Start a website crawl run. Returns immediately with run metadata.
    pub async fn start_website_crawl(&self, url: &str, max_pages: u32) -> Result<RunData> {
        let input = WebsiteCrawlerInput::for_site(url, max_pages);

        let api_url = format!("{}/acts/{}/runs", BASE_URL, WEBSITE_CONTENT_CRAWLER);
        let resp = self
            .client
            .post(&api_url)
            .bearer_auth(&self.token)
            .json(&input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        tracing::debug!(run_id = %api_resp.data.id, url, "Apify run started");
        Ok(api_resp.data)
    }

    /// Fetch the current state of a run. Single-shot; no waiting.
    pub async fn get_run(&self, run_id: &str) -> Result<RunData> {
        let url = format!("{}/actor-runs/{}", BASE_URL, run_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let api_resp: ApiResponse<RunData> = resp.json().await?;
        Ok(api_resp.data)
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", BASE_URL, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let items: Vec<T> = resp.json().await?;
        Ok(items)
    }
}
