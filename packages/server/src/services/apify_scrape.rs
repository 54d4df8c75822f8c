//! Scrape stage backed by Apify's Website Content Crawler.

use anyhow::Result;
use async_trait::async_trait;

use apify_client::{ApifyClient, CrawledPage};
use pipeline::{Lead, ServiceJobStatus, StageService};

/// How many pages to crawl per lead website.
const MAX_CRAWL_PAGES: u32 = 10;

pub struct ApifyScrapeService {
    client: ApifyClient,
}

impl ApifyScrapeService {
    pub fn new(token: String) -> Self {
        Self {
            client: ApifyClient::new(token),
        }
    }
}

#[async_trait]
impl StageService for ApifyScrapeService {
    async fn submit(
        &self,
        lead: &Lead,
        _prior_result: Option<&serde_json::Value>,
    ) -> Result<String> {
        let run = self
            .client
            .start_website_crawl(&lead.website_url, MAX_CRAWL_PAGES)
            .await?;
        Ok(run.id)
    }

    async fn status(&self, job_id: &str) -> Result<ServiceJobStatus> {
        let run = self.client.get_run(job_id).await?;

        match run.status.as_str() {
            "READY" => Ok(ServiceJobStatus::Pending),
            "RUNNING" => Ok(ServiceJobStatus::Processing),
            "SUCCEEDED" => {
                let pages: Vec<CrawledPage> = self
                    .client
                    .get_dataset_items(&run.default_dataset_id)
                    .await?;

                if pages.iter().all(|p| {
                    p.text.as_deref().unwrap_or("").trim().is_empty()
                        && p.markdown.as_deref().unwrap_or("").trim().is_empty()
                }) {
                    // Empty crawls never improve on retry.
                    return Ok(ServiceJobStatus::Failed {
                        error: "no content extracted".to_string(),
                    });
                }

                Ok(ServiceJobStatus::Completed {
                    result: serde_json::json!({ "pages": pages }),
                })
            }
            "FAILED" | "ABORTED" | "TIMED-OUT" => Ok(ServiceJobStatus::Failed {
                error: format!("scrape run {}: {}", run.id, run.status),
            }),
            other => {
                // Unknown platform status; treat as still in progress so
                // the next poll can decide.
                tracing::warn!(run_id = %run.id, status = other, "unrecognized Apify run status");
                Ok(ServiceJobStatus::Processing)
            }
        }
    }
}
