//! Enrich stage backed by OpenAI background response jobs.
//!
//! Submission creates a background response from the scraped page text;
//! status maps the job lifecycle onto the pipeline's service states.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pipeline::{Lead, ServiceJobStatus, StageService};

const BASE_URL: &str = "https://api.openai.com/v1";
const MODEL: &str = "gpt-4o-mini";

/// Upper bound on scraped text shipped to the model, in characters.
const MAX_INPUT_CHARS: usize = 60_000;

pub struct OpenAiBatchService {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct CreateResponseRequest {
    model: String,
    input: String,
    background: bool,
}

#[derive(Debug, Deserialize)]
struct ResponseJob {
    id: String,
    status: String,
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    error: Option<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    message: String,
}

impl OpenAiBatchService {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, api_key })
    }

    fn enrichment_prompt(lead: &Lead, scraped: &serde_json::Value) -> String {
        let mut text = String::new();
        if let Some(pages) = scraped.get("pages").and_then(|p| p.as_array()) {
            for page in pages {
                if let Some(t) = page
                    .get("markdown")
                    .or_else(|| page.get("text"))
                    .and_then(|t| t.as_str())
                {
                    text.push_str(t);
                    text.push('\n');
                }
            }
        }
        if text.len() > MAX_INPUT_CHARS {
            let mut end = MAX_INPUT_CHARS;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }

        format!(
            "You are enriching a sales lead. Company: {}. Website: {}.\n\
             From the scraped site content below, return a JSON object with \
             keys: summary, industry, company_size, products, contact_hints.\n\n{}",
            lead.company_name.as_deref().unwrap_or("unknown"),
            lead.website_url,
            text
        )
    }

    async fn parse_error_body(resp: reqwest::Response) -> anyhow::Error {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        anyhow::anyhow!("OpenAI API error (HTTP {status}): {body}")
    }
}

#[async_trait]
impl StageService for OpenAiBatchService {
    async fn submit(
        &self,
        lead: &Lead,
        prior_result: Option<&serde_json::Value>,
    ) -> Result<String> {
        let scraped = prior_result
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let request = CreateResponseRequest {
            model: MODEL.to_string(),
            input: Self::enrichment_prompt(lead, &scraped),
            background: true,
        };

        let resp = self
            .client
            .post(format!("{BASE_URL}/responses"))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::parse_error_body(resp).await);
        }

        let job: ResponseJob = resp.json().await?;
        Ok(job.id)
    }

    async fn status(&self, job_id: &str) -> Result<ServiceJobStatus> {
        let resp = self
            .client
            .get(format!("{BASE_URL}/responses/{job_id}"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::parse_error_body(resp).await);
        }

        let job: ResponseJob = resp.json().await?;
        match job.status.as_str() {
            "queued" => Ok(ServiceJobStatus::Pending),
            "in_progress" => Ok(ServiceJobStatus::Processing),
            "completed" => {
                let text = job.output_text.unwrap_or_default();
                // The model is asked for JSON; keep the raw text when it
                // returned something else.
                let result = serde_json::from_str(&text)
                    .unwrap_or_else(|_| serde_json::json!({ "summary": text }));
                Ok(ServiceJobStatus::Completed { result })
            }
            "failed" | "cancelled" | "incomplete" => Ok(ServiceJobStatus::Failed {
                error: job
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| format!("enrichment job {}: {}", job.id, job.status)),
            }),
            other => {
                tracing::warn!(job_id = %job.id, status = other, "unrecognized response job status");
                Ok(ServiceJobStatus::Processing)
            }
        }
    }
}
