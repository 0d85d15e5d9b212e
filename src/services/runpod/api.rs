use std::time::Duration;

use log::{debug, info};
use reqwest::{Client, Response};

use super::SynthesisApi;
use super::models::{HealthReport, RunPodRequest, RunPodResponse};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{Job, SynthesisRequest};

/// `reqwest` implementation of [`SynthesisApi`] for a RunPod serverless endpoint.
#[derive(Debug, Clone)]
pub struct RunPodClient {
    http: Client,
    config: AppConfig,
}

impl RunPodClient {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::ConfigurationError(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// `https://api.runpod.ai/v2/<id>/run` -> `https://api.runpod.ai/v2/<id>/status/<job>`
pub fn sibling_url(endpoint: &str, path: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    match trimmed.rfind("/run") {
        Some(pos) => format!("{}{}", &trimmed[..pos], path),
        None => format!("{}{}", trimmed, path),
    }
}

async fn check_status(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AppError::TransportError(format!(
        "HTTP error! status: {}: {}",
        status,
        error_text.trim()
    )))
}

async fn parse_job(response: Response) -> AppResult<Job> {
    let body = check_status(response).await?.text().await?;
    let parsed: RunPodResponse = serde_json::from_str(&body).map_err(|e| {
        AppError::TransportError(format!("Failed to parse API response: {}", e))
    })?;
    Ok(parsed.into_job())
}

#[async_trait::async_trait]
impl SynthesisApi for RunPodClient {
    async fn submit(&self, request: &SynthesisRequest) -> AppResult<Job> {
        let (endpoint, api_key) = self.config.credentials()?;

        info!(
            "Submitting synthesis request: speaker={}, top_k={}, temperature={}, use_mbd={}, {} chars",
            request.speaker(),
            request.top_k(),
            request.temperature(),
            request.use_multi_band_diffusion(),
            request.text().chars().count()
        );

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(api_key)
            .json(&RunPodRequest::from(request))
            .send()
            .await?;

        let job = parse_job(response).await?;
        debug!("Submit response: id={}, status={:?}", job.id, job.status);
        Ok(job)
    }

    async fn get_status(&self, job_id: &str) -> AppResult<Job> {
        let (endpoint, api_key) = self.config.credentials()?;
        let url = sibling_url(endpoint, &format!("/status/{}", job_id));

        let response = self.http.get(&url).bearer_auth(api_key).send().await?;
        let job = parse_job(response).await?;
        debug!("Status of {}: {:?}", job_id, job.status);
        Ok(job)
    }

    async fn cancel(&self, job_id: &str) -> AppResult<()> {
        let (endpoint, api_key) = self.config.credentials()?;
        let url = sibling_url(endpoint, &format!("/cancel/{}", job_id));

        let response = self.http.post(&url).bearer_auth(api_key).send().await?;
        check_status(response).await?;
        info!("Cancelled job {}", job_id);
        Ok(())
    }

    async fn health(&self) -> AppResult<HealthReport> {
        let (endpoint, api_key) = self.config.credentials()?;
        let url = sibling_url(endpoint, "/health");

        let response = self.http.get(&url).bearer_auth(api_key).send().await?;
        let report = check_status(response).await?.json::<HealthReport>().await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobStatus, VoiceParameters};
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> RunPodClient {
        let config = AppConfig::new(format!("{}/v2/abc/run", server.url()), "secret");
        RunPodClient::new(config).unwrap()
    }

    fn request() -> SynthesisRequest {
        SynthesisRequest::new("בדיקה", VoiceParameters::default()).unwrap()
    }

    #[test]
    fn test_sibling_url() {
        assert_eq!(
            sibling_url("https://api.runpod.ai/v2/abc/run", "/status/job-1"),
            "https://api.runpod.ai/v2/abc/status/job-1"
        );
        assert_eq!(
            sibling_url("https://api.runpod.ai/v2/abc/run/", "/health"),
            "https://api.runpod.ai/v2/abc/health"
        );
        assert_eq!(
            sibling_url("http://localhost:8000", "/cancel/x"),
            "http://localhost:8000/cancel/x"
        );
        // Заменяется последнее вхождение вместе с хвостом
        assert_eq!(
            sibling_url("https://run.example.com/v2/abc/runsync?wait=1", "/health"),
            "https://run.example.com/v2/abc/health"
        );
        assert_eq!(
            sibling_url("https://api.runpod.ai/v2/run/run", "/status/j"),
            "https://api.runpod.ai/v2/run/status/j"
        );
    }

    #[tokio::test]
    async fn test_submit_sends_bearer_and_input() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/abc/run")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({
                "input": {
                    "text": "בדיקה",
                    "speaker": "osim",
                    "top_k": 50,
                    "use_mbd": true,
                    "filename": "output"
                }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"job-1","status":"IN_QUEUE"}"#)
            .create_async()
            .await;

        let job = client_for(&server).submit(&request()).await.unwrap();
        assert_eq!(job.id, "job-1");
        assert_eq!(job.status, JobStatus::Queued);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_and_cancel_urls() {
        let mut server = mockito::Server::new_async().await;
        let status = server
            .mock("GET", "/v2/abc/status/job-1")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_body(r#"{"id":"job-1","status":"COMPLETED","output":{"audio_base64":"UklGRg=="}}"#)
            .create_async()
            .await;
        let cancel = server
            .mock("POST", "/v2/abc/cancel/job-1")
            .with_status(200)
            .with_body(r#"{"id":"job-1","status":"CANCELLED"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let job = client.get_status("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.audio_base64(), Some("UklGRg=="));
        client.cancel("job-1").await.unwrap();

        status.assert_async().await;
        cancel.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_is_transport_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/abc/run")
            .with_status(503)
            .with_body("no workers")
            .create_async()
            .await;

        let err = client_for(&server).submit(&request()).await.unwrap_err();
        match err {
            AppError::TransportError(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("no workers"));
            }
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_configuration_makes_no_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let config = AppConfig {
            endpoint_url: Some(format!("{}/v2/abc/run", server.url())),
            ..AppConfig::default()
        };
        let client = RunPodClient::new(config).unwrap();
        let err = client.submit(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::ConfigurationError(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_health() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/abc/health")
            .with_status(200)
            .with_body(r#"{"jobs":{"inQueue":0},"workers":{"idle":1}}"#)
            .create_async()
            .await;

        let report = client_for(&server).health().await.unwrap();
        assert_eq!(report.workers["idle"], 1);
    }
}
