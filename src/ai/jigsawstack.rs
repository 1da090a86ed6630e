// JigsawStack client
// Image generation and editing return the encoded image as the response body;
// the prompt engine returns JSON.
// API Reference: https://docs.jigsawstack.com/api-reference

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::palette::{select_palettes, RawPalette};
use crate::ai::prompts;
use crate::ai::{ConceptBrief, ConceptGenerator, RefinementBrief};
use crate::config::JigsawStackConfig;
use crate::models::Palette;
use crate::types::{AppError, AppResult};
use crate::utils::retry::{with_retry, RetryPolicy};

const IMAGE_GENERATION_PATH: &str = "/v1/ai/image_generation";
const IMAGE_EDIT_PATH: &str = "/v1/ai/image_edit";
const PROMPT_ENGINE_PATH: &str = "/v1/prompt_engine/run";

const IMAGE_SIZE: u32 = 512;
const REFINE_STRENGTH: f32 = 0.6;
const RECOLOR_STRENGTH: f32 = 0.35;

pub struct JigsawStackClient {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

// Request types
#[derive(Serialize)]
struct ImageGenerationRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct ImageEditRequest<'a> {
    prompt: &'a str,
    /// Base64-encoded source image
    image: String,
    strength: f32,
}

#[derive(Serialize)]
struct PromptEngineRequest<'a> {
    prompt: &'a str,
    return_format: &'static str,
}

// Response types
#[derive(Deserialize)]
struct PromptEngineResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<PaletteResult>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PaletteResult {
    Wrapped { palettes: Vec<RawPalette> },
    List(Vec<RawPalette>),
}

#[derive(Deserialize)]
struct JigsawErrorResponse {
    message: Option<String>,
    error: Option<String>,
}

/// Which domain error a permanent API failure becomes.
#[derive(Clone, Copy)]
enum Operation {
    Generate,
    Refine,
}

impl Operation {
    fn failure(self, message: String) -> AppError {
        match self {
            Operation::Generate => AppError::Generation(message),
            Operation::Refine => AppError::Refinement(message),
        }
    }
}

impl JigsawStackClient {
    pub fn new(config: &JigsawStackConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(config.max_retries, Duration::from_secs(1)),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check_status(
        response: reqwest::Response,
        operation: Operation,
    ) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<JigsawErrorResponse>(&body)
            .ok()
            .and_then(|e| e.message.or(e.error))
            .unwrap_or(body);
        let message = format!("JigsawStack API error ({}): {}", status, message);

        if status.is_server_error() {
            Err(AppError::ServiceUnavailable(message))
        } else {
            Err(operation.failure(message))
        }
    }

    fn transport_error(error: reqwest::Error) -> AppError {
        AppError::ServiceUnavailable(format!("JigsawStack request failed: {}", error))
    }

    async fn post_for_image<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        operation: Operation,
    ) -> AppResult<Bytes> {
        let response = self
            .client
            .post(self.url(path))
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response, operation).await?;

        // Some failures come back as 200 with a JSON body instead of an image
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<mime::Mime>().ok());
        if let Some(content_type) = content_type {
            if content_type.subtype() == mime::JSON {
                let body = response.text().await.map_err(Self::transport_error)?;
                let message = serde_json::from_str::<JigsawErrorResponse>(&body)
                    .ok()
                    .and_then(|e| e.message.or(e.error))
                    .unwrap_or(body);
                return Err(operation.failure(format!("JigsawStack returned no image: {}", message)));
            }
        }

        let image = response.bytes().await.map_err(Self::transport_error)?;
        if image.is_empty() {
            return Err(operation.failure("JigsawStack returned an empty image".to_string()));
        }

        debug!(path, size = image.len(), "Received image from JigsawStack");
        Ok(image)
    }

    async fn edit_image(
        &self,
        image: &Bytes,
        prompt: &str,
        strength: f32,
        operation: Operation,
    ) -> AppResult<Bytes> {
        let request = ImageEditRequest {
            prompt,
            image: STANDARD.encode(image),
            strength,
        };
        let request = &request;
        with_retry(&self.retry, move || {
            self.post_for_image(IMAGE_EDIT_PATH, request, operation)
        })
        .await
    }

    async fn run_prompt_engine(&self, prompt: &str) -> AppResult<Vec<RawPalette>> {
        let response = self
            .client
            .post(self.url(PROMPT_ENGINE_PATH))
            .header("x-api-key", &self.api_key)
            .json(&PromptEngineRequest {
                prompt,
                return_format: "json",
            })
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response, Operation::Generate).await?;
        let parsed: PromptEngineResponse = response.json().await.map_err(|e| {
            AppError::Generation(format!("Failed to parse palette response: {}", e))
        })?;

        if !parsed.success {
            return Err(AppError::Generation(format!(
                "Palette generation failed: {}",
                parsed.message.unwrap_or_else(|| "unknown error".to_string())
            )));
        }

        match parsed.result {
            Some(PaletteResult::Wrapped { palettes }) | Some(PaletteResult::List(palettes)) => {
                Ok(palettes)
            }
            None => Err(AppError::Generation("Palette response had no result".to_string())),
        }
    }
}

#[async_trait]
impl ConceptGenerator for JigsawStackClient {
    async fn generate_image(&self, brief: &ConceptBrief) -> AppResult<Bytes> {
        let prompt = prompts::logo_prompt(brief);
        info!("Generating base image");
        let request = ImageGenerationRequest {
            prompt: &prompt,
            width: IMAGE_SIZE,
            height: IMAGE_SIZE,
        };
        let request = &request;
        with_retry(&self.retry, move || {
            self.post_for_image(IMAGE_GENERATION_PATH, request, Operation::Generate)
        })
        .await
    }

    async fn refine_image(&self, image: &Bytes, refinement: &RefinementBrief) -> AppResult<Bytes> {
        let prompt = prompts::refinement_prompt(refinement);
        info!("Refining image");
        self.edit_image(image, &prompt, REFINE_STRENGTH, Operation::Refine).await
    }

    async fn generate_palettes(&self, brief: &ConceptBrief, count: usize) -> AppResult<Vec<Palette>> {
        let prompt = prompts::palette_prompt(brief, count);
        info!(count, "Generating palettes");
        let prompt = prompt.as_str();
        let raw = with_retry(&self.retry, move || self.run_prompt_engine(prompt)).await?;
        select_palettes(raw, count)
    }

    async fn recolor_image(&self, image: &Bytes, palette: &Palette) -> AppResult<Bytes> {
        let prompt = prompts::recolor_prompt(palette);
        debug!(palette = %palette.name, "Applying palette");
        self.edit_image(image, &prompt, RECOLOR_STRENGTH, Operation::Generate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(server: &mockito::ServerGuard, max_retries: u32) -> JigsawStackClient {
        JigsawStackClient::new(&JigsawStackConfig {
            api_key: "test-key".to_string(),
            api_url: server.url(),
            timeout_secs: 5,
            max_retries,
        })
        .unwrap()
        .with_retry_policy(RetryPolicy::new(max_retries, Duration::from_millis(1)))
    }

    fn brief() -> ConceptBrief {
        ConceptBrief {
            logo_description: "A minimalist fox logo".to_string(),
            theme_description: "Blue and gray corporate".to_string(),
        }
    }

    #[tokio::test]
    async fn test_generate_image_returns_body_bytes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", IMAGE_GENERATION_PATH)
            .match_header("x-api-key", "test-key")
            .match_body(Matcher::PartialJson(serde_json::json!({"width": 512, "height": 512})))
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(b"png-bytes")
            .create_async()
            .await;

        let image = client(&server, 1).generate_image(&brief()).await.unwrap();

        assert_eq!(&image[..], b"png-bytes");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("POST", IMAGE_GENERATION_PATH)
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let result = client(&server, 3).generate_image(&brief()).await;

        assert!(matches!(result, Err(AppError::ServiceUnavailable(_))));
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_fail_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let rejected = server
            .mock("POST", IMAGE_EDIT_PATH)
            .with_status(400)
            .with_body(r#"{"success": false, "message": "prompt rejected"}"#)
            .expect(1)
            .create_async()
            .await;

        let refinement = RefinementBrief {
            brief: brief(),
            refinement_prompt: "add a hat".to_string(),
            preserve_aspects: vec![],
        };
        let result = client(&server, 3)
            .refine_image(&Bytes::from_static(b"img"), &refinement)
            .await;

        match result {
            Err(AppError::Refinement(message)) => assert!(message.contains("prompt rejected")),
            other => panic!("expected refinement error, got {:?}", other),
        }
        rejected.assert_async().await;
    }

    #[tokio::test]
    async fn test_throttling_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let throttled = server
            .mock("POST", IMAGE_GENERATION_PATH)
            .with_status(429)
            .with_body(r#"{"success": false, "message": "rate limit exceeded"}"#)
            .expect(1)
            .create_async()
            .await;

        let result = client(&server, 3).generate_image(&brief()).await;

        match result {
            Err(AppError::Generation(message)) => assert!(message.contains("rate limit exceeded")),
            other => panic!("expected generation error, got {:?}", other),
        }
        throttled.assert_async().await;
    }

    #[tokio::test]
    async fn test_json_body_instead_of_image_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", IMAGE_GENERATION_PATH)
            .with_status(200)
            .with_header("content-type", "application/json; charset=utf-8")
            .with_body(r#"{"success": false, "message": "content policy"}"#)
            .create_async()
            .await;

        let result = client(&server, 1).generate_image(&brief()).await;

        match result {
            Err(AppError::Generation(message)) => assert!(message.contains("content policy")),
            other => panic!("expected generation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_palettes_parses_wrapped_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", PROMPT_ENGINE_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "success": true,
                    "result": {"palettes": [
                        {"name": "Harbor", "colors": ["#0a2540", "#8899aa"], "description": "calm"},
                        {"name": "Slate", "colors": ["#333333", "#cccccc"]}
                    ]}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let palettes = client(&server, 1).generate_palettes(&brief(), 2).await.unwrap();

        assert_eq!(palettes.len(), 2);
        assert_eq!(palettes[0].colors, vec!["#0A2540", "#8899AA"]);
        assert_eq!(palettes[1].name, "Slate");
    }

    #[tokio::test]
    async fn test_recolor_sends_base64_image() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", IMAGE_EDIT_PATH)
            .match_body(Matcher::PartialJson(
                serde_json::json!({"image": STANDARD.encode(b"base")}),
            ))
            .with_status(200)
            .with_body(b"recolored")
            .create_async()
            .await;

        let palette = Palette {
            name: "Harbor".to_string(),
            colors: vec!["#0A2540".to_string()],
            description: None,
        };
        let image = client(&server, 1)
            .recolor_image(&Bytes::from_static(b"base"), &palette)
            .await
            .unwrap();

        assert_eq!(&image[..], b"recolored");
        mock.assert_async().await;
    }
}
