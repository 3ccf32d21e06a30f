//! Client for the remote text-to-image endpoint.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error};
use url::Url;

use crate::constants::{
    GUIDANCE_SCALE, IMAGE_HEIGHT, IMAGE_WIDTH, INFERENCE_STEPS, NEGATIVE_PROMPT,
};
use crate::prompt::Prompt;

/// Fixed per-deployment generation settings.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationParameters {
    /// Concepts the model should avoid
    pub negative_prompt: String,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Diffusion steps
    pub num_inference_steps: u32,
    /// Guidance scale
    pub guidance_scale: f32,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            width: IMAGE_WIDTH,
            height: IMAGE_HEIGHT,
            num_inference_steps: INFERENCE_STEPS,
            guidance_scale: GUIDANCE_SCALE,
        }
    }
}

/// Request body for the inference endpoint
#[derive(Serialize, Debug)]
struct InferenceRequest<'a> {
    inputs: &'a str,
    parameters: &'a GenerationParameters,
}

/// The request never produced a body.
#[derive(Debug)]
pub struct InferenceError(reqwest::Error);

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Inference request failed: {}", self.0)
    }
}

impl std::error::Error for InferenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<reqwest::Error> for InferenceError {
    fn from(err: reqwest::Error) -> Self {
        Self(err)
    }
}

/// Sends prompts to the configured endpoint. Cheap to clone.
#[derive(Clone, Debug)]
pub struct InferenceClient {
    client: reqwest::Client,
    endpoint: Url,
    api_token: String,
}

impl InferenceClient {
    /// Builds a client; `timeout` of `None` waits on the upstream forever.
    pub fn new(
        endpoint: Url,
        api_token: String,
        timeout: Option<Duration>,
    ) -> Result<Self, InferenceError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, endpoint, api_token))
    }

    /// Wraps an already configured `reqwest` client.
    pub fn with_client(client: reqwest::Client, endpoint: Url, api_token: String) -> Self {
        Self {
            client,
            endpoint,
            api_token,
        }
    }

    /// The endpoint prompts are posted to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Makes exactly one request and returns the raw body, whatever the status code.
    pub async fn query(
        &self,
        prompt: &Prompt,
        parameters: &GenerationParameters,
    ) -> Result<Vec<u8>, InferenceError> {
        let body = InferenceRequest {
            inputs: prompt.as_str(),
            parameters,
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .inspect_err(|err| error!("Request to {} failed: {}", self.endpoint, err))?;

        debug!("Upstream answered {}", response.status());
        let bytes = response
            .bytes()
            .await
            .inspect_err(|err| error!("Failed reading upstream body: {}", err))?;
        Ok(bytes.to_vec())
    }
}
