//! Classifier service abstraction
//!
//! Provides a unified interface for the external AI lifecycle classifier:
//! - OpenAI-compatible chat endpoints
//! - Mock implementation for testing
//!
//! The classifier answers per-chunk: a batch of identity pairs goes out, a
//! JSON object with a `results` array comes back. Replies are free text, so
//! extraction has to tolerate fenced code blocks and surrounding prose.

use crate::config::ClassifierConfig;
use crate::errors::{AppError, Result};
use crate::model::{
    ClassificationResult, Confidence, LifecycleStatus, PartQuery, ReplacementResult,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const CLASSIFY_INSTRUCTIONS: &str = "You are a product lifecycle analyst. For each part in the \
list, determine whether it is Active, Obsolete, or needs Review. Respond with a JSON object \
{\"results\": [{\"manufacturer\", \"part_number\", \"ai_status\", \"notes_by_ai\", \
\"ai_confidence\"}]} and nothing else.";

const REPLACEMENT_INSTRUCTIONS: &str = "You are a component sourcing analyst. For each obsolete \
part in the list, suggest a current replacement. Respond with a JSON object {\"results\": \
[{\"obsolete_part_number\", \"recommended_replacement\", \"replacement_manufacturer\", \"price\", \
\"currency\", \"source_type\", \"source_url\", \"notes\", \"ai_confidence\"}]} and nothing else.";

/// Trait for lifecycle classification
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify one chunk of parts
    async fn classify_chunk(&self, parts: &[PartQuery]) -> Result<Vec<ClassificationResult>>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Trait for replacement-part lookup
#[async_trait]
pub trait ReplacementFinder: Send + Sync {
    /// Find replacement suggestions for one chunk of obsolete parts
    async fn find_replacements(&self, parts: &[PartQuery]) -> Result<Vec<ReplacementResult>>;
}

/// OpenAI-compatible chat client
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_retries: u32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ClassificationPayload {
    results: Vec<ClassificationResult>,
}

#[derive(Deserialize)]
struct ReplacementPayload {
    results: Vec<ReplacementResult>,
}

impl OpenAiClient {
    /// Create a new client from configuration
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Configuration {
                message: "classifier.api_key is required for the openai provider".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries: config.max_retries,
            max_output_tokens: config.max_output_tokens,
        })
    }

    /// Make request with retry
    async fn request_with_retry(&self, instructions: &str, input: String) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(instructions, &input).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Classifier request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Classifier {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, instructions: &str, input: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instructions.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: input.to_string(),
                },
            ],
            temperature: 0.2,
            max_tokens: self.max_output_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Classifier {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Classifier {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::Classifier {
            message: format!("Failed to parse response: {}", e),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| AppError::Classifier {
                message: "Empty response".to_string(),
            })
    }
}

#[async_trait]
impl Classifier for OpenAiClient {
    async fn classify_chunk(&self, parts: &[PartQuery]) -> Result<Vec<ClassificationResult>> {
        let input = format_parts_for_analysis(parts);
        let text = self.request_with_retry(CLASSIFY_INSTRUCTIONS, input).await?;

        let payload: ClassificationPayload = parse_json_reply(&text)?;
        Ok(payload.results)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ReplacementFinder for OpenAiClient {
    async fn find_replacements(&self, parts: &[PartQuery]) -> Result<Vec<ReplacementResult>> {
        let input = format_parts_for_analysis(parts);
        let text = self
            .request_with_retry(REPLACEMENT_INSTRUCTIONS, input)
            .await?;

        let payload: ReplacementPayload = parse_json_reply(&text)?;
        Ok(payload.results)
    }
}

/// Render a chunk as the tab-separated table the model is prompted with
pub fn format_parts_for_analysis(parts: &[PartQuery]) -> String {
    let mut lines = Vec::with_capacity(parts.len() + 1);
    lines.push("Part Manufacturer\tManufacturer Part #".to_string());
    for part in parts {
        lines.push(format!("{}\t{}", part.manufacturer, part.part_number));
    }
    lines.join("\n")
}

/// Extract and deserialize the JSON object embedded in a model reply.
///
/// Tries, in order: a fenced ```json code block, the first balanced-brace
/// object, then the whole body.
pub fn parse_json_reply<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    for candidate in json_candidates(text) {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }

    Err(AppError::ResponseParse {
        message: format!("no parsable JSON object in reply: {:.500}", text),
    })
}

fn json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();

    // Strategy 1: fenced code block
    let fence = regex_lite::Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```")
        .expect("static regex");
    if let Some(captures) = fence.captures(text) {
        if let Some(m) = captures.get(1) {
            candidates.push(m.as_str());
        }
    }

    // Strategy 2: first balanced-brace object
    if let Some(object) = first_balanced_object(text) {
        candidates.push(object);
    }

    // Strategy 3: the entire message
    candidates.push(text);
    candidates
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, byte) in text[start..].bytes().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Mock classifier for testing
pub struct MockClassifier;

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify_chunk(&self, parts: &[PartQuery]) -> Result<Vec<ClassificationResult>> {
        Ok(parts
            .iter()
            .map(|p| ClassificationResult {
                manufacturer: p.manufacturer.clone(),
                part_number: p.part_number.clone(),
                ai_status: LifecycleStatus::Active,
                notes_by_ai: "mock classification".to_string(),
                ai_confidence: Confidence::High,
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "mock-classifier"
    }
}

#[async_trait]
impl ReplacementFinder for MockClassifier {
    async fn find_replacements(&self, parts: &[PartQuery]) -> Result<Vec<ReplacementResult>> {
        Ok(parts
            .iter()
            .map(|p| ReplacementResult {
                obsolete_part_number: p.part_number.clone(),
                part_number: p.part_number.clone(),
                recommended_replacement: format!("{}-R2", p.part_number),
                replacement_manufacturer: p.manufacturer.clone(),
                price: Some(10.0),
                currency: "USD".to_string(),
                source_type: "distributor".to_string(),
                source_url: String::new(),
                notes: "mock replacement".to_string(),
                ai_confidence: Some(Confidence::Medium),
            })
            .collect())
    }
}

/// Create a classifier based on configuration
pub fn create_classifier(config: &ClassifierConfig) -> Result<Arc<dyn Classifier>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::new(config)?)),
        "mock" => Ok(Arc::new(MockClassifier)),
        other => {
            tracing::warn!(provider = other, "Unknown classifier provider, using mock");
            Ok(Arc::new(MockClassifier))
        }
    }
}

/// Create a replacement finder based on configuration
pub fn create_replacement_finder(config: &ClassifierConfig) -> Result<Arc<dyn ReplacementFinder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiClient::new(config)?)),
        _ => Ok(Arc::new(MockClassifier)),
    }
}
