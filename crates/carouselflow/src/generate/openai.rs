use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::generate::{CarouselDeck, CarouselGenerator, CarouselRequest, GenerateError};
use crate::jobs::ProgressHandle;

const SYSTEM_PROMPT: &str = r#"You write carousel decks for social posts.

Output JSON with exactly this structure and nothing else:
{
  "title": "Deck title, at most 60 characters",
  "slides": [
    {"heading": "Short heading", "body": "One or two sentences"}
  ],
  "caption": "Optional post caption, or null"
}

Produce exactly the requested number of slides. No markdown, no commentary."#;

/// Chat-completions backed generator.
#[derive(Clone)]
pub struct OpenAiGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Point at a proxy or compatible endpoint instead of api.openai.com.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

fn build_user_prompt(request: &CarouselRequest) -> String {
    let mut prompt = format!(
        "Topic: {}\nSlides: {}",
        request.prompt,
        request.slide_count()
    );
    if let Some(tone) = &request.tone {
        prompt.push_str("\nTone: ");
        prompt.push_str(tone);
    }
    prompt
}

/// Parse a completion body into a deck. Strips a markdown fence if the
/// model wrapped its JSON in one despite the response_format hint.
fn parse_deck(content: &str) -> Result<CarouselDeck, GenerateError> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let deck: CarouselDeck = serde_json::from_str(trimmed).map_err(|e| {
        GenerateError::new("BAD_COMPLETION", format!("model returned invalid deck JSON: {e}"))
    })?;

    if deck.slides.is_empty() {
        return Err(GenerateError::new(
            "BAD_COMPLETION",
            "model returned a deck with no slides",
        ));
    }

    Ok(deck)
}

#[async_trait]
impl CarouselGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        request: &CarouselRequest,
        progress: &ProgressHandle,
    ) -> Result<CarouselDeck, GenerateError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_user_prompt(request),
                },
            ],
            temperature: 0.7,
            response_format: ResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        progress.report(10, "Calling model").await;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::new("PROVIDER_DOWN", format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let code = match status.as_u16() {
                429 => "RATE_LIMIT",
                400 => "BAD_PROMPT",
                _ => "PROVIDER_DOWN",
            };
            return Err(GenerateError::new(
                code,
                format!("provider returned {status}: {error_text}"),
            ));
        }

        progress.report(80, "Parsing completion").await;

        let chat: ChatResponse = response.json().await.map_err(|e| {
            GenerateError::new("BAD_COMPLETION", format!("unreadable response body: {e}"))
        })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerateError::new("BAD_COMPLETION", "response had no choices"))?;

        let deck = parse_deck(&content)?;
        progress.report(95, "Finalizing deck").await;
        Ok(deck)
    }
}

// Wire types for the chat-completions endpoint.

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_model_and_base_url() {
        let gen = OpenAiGenerator::new("sk-test")
            .with_model("gpt-4o")
            .with_base_url("http://localhost:9999/v1");

        assert_eq!(gen.model, "gpt-4o");
        assert_eq!(gen.base_url, "http://localhost:9999/v1");
    }

    #[test]
    fn user_prompt_includes_tone_when_present() {
        let request = CarouselRequest {
            prompt: "rust tips".to_string(),
            slide_count: Some(4),
            tone: Some("playful".to_string()),
        };

        let prompt = build_user_prompt(&request);
        assert!(prompt.contains("Topic: rust tips"));
        assert!(prompt.contains("Slides: 4"));
        assert!(prompt.contains("Tone: playful"));
    }

    #[test]
    fn parse_deck_accepts_plain_json() {
        let deck = parse_deck(
            r#"{"title":"T","slides":[{"heading":"H","body":"B"}],"caption":null}"#,
        )
        .unwrap();
        assert_eq!(deck.title, "T");
        assert_eq!(deck.slides.len(), 1);
    }

    #[test]
    fn parse_deck_strips_markdown_fence() {
        let fenced = "```json\n{\"title\":\"T\",\"slides\":[{\"heading\":\"H\",\"body\":\"B\"}]}\n```";
        let deck = parse_deck(fenced).unwrap();
        assert_eq!(deck.slides[0].heading, "H");
    }

    #[test]
    fn parse_deck_rejects_empty_slides() {
        let err = parse_deck(r#"{"title":"T","slides":[]}"#).unwrap_err();
        assert_eq!(err.code, "BAD_COMPLETION");
    }

    #[test]
    fn parse_deck_rejects_prose() {
        let err = parse_deck("Sure! Here is your deck:").unwrap_err();
        assert_eq!(err.code, "BAD_COMPLETION");
    }
}
