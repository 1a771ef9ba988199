use std::time::Duration;

use async_trait::async_trait;

use crate::generate::{CarouselDeck, CarouselGenerator, CarouselRequest, GenerateError, Slide};
use crate::jobs::ProgressHandle;

/// Scripted generator for tests, the ctl demo and keyless local runs.
///
/// Behavior is keyed by a directive prefix on the prompt:
///   `mock:fail:CODE ...`       report some progress, then fail with CODE
///   `mock:panic ...`           panic inside the generation task
///   `mock:sleep:MS ...`        sleep before succeeding (timeout scenarios)
///   `mock:progress:a,b,c ...`  report the given percents, then succeed
/// Anything else succeeds after a small fixed progress sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockGenerator;

impl MockGenerator {
    pub fn new() -> Self {
        Self
    }
}

fn deck_for(request: &CarouselRequest) -> CarouselDeck {
    let n = request.slide_count();
    let slides = (1..=n)
        .map(|i| Slide {
            heading: format!("Slide {i}"),
            body: format!("{} (part {i} of {n})", request.prompt),
        })
        .collect();

    CarouselDeck {
        title: request.prompt.chars().take(60).collect(),
        slides,
        caption: request.tone.clone(),
    }
}

fn scripted_code(raw: &str) -> &'static str {
    match raw {
        "TIMEOUT" => "TIMEOUT",
        "RATE_LIMIT" => "RATE_LIMIT",
        "BAD_PROMPT" => "BAD_PROMPT",
        "BAD_COMPLETION" => "BAD_COMPLETION",
        _ => "PROVIDER_DOWN",
    }
}

#[async_trait]
impl CarouselGenerator for MockGenerator {
    async fn generate(
        &self,
        request: &CarouselRequest,
        progress: &ProgressHandle,
    ) -> Result<CarouselDeck, GenerateError> {
        let prompt = request.prompt.as_str();

        if let Some(rest) = prompt.strip_prefix("mock:fail:") {
            let raw = rest.split_whitespace().next().unwrap_or("PROVIDER_DOWN");
            progress.report(35, "Calling model").await;
            return Err(GenerateError::new(
                scripted_code(raw),
                format!("scripted failure for prompt {prompt:?}"),
            ));
        }

        if prompt.starts_with("mock:panic") {
            panic!("scripted panic for prompt {prompt:?}");
        }

        if let Some(rest) = prompt.strip_prefix("mock:sleep:") {
            let ms: u64 = rest
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50);
            progress.report(10, "Working slowly").await;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            return Ok(deck_for(request));
        }

        if let Some(rest) = prompt.strip_prefix("mock:progress:") {
            let seq = rest.split_whitespace().next().unwrap_or("");
            for part in seq.split(',').filter(|p| !p.is_empty()) {
                if let Ok(pct) = part.parse::<i32>() {
                    progress.report(pct, &format!("step at {pct}")).await;
                }
            }
            return Ok(deck_for(request));
        }

        progress.report(25, "Drafting slides").await;
        progress.report(60, "Writing copy").await;
        progress.report(90, "Polishing").await;
        Ok(deck_for(request))
    }
}
