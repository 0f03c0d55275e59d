//! Example handlers registered under their `job_type` tag. These exist to
//! exercise the worker pool's retry/DLQ machinery in tests, not as a
//! product surface — a real deployment registers its own.

use std::sync::Arc;

use async_trait::async_trait;
use carousel_core::{CarouselError, CarouselResult, Handler, HandlerRegistry};
use serde::Deserialize;

/// Builds the registry of example handlers, the single source of truth
/// for which `job_type` tags a deployment of this pool accepts. Both the
/// worker binary and the API binary build from this so the two can never
/// drift apart on which job types are actually runnable.
pub fn build_registry() -> HandlerRegistry {
    HandlerRegistry::new()
        .register("sleep", Arc::new(SleepHandler))
        .register("word_count", Arc::new(WordCountHandler))
        .register("thumbnail", Arc::new(ThumbnailHandler))
}

/// Sleeps for `duration_secs`, then fails with probability
/// `fail_probability` (default 0). Used to drive the retry and DLQ
/// scenarios deterministically in tests by pinning `fail_probability` to
/// 0.0 or 1.0.
pub struct SleepHandler;

#[derive(Deserialize)]
struct SleepPayload {
    duration_secs: f64,
    #[serde(default)]
    fail_probability: f64,
}

#[async_trait]
impl Handler for SleepHandler {
    async fn run(&self, payload: serde_json::Value) -> CarouselResult<serde_json::Value> {
        let payload: SleepPayload = serde_json::from_value(payload)
            .map_err(|e| CarouselError::HandlerFailure(format!("bad sleep payload: {e}")))?;

        tokio::time::sleep(std::time::Duration::from_secs_f64(payload.duration_secs.max(0.0)))
            .await;

        if fastrand::f64() < payload.fail_probability.clamp(0.0, 1.0) {
            return Err(CarouselError::HandlerFailure(
                "sleep handler failed by configured fail_probability".to_string(),
            ));
        }

        Ok(serde_json::json!({ "slept_secs": payload.duration_secs }))
    }
}

/// Counts words and characters in `text`. Pure and total — cannot fail on
/// a validly-typed payload.
pub struct WordCountHandler;

#[derive(Deserialize)]
struct WordCountPayload {
    text: String,
}

#[async_trait]
impl Handler for WordCountHandler {
    async fn run(&self, payload: serde_json::Value) -> CarouselResult<serde_json::Value> {
        let payload: WordCountPayload = serde_json::from_value(payload)
            .map_err(|e| CarouselError::HandlerFailure(format!("bad word_count payload: {e}")))?;

        let words = payload.text.split_whitespace().count();
        let chars = payload.text.chars().count();

        Ok(serde_json::json!({ "words": words, "chars": chars }))
    }
}

/// Validates `{width, height}` and returns a fabricated path. No real
/// image I/O — that belongs to a concrete deployment, not this example.
pub struct ThumbnailHandler;

#[derive(Deserialize)]
struct ThumbnailPayload {
    width: u32,
    height: u32,
}

#[async_trait]
impl Handler for ThumbnailHandler {
    async fn run(&self, payload: serde_json::Value) -> CarouselResult<serde_json::Value> {
        let payload: ThumbnailPayload = serde_json::from_value(payload)
            .map_err(|e| CarouselError::HandlerFailure(format!("bad thumbnail payload: {e}")))?;

        if payload.width == 0 || payload.height == 0 {
            return Err(CarouselError::HandlerFailure(
                "thumbnail dimensions must be non-zero".to_string(),
            ));
        }

        Ok(serde_json::json!({
            "thumbnail_path": format!("/tmp/thumbnails/{}x{}.png", payload.width, payload.height)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn word_count_counts_words_and_chars() {
        let result = WordCountHandler
            .run(serde_json::json!({ "text": "hello there" }))
            .await
            .unwrap();
        assert_eq!(result["words"], 2);
        assert_eq!(result["chars"], 11);
    }

    #[tokio::test]
    async fn thumbnail_rejects_zero_dimensions() {
        let result = ThumbnailHandler
            .run(serde_json::json!({ "width": 0, "height": 10 }))
            .await;
        assert!(matches!(result, Err(CarouselError::HandlerFailure(_))));
    }

    #[tokio::test]
    async fn sleep_always_fails_at_probability_one() {
        let result = SleepHandler
            .run(serde_json::json!({ "duration_secs": 0.0, "fail_probability": 1.0 }))
            .await;
        assert!(matches!(result, Err(CarouselError::HandlerFailure(_))));
    }

    #[tokio::test]
    async fn sleep_always_succeeds_at_probability_zero() {
        let result = SleepHandler
            .run(serde_json::json!({ "duration_secs": 0.0 }))
            .await;
        assert!(result.is_ok());
    }
}
