// ai/mod.rs — Course content generation via a chat-completions backend.
//
// Thin client over the provider's /chat/completions endpoint. Transient
// failures retry with backoff; a missing API key fails fast before any
// network call.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::config::AiConfig;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::validate::ValidCourseRequest;

#[derive(Debug, Clone)]
pub struct GeneratedCourse {
    /// Markdown course outline as returned by the model.
    pub content: String,
    pub tokens_used: u64,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: u64,
}

pub struct CourseGenerator {
    config: AiConfig,
    client: reqwest::Client,
}

impl CourseGenerator {
    pub fn new(config: AiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .context("building http client")?;
        Ok(Self { config, client })
    }

    pub async fn generate(&self, request: &ValidCourseRequest) -> Result<GeneratedCourse> {
        if self.config.api_key.is_empty() {
            bail!("course generation is not configured (missing API key)");
        }

        let prompt = build_prompt(request);
        debug!(topic = %request.course_topic, "requesting course generation");

        let retry = RetryConfig {
            max_attempts: self.config.max_retries,
            ..RetryConfig::default()
        };
        let course = retry_with_backoff(&retry, || self.call_model(&prompt)).await?;
        info!(
            topic = %request.course_topic,
            tokens = course.tokens_used,
            "course content generated"
        );
        Ok(course)
    }

    async fn call_model(&self, prompt: &str) -> Result<GeneratedCourse> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&json!({
                "model": self.config.model,
                "messages": [
                    {
                        "role": "system",
                        "content": "You are a curriculum designer for a secondary-school online academy. Produce complete, age-appropriate course outlines in Markdown."
                    },
                    { "role": "user", "content": prompt }
                ],
            }))
            .send()
            .await?
            .error_for_status()?;

        let body: ChatResponse = resp.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("model returned no choices"))?;
        Ok(GeneratedCourse {
            content,
            tokens_used: body.usage.map(|u| u.total_tokens).unwrap_or(0),
        })
    }
}

fn build_prompt(request: &ValidCourseRequest) -> String {
    let mut prompt = format!(
        "Create a course outline on \"{}\" for grade {} students in the {} track.",
        request.course_topic, request.grade_level, request.track
    );
    if let Some(weeks) = request.duration {
        prompt.push_str(&format!(" The course runs for {weeks} weeks."));
    }
    if let Some(language) = &request.language {
        prompt.push_str(&format!(" Write the course in {language}."));
    }
    prompt.push_str(" Include learning objectives, weekly modules, and assessments.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ValidCourseRequest {
        ValidCourseRequest {
            course_topic: "Marine Biology".into(),
            grade_level: "10".into(),
            track: "STEM".into(),
            duration: Some(12),
            language: Some("en".into()),
        }
    }

    #[test]
    fn prompt_carries_every_field() {
        let prompt = build_prompt(&request());
        assert!(prompt.contains("Marine Biology"));
        assert!(prompt.contains("grade 10"));
        assert!(prompt.contains("STEM"));
        assert!(prompt.contains("12 weeks"));
        assert!(prompt.contains("in en"));
    }

    #[test]
    fn prompt_omits_absent_optionals() {
        let mut req = request();
        req.duration = None;
        req.language = None;
        let prompt = build_prompt(&req);
        assert!(!prompt.contains("weeks"));
        assert!(!prompt.contains("Write the course in"));
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_call() {
        let generator = CourseGenerator::new(AiConfig::default()).unwrap();
        let err = generator.generate(&request()).await.unwrap_err();
        assert!(err.to_string().contains("missing API key"));
    }
}
