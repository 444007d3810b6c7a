//! Narrative summaries for worklog reports.
//!
//! Talks to any OpenAI-compatible chat-completions endpoint. The API key,
//! model, endpoint and system prompt are all passed in by the caller; this
//! crate never reads the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const SUMMARY_TEMPERATURE: f32 = 0.3;

/// System prompt used when the caller supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a technical writing assistant. From the git commit log provided, write a structured work summary.

Requirements:
1. Use Markdown.
2. Include:
   - An overview of the work (3-5 sentences)
   - Main deliverables, grouped by module
   - Statistics (commit counts, sessions, time spent)
   - Notable technical improvements
3. Keep it concise and professional.
4. Focus on code improvements, new features and bug fixes.

Work session timeline:
If the log contains work session statistics, draw a compact timeline of the sessions showing each session's time range, its commit count or main area, the gaps between sessions and any switches between projects. When parallel work periods are listed, mark them clearly: time spent on several projects at once must not be added up twice.

A Markdown table or a Mermaid gantt chart with 10-minute resolution both work.";

const PER_PROJECT_HINT: &str =
    "Also estimate the time invested per project from commit density and continuity, and list each project's main output.";

/// LLM client errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The provided API key was invalid.
    #[error("invalid API key: {reason}")]
    InvalidApiKey { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// A chat-completions vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    DeepSeek,
}

impl Provider {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
        }
    }

    pub const fn endpoint(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
        }
    }

    pub const fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::DeepSeek => "deepseek-chat",
        }
    }

    /// Conventional environment variable holding this vendor's key.
    pub const fn api_key_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            _ => Err(format!("unknown provider: {s} (expected openai or deepseek)")),
        }
    }
}

/// Chat-completions client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client for a provider's public endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is empty or whitespace-only, or if
    /// the HTTP client fails to build.
    pub fn new(api_key: impl Into<String>, provider: Provider) -> Result<Self, LlmError> {
        Self::with_endpoint(api_key, provider.endpoint())
    }

    /// Creates a client for an arbitrary OpenAI-compatible endpoint.
    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.into();

        if api_key.is_empty() {
            return Err(LlmError::InvalidApiKey {
                reason: "API key cannot be empty",
            });
        }
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidApiKey {
                reason: "API key cannot be whitespace-only",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(LlmError::ClientBuild)?;

        Ok(Self {
            http,
            api_key,
            endpoint: endpoint.into(),
        })
    }

    /// Asks the model for a narrative summary of a worklog.
    pub async fn summarize(&self, model: &str, input: &SummaryRequest) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: model.to_string(),
            temperature: SUMMARY_TEMPERATURE,
            messages: build_messages(input),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| LlmError::Api {
                message: format!("status {status}: {body}"),
            }));
        }

        parse_summary(&body)
    }
}

/// Input for a summary request.
#[derive(Debug, Clone, Default)]
pub struct SummaryRequest {
    /// Rendered worklog handed to the model as the user message.
    pub context: String,
    /// Overrides [`DEFAULT_SYSTEM_PROMPT`] when set.
    pub system_prompt: Option<String>,
    /// Restricts the summary to one author.
    pub author: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn build_messages(input: &SummaryRequest) -> Vec<Message> {
    let mut system = input
        .system_prompt
        .clone()
        .unwrap_or_else(|| format!("{DEFAULT_SYSTEM_PROMPT}\n{PER_PROJECT_HINT}"));
    if let Some(author) = &input.author {
        system.push_str(&format!(
            "\nOnly summarize commits whose author name or email contains \"{author}\", and start the summary with: Author: {author}."
        ));
    }
    vec![
        Message {
            role: "system",
            content: system,
        },
        Message {
            role: "user",
            content: format!(
                "Write a work summary from the following commit log:\n\n{}",
                input.context
            ),
        },
    ]
}

fn parse_summary(body: &str) -> Result<String, LlmError> {
    let payload: ChatResponse =
        serde_json::from_str(body).map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
    let text = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        return Err(LlmError::InvalidResponse(
            "missing message content".to_string(),
        ));
    }
    Ok(text)
}

fn parse_api_error(body: &str) -> Option<LlmError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| LlmError::Api {
            message: payload.error.message,
        })
}
