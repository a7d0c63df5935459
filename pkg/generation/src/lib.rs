//! Optional remote text generation for verdict explanations.
//!
//! The analyzer only depends on [`TextGenerator`]; [`HuggingFaceClient`] is the
//! stock implementation backed by a hosted text-generation endpoint.

use std::time::Duration;

use reqwest::{
    blocking::Client,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue},
};
use schema::{EvidenceItem, FactSummary, Verdict};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "mistralai/Mistral-7B-Instruct-v0.2";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const MIN_TEMPERATURE: f32 = 0.1;
pub const MAX_TEMPERATURE: f32 = 1.0;
/// Hard ceiling on generated tokens, whatever the caller asks for.
pub const MAX_GENERATION_LENGTH: usize = 250;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const TOP_P: f32 = 0.95;

pub const PROMPT_EVIDENCE_LIMIT: usize = 3;
pub const PROMPT_EXCERPT_CHARS: usize = 300;
pub const EXPLANATION_MARKER: &str = "Explanation:";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation is disabled")]
    Disabled,
    #[error("no generation credential configured")]
    MissingCredential,
    #[error("invalid generation credential")]
    InvalidCredential,
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
    #[error("failed to encode prompt facts: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Everything a generator gets to see about one analyzed claim.
#[derive(Debug, Clone, Copy)]
pub struct ExplanationRequest<'a> {
    pub claim: &'a str,
    pub verdict: Verdict,
    pub facts: &'a FactSummary,
    pub evidence: &'a [EvidenceItem],
}

pub trait TextGenerator: Send + Sync {
    fn generate_explanation(&self, request: &ExplanationRequest<'_>)
    -> Result<String, GenerationError>;
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

pub fn build_prompt(request: &ExplanationRequest<'_>) -> Result<String, GenerationError> {
    let mut evidence_text = String::new();
    for (idx, item) in request
        .evidence
        .iter()
        .take(PROMPT_EVIDENCE_LIMIT)
        .enumerate()
    {
        evidence_text.push_str(&format!(
            "Evidence {} from {}: {}...\n\n",
            idx + 1,
            item.passage.source,
            excerpt(&item.passage.text, PROMPT_EXCERPT_CHARS)
        ));
    }
    let facts_json = serde_json::to_string_pretty(request.facts)?;

    Ok(format!(
        "Task: Generate a detailed explanation for the analysis of a paranormal claim.\n\
         \n\
         Claim: \"{claim}\"\n\
         \n\
         Evidence summary:\n\
         {evidence_text}\n\
         Key facts:\n\
         {facts_json}\n\
         \n\
         Verdict: {verdict}\n\
         \n\
         Please provide a thorough explanation for this verdict, referencing the evidence and key facts. \
         Maintain an objective, scientific tone. If debunked, explain why the claim contradicts evidence. \
         If unsupported, explain the lack of supporting evidence. If more research is needed, explain what \
         aspects require further investigation.\n\
         \n\
         {EXPLANATION_MARKER}\n",
        claim = request.claim,
        verdict = request.verdict,
    ))
}

/// Keeps only the text between the first and second `Explanation:` marker,
/// since hosted models usually echo the prompt back.
pub fn extract_explanation(generated: &str) -> String {
    match generated.split(EXPLANATION_MARKER).nth(1) {
        Some(after_marker) => after_marker.trim().to_string(),
        None => generated.trim().to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    #[serde(default)]
    generated_text: String,
}

/// Decodes a `[{"generated_text": ...}]` body into an explanation.
///
/// Anything else, including an empty explanation, is malformed.
pub fn parse_generation_response(body: &str) -> Result<String, GenerationError> {
    let outputs: Vec<GeneratedText> = serde_json::from_str(body)
        .map_err(|err| GenerationError::MalformedResponse(err.to_string()))?;
    let first = outputs
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedResponse("empty output list".to_string()))?;
    let explanation = extract_explanation(&first.generated_text);
    if explanation.is_empty() {
        return Err(GenerationError::MalformedResponse(
            "empty generated_text".to_string(),
        ));
    }
    Ok(explanation)
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_length: usize,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            endpoint: default_endpoint(DEFAULT_MODEL),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_length: MAX_GENERATION_LENGTH,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl GenerationConfig {
    pub fn from_env() -> Self {
        Self::from_env_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through `env_lookup`. Unparseable numbers fall
    /// back to defaults; temperature and length are clamped into range.
    pub fn from_env_lookup<F>(env_lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env_lookup(key).filter(|value| !value.trim().is_empty());

        let model = non_empty("BHEDI_GENERATION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let endpoint =
            non_empty("BHEDI_GENERATION_ENDPOINT").unwrap_or_else(|| default_endpoint(&model));
        let api_key =
            non_empty("BHEDI_GENERATION_API_KEY").or_else(|| non_empty("HUGGINGFACE_API_KEY"));
        let temperature = non_empty("BHEDI_GENERATION_TEMPERATURE")
            .and_then(|raw| raw.trim().parse::<f32>().ok())
            .filter(|value| value.is_finite())
            .unwrap_or(DEFAULT_TEMPERATURE);
        let max_length = non_empty("BHEDI_GENERATION_MAX_LENGTH")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .unwrap_or(MAX_GENERATION_LENGTH);
        let timeout_ms = non_empty("BHEDI_GENERATION_TIMEOUT_MS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        Self {
            model,
            endpoint,
            api_key,
            temperature: 0.0,
            max_length: 0,
            timeout: Duration::from_millis(timeout_ms),
        }
        .with_temperature(temperature)
        .with_max_length(max_length)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE);
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length.min(MAX_GENERATION_LENGTH);
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

fn default_endpoint(model: &str) -> String {
    format!("https://api-inference.huggingface.co/models/{model}")
}

#[derive(Debug, Serialize)]
struct GenerationPayload<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_new_tokens: usize,
    temperature: f32,
    top_p: f32,
    do_sample: bool,
}

/// Blocking client for a hosted text-generation inference endpoint.
pub struct HuggingFaceClient {
    config: GenerationConfig,
    headers: HeaderMap,
    client: Client,
}

impl HuggingFaceClient {
    pub fn new(config: GenerationConfig) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Self::with_http_client(config, client)
    }

    /// Uses a caller-built `reqwest` client, for proxies or custom TLS roots.
    /// `config.timeout` is not applied to it.
    pub fn with_http_client(
        config: GenerationConfig,
        client: Client,
    ) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingCredential)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
                .map_err(|_| GenerationError::InvalidCredential)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self {
            config,
            headers,
            client,
        })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

impl TextGenerator for HuggingFaceClient {
    fn generate_explanation(
        &self,
        request: &ExplanationRequest<'_>,
    ) -> Result<String, GenerationError> {
        let prompt = build_prompt(request)?;
        let payload = GenerationPayload {
            inputs: &prompt,
            parameters: GenerationParameters {
                max_new_tokens: self.config.max_length,
                temperature: self.config.temperature,
                top_p: TOP_P,
                do_sample: true,
            },
        };
        log::debug!(
            "generation request: model={}, max_new_tokens={}, temperature={}",
            self.config.model,
            self.config.max_length,
            self.config.temperature
        );
        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(self.headers.clone())
            .json(&payload)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_generation_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{DOMAIN_GHOST_MYTHS, passage_builder};
    use std::{
        collections::HashMap,
        io::{BufRead, BufReader, Read, Write},
        net::TcpListener,
        sync::mpsc,
        thread,
    };

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn evidence(id: &str, text: &str, similarity: f64) -> EvidenceItem {
        EvidenceItem {
            passage: passage_builder(id, "Journal of Paranormal Investigations", DOMAIN_GHOST_MYTHS, text),
            similarity,
        }
    }

    #[test]
    fn config_defaults_without_environment() {
        let config = GenerationConfig::from_env_lookup(lookup(&[]));
        assert_eq!(config, GenerationConfig::default());
        assert_eq!(
            config.endpoint,
            "https://api-inference.huggingface.co/models/mistralai/Mistral-7B-Instruct-v0.2"
        );
        assert!(!config.has_credential());
    }

    #[test]
    fn config_clamps_temperature_and_caps_length() {
        let config = GenerationConfig::from_env_lookup(lookup(&[
            ("BHEDI_GENERATION_TEMPERATURE", "3.5"),
            ("BHEDI_GENERATION_MAX_LENGTH", "4000"),
        ]));
        assert_eq!(config.temperature, MAX_TEMPERATURE);
        assert_eq!(config.max_length, MAX_GENERATION_LENGTH);

        let low = GenerationConfig::default()
            .with_temperature(0.0)
            .with_max_length(120);
        assert_eq!(low.temperature, MIN_TEMPERATURE);
        assert_eq!(low.max_length, 120);
    }

    #[test]
    fn config_falls_back_to_secondary_credential_and_model_endpoint() {
        let config = GenerationConfig::from_env_lookup(lookup(&[
            ("HUGGINGFACE_API_KEY", "hf_secondary"),
            ("BHEDI_GENERATION_MODEL", "org/small-model"),
            ("BHEDI_GENERATION_TIMEOUT_MS", "1500"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("hf_secondary"));
        assert_eq!(
            config.endpoint,
            "https://api-inference.huggingface.co/models/org/small-model"
        );
        assert_eq!(config.timeout, Duration::from_millis(1500));

        let primary = GenerationConfig::from_env_lookup(lookup(&[
            ("BHEDI_GENERATION_API_KEY", "hf_primary"),
            ("HUGGINGFACE_API_KEY", "hf_secondary"),
        ]));
        assert_eq!(primary.api_key.as_deref(), Some("hf_primary"));
    }

    #[test]
    fn client_requires_credential() {
        let result = HuggingFaceClient::new(GenerationConfig::default());
        assert!(matches!(result, Err(GenerationError::MissingCredential)));
    }

    #[test]
    fn prompt_includes_top_three_excerpts_facts_and_verdict() {
        let long_text = "x".repeat(400);
        let items = vec![
            evidence("e1", &long_text, 0.9),
            evidence("e2", "second passage", 0.8),
            evidence("e3", "third passage", 0.7),
            evidence("e4", "fourth passage", 0.6),
        ];
        let mut facts = FactSummary::default();
        facts.sources.insert("Journal of Paranormal Investigations".to_string());
        let request = ExplanationRequest {
            claim: "ghosts walk through walls",
            verdict: Verdict::Debunked,
            facts: &facts,
            evidence: &items,
        };
        let prompt = build_prompt(&request).unwrap();
        assert!(prompt.contains("Claim: \"ghosts walk through walls\""));
        assert!(prompt.contains(&format!(
            "Evidence 1 from Journal of Paranormal Investigations: {}...",
            "x".repeat(300)
        )));
        assert!(!prompt.contains(&"x".repeat(301)));
        assert!(prompt.contains("Evidence 3 from"));
        assert!(!prompt.contains("fourth passage"));
        assert!(prompt.contains("\"sources\": [\n"));
        assert!(prompt.contains("Verdict: Debunked"));
        assert!(prompt.trim_end().ends_with(EXPLANATION_MARKER));
    }

    #[test]
    fn response_keeps_text_after_marker() {
        let body = r#"[{"generated_text":"Task: ... Explanation:\n  Walls are solid.  "}]"#;
        assert_eq!(parse_generation_response(body).unwrap(), "Walls are solid.");
        let plain = r#"[{"generated_text":"  No marker here. "}]"#;
        assert_eq!(parse_generation_response(plain).unwrap(), "No marker here.");
    }

    #[test]
    fn response_without_usable_text_is_malformed() {
        for body in [
            "[]",
            r#"{"error":"model loading"}"#,
            r#"[{"generated_text":"Explanation:   "}]"#,
            "not json",
        ] {
            assert!(
                matches!(
                    parse_generation_response(body),
                    Err(GenerationError::MalformedResponse(_))
                ),
                "body: {body}"
            );
        }
    }

    /// Answers a single request on loopback with a canned response and hands
    /// the raw request back through the receiver.
    fn serve_once(status_line: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/models/test", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut request = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 {
                    break;
                }
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().unwrap();
                }
                request.push_str(&line);
                if line == "\r\n" {
                    break;
                }
            }
            let mut payload = vec![0u8; content_length];
            reader.read_exact(&mut payload).unwrap();
            request.push_str(&String::from_utf8_lossy(&payload));

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            reader.get_mut().write_all(response.as_bytes()).unwrap();
            let _ = tx.send(request);
        });
        (endpoint, rx)
    }

    fn loopback_client(endpoint: String, timeout: Duration) -> HuggingFaceClient {
        let config = GenerationConfig {
            endpoint,
            api_key: Some("hf_test".to_string()),
            timeout,
            ..GenerationConfig::default()
        };
        let http = Client::builder().no_proxy().timeout(timeout).build().unwrap();
        HuggingFaceClient::with_http_client(config, http).unwrap()
    }

    fn generate(client: &HuggingFaceClient) -> Result<String, GenerationError> {
        let items = vec![evidence("e1", "ghosts are pareidolia", 0.8)];
        let facts = FactSummary::default();
        client.generate_explanation(&ExplanationRequest {
            claim: "ghosts walk through walls",
            verdict: Verdict::Debunked,
            facts: &facts,
            evidence: &items,
        })
    }

    #[test]
    fn client_posts_payload_and_returns_text_after_marker() {
        let (endpoint, requests) = serve_once(
            "200 OK",
            r#"[{"generated_text":"Task: ... Explanation: Walls are solid."}]"#,
        );
        let client = loopback_client(endpoint, Duration::from_secs(5));
        assert_eq!(generate(&client).unwrap(), "Walls are solid.");

        let request = requests
            .recv_timeout(Duration::from_secs(5))
            .unwrap()
            .to_ascii_lowercase();
        assert!(request.starts_with("post /models/test "));
        assert!(request.contains("authorization: bearer hf_test"));
        assert!(request.contains("\"max_new_tokens\":250"));
        assert!(request.contains("\"do_sample\":true"));
        assert!(request.contains("ghosts walk through walls"));
    }

    #[test]
    fn client_maps_error_status_to_status_error() {
        let (endpoint, _requests) =
            serve_once("503 Service Unavailable", r#"{"error":"model is loading"}"#);
        let client = loopback_client(endpoint, Duration::from_secs(5));
        match generate(&client) {
            Err(GenerationError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert!(body.contains("model is loading"));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn client_rejects_success_without_generated_text() {
        let (endpoint, _requests) = serve_once("200 OK", r#"{"warning":"no output"}"#);
        let client = loopback_client(endpoint, Duration::from_secs(5));
        assert!(matches!(
            generate(&client),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn client_times_out_on_silent_endpoint() {
        // Connections queue in the backlog but nothing ever answers.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/models/test", listener.local_addr().unwrap());
        let client = loopback_client(endpoint, Duration::from_millis(200));
        match generate(&client) {
            Err(GenerationError::Http(err)) => assert!(err.is_timeout(), "{err}"),
            other => panic!("expected http timeout, got {other:?}"),
        }
        drop(listener);
    }
}
