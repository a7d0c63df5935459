use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use store::{LexicalIndex, StoreError};
use verdict::GenerationState;

use crate::api::ClaimAnalyzer;

const MAX_HTTP_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
struct AppState {
    index: Arc<LexicalIndex>,
    analyzer: Arc<ClaimAnalyzer>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    claim: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    domain: Option<String>,
}

pub fn serve_http_with_axum(
    index: LexicalIndex,
    analyzer: ClaimAnalyzer,
    bind_addr: &str,
    worker_threads: usize,
) -> Result<(), String> {
    let worker_threads = worker_threads.max(1);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build tokio runtime: {e}"))?;

    let bind_addr = bind_addr.to_string();
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| format!("failed to bind {bind_addr}: {e}"))?;

        let state = AppState {
            index: Arc::new(index),
            analyzer: Arc::new(analyzer),
        };

        axum::serve(listener, router(state))
            .await
            .map_err(|e| format!("axum server failed: {e}"))
    })
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/analyze", post(analyze))
        .with_state(state)
        .layer(axum::extract::DefaultBodyLimit::max(MAX_HTTP_BODY_BYTES))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let generation = match state.analyzer.generation_state() {
        GenerationState::Enabled => "enabled",
        GenerationState::Disabled => "disabled",
    };
    Json(json!({
        "status": "ok",
        "index_built": state.index.is_built(),
        "passages": state.index.passages_len(),
        "generation": generation,
    }))
    .into_response()
}

async fn analyze(State(state): State<AppState>, body: Bytes) -> Response {
    let request: AnalyzeRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {err}"));
        }
    };

    // Generation performs blocking network I/O.
    let outcome = tokio::task::spawn_blocking(move || {
        let top_k = request.top_k.unwrap_or_else(|| state.analyzer.top_k());
        state
            .analyzer
            .analyze_with_top_k(&state.index, &request.claim, top_k, request.domain.as_deref())
            .map_err(|err: StoreError| err.to_string())
    })
    .await;

    match outcome {
        Ok(Ok(analysis)) => Json(analysis).into_response(),
        Ok(Err(message)) => {
            log::error!("claim analysis failed: {message}");
            error_response(StatusCode::SERVICE_UNAVAILABLE, message)
        }
        Err(err) => {
            log::error!("claim analysis task failed: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "analysis task failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use generation::{ExplanationRequest, GenerationError, TextGenerator};
    use schema::{DOMAIN_GHOST_MYTHS, DOMAIN_UFO_ENCOUNTERS, passage_builder};
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::{Duration, Instant},
    };
    use verdict::ExplanationGenerator;

    const SLOW_GENERATION: Duration = Duration::from_millis(1500);

    /// Blocks like a remote model that takes its time to answer.
    struct SlowGenerator {
        started: Arc<AtomicBool>,
    }

    impl TextGenerator for SlowGenerator {
        fn generate_explanation(
            &self,
            _request: &ExplanationRequest<'_>,
        ) -> Result<String, GenerationError> {
            self.started.store(true, Ordering::SeqCst);
            std::thread::sleep(SLOW_GENERATION);
            Ok("generated slowly".to_string())
        }
    }

    fn slow_state(started: &Arc<AtomicBool>) -> AppState {
        let generator = SlowGenerator {
            started: Arc::clone(started),
        };
        AppState {
            analyzer: Arc::new(ClaimAnalyzer::new(ExplanationGenerator::with_generator(
                Box::new(generator),
            ))),
            ..sample_state()
        }
    }

    async fn wait_for(flag: &AtomicBool) {
        while !flag.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn sample_state() -> AppState {
        let mut index = LexicalIndex::new();
        index
            .build(vec![
                passage_builder(
                    "g1",
                    "Journal of Paranormal Investigations",
                    DOMAIN_GHOST_MYTHS,
                    "ghost sightings near walls are explained by pareidolia",
                ),
                passage_builder(
                    "u1",
                    "Journal of Atmospheric Physics",
                    DOMAIN_UFO_ENCOUNTERS,
                    "lights over the city were weather balloons",
                ),
            ])
            .unwrap();
        AppState {
            index: Arc::new(index),
            analyzer: Arc::new(ClaimAnalyzer::default()),
        }
    }

    async fn body_json(response: Response<Body>) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), MAX_HTTP_BODY_BYTES)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_passages_and_generation_state() {
        let response = health(State(sample_state())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["index_built"], true);
        assert_eq!(body["passages"], 2);
        assert_eq!(body["generation"], "disabled");
    }

    #[tokio::test]
    async fn analyze_returns_verdict_and_evidence() {
        let request = Bytes::from_static(
            br#"{"claim":"Ghost sightings near walls are explained by pareidolia","top_k":1}"#,
        );
        let response = analyze(State(sample_state()), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["verdict"], "Debunked");
        assert_eq!(body["evidence"].as_array().unwrap().len(), 1);
        assert_eq!(body["evidence"][0]["passage_id"], "g1");
    }

    #[tokio::test]
    async fn analyze_applies_domain_filter() {
        let request = Bytes::from_static(br#"{"claim":"ghost walls","domain":"UFO Encounters"}"#);
        let response = analyze(State(sample_state()), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let evidence = body["evidence"].as_array().unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0]["domain"], DOMAIN_UFO_ENCOUNTERS);
    }

    #[tokio::test]
    async fn analyze_rejects_malformed_body() {
        let response = analyze(State(sample_state()), Bytes::from_static(b"{\"top_k\":3}")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("claim"));
    }

    #[tokio::test]
    async fn analyze_on_unbuilt_index_is_unavailable() {
        let state = AppState {
            index: Arc::new(LexicalIndex::new()),
            analyzer: Arc::new(ClaimAnalyzer::default()),
        };
        let response = analyze(State(state), Bytes::from_static(br#"{"claim":"ghosts"}"#)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn health_answers_while_generation_is_in_flight() {
        let started = Arc::new(AtomicBool::new(false));
        let state = slow_state(&started);
        let pending = tokio::spawn(analyze(
            State(state.clone()),
            Bytes::from_static(br#"{"claim":"ghost sightings near walls"}"#),
        ));
        wait_for(&started).await;

        let begun = Instant::now();
        let response = health(State(state)).await;
        assert!(begun.elapsed() < Duration::from_millis(500));
        let body = body_json(response).await;
        assert_eq!(body["generation"], "enabled");

        let response = pending.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["explanation"], "generated slowly");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn analysis_without_generation_is_not_queued_behind_slow_generation() {
        let started = Arc::new(AtomicBool::new(false));
        let state = slow_state(&started);
        let pending = tokio::spawn(analyze(
            State(state.clone()),
            Bytes::from_static(br#"{"claim":"ghost sightings near walls"}"#),
        ));
        wait_for(&started).await;

        let begun = Instant::now();
        let response = analyze(
            State(state),
            Bytes::from_static(br#"{"claim":"bigfoot","domain":"Cryptids"}"#),
        )
        .await;
        assert!(begun.elapsed() < Duration::from_millis(500));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["explanation"],
            crate::api::NO_EVIDENCE_EXPLANATION
        );
        assert!(!pending.is_finished());
        assert_eq!(pending.await.unwrap().status(), StatusCode::OK);
    }
}
