use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::Json as ResponseJson,
    routing::post,
    Json, Router,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use validator::Validate;

use crate::engine::{events, EngineError, EventSink, ProgressEvent};
use crate::models::{AppState, ResearchApiRequest, ResearchApiResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/research", post(conduct_research))
        .route("/research/stream", post(stream_research))
        .with_state(state)
}

/// Run a research request to completion and return the final answer with
/// its sources.
async fn conduct_research(
    State(state): State<AppState>,
    Json(request): Json<ResearchApiRequest>,
) -> Result<ResponseJson<ResearchApiResponse>, (StatusCode, String)> {
    info!(query = %request.query, "Received research request");

    request
        .validate()
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let engine_request = request.into_engine_request(&state.config.research);

    match state
        .engine
        .run(
            engine_request,
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
    {
        Ok(result) => {
            info!(
                iterations = result.iterations,
                sources = result.sources.len(),
                status = %result.status,
                "Research request finished"
            );
            Ok(Json(result.into()))
        }
        Err(EngineError::InvalidRequest(message)) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, message))
        }
        Err(e @ EngineError::Generation(_)) => {
            error!(error = %e, "Research could not start");
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
        Err(e @ EngineError::Cancelled) => {
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// Streaming variant: the same request, answered with one SSE message per
/// phase transition, ending with the terminal event. Dropping the
/// connection cancels the run.
async fn stream_research(
    State(state): State<AppState>,
    Json(request): Json<ResearchApiRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    info!(query = %request.query, "Received streaming research request");

    request
        .validate()
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let engine_request = request.into_engine_request(&state.config.research);
    let (sink, rx) = events::channel(64);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let engine = Arc::clone(&state.engine);
    tokio::spawn(async move {
        if let Err(e) = engine.run(engine_request, sink, cancel).await {
            // Terminal events were already emitted; this is for operators.
            error!(error = %e, "Streaming research run ended with error");
        }
    });

    let stream = ReceiverStream::new(rx).map(move |event| {
        // The guard lives as long as the client is connected; dropping the
        // stream cancels the run.
        let _ = &guard;
        Ok::<_, Infallible>(sse_event(event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(event: ProgressEvent) -> Event {
    let named = Event::default().event(event.phase_name());
    named
        .json_data(&event)
        .unwrap_or_else(|_| Event::default().event("error").data("{}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LLMConfig, ResearchConfig, SearchConfig, ServerConfig};
    use crate::engine::{
        AnswerSynthesizer, EngineLimits, GenerationUnavailable, QueryGenerator, Reflection,
        ReflectionEvaluator, ReflectionUnavailable, ResearchEngine, SearchExecutor, SearchFailure,
        SearchHit, Source, SynthesisUnavailable,
    };
    use crate::routes::create_router;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use tower::ServiceExt;

    struct OneShotGenerator;

    #[async_trait]
    impl QueryGenerator for OneShotGenerator {
        async fn generate(
            &self,
            topic: &str,
            _count: usize,
            _prior: &[String],
        ) -> Result<Vec<String>, GenerationUnavailable> {
            Ok(vec![topic.to_string()])
        }
    }

    struct OneHitSearch;

    #[async_trait]
    impl SearchExecutor for OneHitSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchFailure> {
            Ok(vec![SearchHit {
                url: "https://example.com/page".to_string(),
                title: "Example Page".to_string(),
                snippet: "an example".to_string(),
            }])
        }
    }

    struct AlwaysSufficient;

    #[async_trait]
    impl ReflectionEvaluator for AlwaysSufficient {
        async fn reflect(
            &self,
            _topic: &str,
            _round: u32,
            _sources: &[Source],
        ) -> Result<Reflection, ReflectionUnavailable> {
            Ok(Reflection {
                sufficient: true,
                follow_up_queries: Vec::new(),
                notes: Vec::new(),
            })
        }
    }

    struct EchoSynth;

    #[async_trait]
    impl AnswerSynthesizer for EchoSynth {
        async fn synthesize(
            &self,
            topic: &str,
            sources: &[Source],
        ) -> Result<String, SynthesisUnavailable> {
            let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
            Ok(format!("All about {} {}", topic, ids.join(" ")))
        }
    }

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                port: 0,
                host: "127.0.0.1".to_string(),
                cors_allowed_origins: vec!["*".to_string()],
            },
            llm: LLMConfig {
                provider: "gemini".to_string(),
                gemini_api_key: String::new(),
                openai_api_key: String::new(),
                query_generator_model: "gemini-2.0-flash-exp".to_string(),
                reflection_model: "gemini-2.0-flash-thinking-exp".to_string(),
                answer_model: "gemini-2.0-flash-exp".to_string(),
            },
            search: SearchConfig {
                serpapi_key: String::new(),
                max_results: 5,
                requests_per_second: 4,
            },
            research: ResearchConfig {
                default_max_loops: 2,
                default_initial_queries: 3,
                call_timeout_secs: 60,
                round_timeout_secs: 120,
            },
        }
    }

    fn test_state() -> AppState {
        AppState {
            config: test_config(),
            engine: Arc::new(ResearchEngine::new(
                Arc::new(OneShotGenerator),
                Arc::new(OneHitSearch),
                Arc::new(AlwaysSufficient),
                Arc::new(EchoSynth),
                EngineLimits::default(),
            )),
        }
    }

    fn research_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/research")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn research_endpoint_returns_completed_result() {
        let app = create_router(test_state());

        let response = app
            .oneshot(research_request(
                r#"{"query": "quantum computing", "max_research_loops": 2, "initial_search_query_count": 1}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["status"], "completed");
        assert_eq!(json["iterations"], 1);
        assert_eq!(json["sources"][0]["value"], "https://example.com/page");
        let short_url = json["sources"][0]["short_url"].as_str().unwrap();
        assert!(json["answer"].as_str().unwrap().contains(short_url));
    }

    #[tokio::test]
    async fn research_endpoint_rejects_empty_query() {
        let app = create_router(test_state());

        let response = app
            .oneshot(research_request(r#"{"query": ""}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn research_endpoint_rejects_zero_loops() {
        let app = create_router(test_state());

        let response = app
            .oneshot(research_request(
                r#"{"query": "topic", "max_research_loops": 0}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn stream_endpoint_emits_phase_events() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/research/stream")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"query": "quantum computing"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/event-stream"));

        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("event: generating"));
        assert!(text.contains("event: searching"));
        assert!(text.contains("event: reflecting"));
        assert!(text.contains("event: synthesizing"));
        assert!(text.contains("event: completed"));
    }

    #[tokio::test]
    async fn meta_endpoints_respond() {
        for uri in ["/", "/config", "/health"] {
            let app = create_router(test_state());
            let response = app
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "GET {}", uri);
        }
    }

    #[tokio::test]
    async fn config_endpoint_reports_models_and_limits() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/config")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["models"]["query_generator"], "gemini-2.0-flash-exp");
        assert_eq!(json["limits"]["max_research_loops"], 2);
    }
}
