//! Gateway HTTP server: Axum router over a shared round session

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, middleware};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use parley_core::{
    GatewayError, MAX_TARGETS, Provider, RoundOutcome, Session, TargetId, user_message,
};

use crate::auth;
use crate::protocol::{
    AddTargetRequest, AdhocRoundRequest, ErrorBody, GenerateRequest, GenerateResponse,
    PromptRequest, ProviderView, StatusResponse, TargetView,
};

/// Shared state for all handlers
#[derive(Clone)]
pub struct GatewayState {
    pub session: Arc<Session>,
    pub auth_token: Option<String>,
    pub start_time: Instant,
}

/// The gateway server
pub struct GatewayServer {
    state: GatewayState,
    bind: SocketAddr,
}

impl GatewayServer {
    pub fn new(bind: SocketAddr, auth_token: Option<String>, session: Arc<Session>) -> Self {
        let state = GatewayState {
            session,
            auth_token: auth_token.filter(|t| !t.is_empty()),
            start_time: Instant::now(),
        };
        Self { state, bind }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/status", get(status_handler))
            .route("/providers", get(providers_handler))
            .route("/targets", get(list_targets_handler).post(add_target_handler))
            .route("/targets/{id}", delete(remove_target_handler))
            .route("/rounds", post(round_handler))
            .route("/rounds/adhoc", post(adhoc_round_handler))
            .route("/rounds/latest", get(latest_round_handler))
            .route("/generate", post(generate_handler))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth::require_token,
            ));

        Router::new()
            .nest("/api", api)
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let router = self.router();
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        info!("Gateway listening on {}", listener.local_addr()?);
        if self.state.auth_token.is_none() {
            warn!("Gateway auth token not set; API is open to anyone who can reach {}", self.bind);
        }

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Gateway stopped");
        Ok(())
    }
}

/// A [`GatewayError`] rendered as `{"error": "..."}` with a matching status code
struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::EmptyPrompt
            | GatewayError::UnknownModel { .. }
            | GatewayError::UnknownProvider(_)
            | GatewayError::ConfigurationIncomplete { .. } => StatusCode::BAD_REQUEST,
            GatewayError::UnknownTarget(_) => StatusCode::NOT_FOUND,
            GatewayError::CapacityExceeded { .. } | GatewayError::RoundInFlight => {
                StatusCode::CONFLICT
            }
            GatewayError::Transport { .. }
            | GatewayError::Vendor { .. }
            | GatewayError::Normalization { .. }
            | GatewayError::HttpClientBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody::new(user_message(&self.0)))).into_response()
    }
}

// ── Handlers ──

async fn status_handler(State(state): State<GatewayState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        targets: state.session.targets().await.len(),
        max_targets: MAX_TARGETS,
        rounds_in_flight: state.session.in_flight(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn providers_handler(State(state): State<GatewayState>) -> Json<Vec<ProviderView>> {
    Json(state.session.catalog().entries().map(ProviderView::from).collect())
}

async fn list_targets_handler(State(state): State<GatewayState>) -> Json<Vec<TargetView>> {
    let targets = state.session.targets().await;
    Json(targets.iter().map(TargetView::from).collect())
}

async fn add_target_handler(
    State(state): State<GatewayState>,
    Json(req): Json<AddTargetRequest>,
) -> Result<(StatusCode, Json<TargetView>), ApiError> {
    let provider = Provider::from_id(&req.provider)?;
    let has_credential = !req.api_key.is_empty();
    let id = state
        .session
        .add_target(provider, &req.model, req.api_key)
        .await?;
    info!("Target {} added ({} / {})", id, provider.id(), req.model);
    Ok((
        StatusCode::CREATED,
        Json(TargetView {
            id,
            provider: Some(provider),
            model: req.model,
            has_credential,
        }),
    ))
}

async fn remove_target_handler(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state.session.remove_target(&TargetId::from(id.as_str())).await?;
    info!("Target {} removed", removed.id);
    Ok(StatusCode::NO_CONTENT)
}

async fn round_handler(
    State(state): State<GatewayState>,
    Json(req): Json<PromptRequest>,
) -> Result<Response, ApiError> {
    let outcome = state.session.start_round(&req.prompt).await?;
    Ok(outcome_response(outcome))
}

async fn adhoc_round_handler(
    State(state): State<GatewayState>,
    Json(req): Json<AdhocRoundRequest>,
) -> Result<Response, ApiError> {
    let round = state.session.run_round(&req.prompt, &req.targets).await?;
    Ok(Json(round).into_response())
}

async fn latest_round_handler(State(state): State<GatewayState>) -> Response {
    match state.session.latest().await {
        Some(round) => Json(round).into_response(),
        None => (StatusCode::NOT_FOUND, Json(ErrorBody::new("No round has completed yet")))
            .into_response(),
    }
}

/// Single-target passthrough: raw vendor payload, no normalization.
async fn generate_handler(
    State(state): State<GatewayState>,
    Json(req): Json<GenerateRequest>,
) -> Response {
    let Ok(provider) = Provider::from_id(&req.provider) else {
        debug!("Rejecting generate for provider '{}'", req.provider);
        return (StatusCode::BAD_REQUEST, Json(ErrorBody::new("Unsupported provider")))
            .into_response();
    };

    let mut missing = Vec::new();
    if req.model.trim().is_empty() {
        missing.push("model");
    }
    if req.api_key.is_empty() {
        missing.push("credential");
    }
    if !missing.is_empty() {
        return ApiError(GatewayError::ConfigurationIncomplete { missing }).into_response();
    }
    if let Err(e) = state.session.catalog().validate(provider, &req.model) {
        return ApiError(e).into_response();
    }
    if req.prompt.trim().is_empty() {
        return ApiError(GatewayError::EmptyPrompt).into_response();
    }

    match state
        .session
        .dispatcher()
        .invoke_raw(provider, &req.model, &req.api_key, &req.prompt)
        .await
    {
        Ok(payload) => Json(GenerateResponse {
            output: payload.output,
        })
        .into_response(),
        Err(e) => {
            warn!("Generate via {} / {} failed: {}", provider.id(), req.model, e);
            ApiError(e).into_response()
        }
    }
}

fn outcome_response(outcome: RoundOutcome) -> Response {
    match outcome {
        RoundOutcome::Completed(round) => Json(round).into_response(),
        RoundOutcome::Superseded { round_id } => (
            StatusCode::CONFLICT,
            Json(ErrorBody::new(format!(
                "Round {} was superseded by a newer prompt",
                round_id
            ))),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parley_core::{
        AdapterSet, Credential, DispatchConfig, Dispatcher, ProviderAdapter, ProviderCatalog,
        RawPayload, TargetStore,
    };
    use serde_json::{Value, json};
    use std::time::Duration;

    /// Replies with a fixed payload, or fails with a fixed vendor body.
    struct MockAdapter {
        provider: Provider,
        reply: Result<Value, (u16, Value)>,
    }

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn invoke(
            &self,
            _prompt: &str,
            _model: &str,
            _credential: &Credential,
        ) -> Result<RawPayload, GatewayError> {
            match &self.reply {
                Ok(output) => Ok(RawPayload::new(output.clone())),
                Err((status, body)) => Err(GatewayError::Vendor {
                    provider: self.provider,
                    status: *status,
                    body: Some(body.clone()),
                }),
            }
        }
    }

    fn session() -> Arc<Session> {
        let adapters = AdapterSet::new()
            .with(Arc::new(MockAdapter {
                provider: Provider::OpenAi,
                reply: Ok(json!({"text": "4"})),
            }))
            .with(Arc::new(MockAdapter {
                provider: Provider::Anthropic,
                reply: Err((401, json!({"error": {"message": "invalid credential"}}))),
            }));
        let dispatcher = Dispatcher::new(
            adapters,
            DispatchConfig {
                call_timeout: Duration::from_secs(5),
            },
        );
        let store = TargetStore::new(Arc::new(ProviderCatalog::builtin()));
        Arc::new(Session::new(store, dispatcher))
    }

    /// Bind the router on an ephemeral port and return its base URL.
    async fn serve(token: Option<&str>) -> String {
        let server = GatewayServer::new(
            "127.0.0.1:0".parse().unwrap(),
            token.map(str::to_string),
            session(),
        );
        let router = server.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_status_and_providers() {
        let base = serve(None).await;
        let client = reqwest::Client::new();

        let status: Value = client
            .get(format!("{}/api/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status"], "ok");
        assert_eq!(status["maxTargets"], 3);

        let providers: Value = client
            .get(format!("{}/api/providers", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let ids: Vec<&str> = providers
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["openai", "anthropic", "gemini"]);
    }

    #[tokio::test]
    async fn test_target_lifecycle() {
        let base = serve(None).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/targets", base);

        let resp = client
            .post(&url)
            .json(&json!({"provider": "openai", "model": "gpt-4o", "apiKey": "sk-secret-value"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let created: Value = resp.json().await.unwrap();
        assert!(!created.to_string().contains("sk-secret-value"));
        let id = created["id"].as_str().unwrap().to_string();

        let resp = client
            .post(&url)
            .json(&json!({"provider": "openai", "model": "gpt-5", "apiKey": "sk-x"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let listed: Value = client.get(&url).send().await.unwrap().json().await.unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["hasCredential"], true);

        let resp = client.delete(format!("{}/{}", url, id)).send().await.unwrap();
        assert_eq!(resp.status(), 204);
        let resp = client.delete(format!("{}/{}", url, id)).send().await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let base = serve(None).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/targets", base);
        let body = json!({"provider": "gemini", "model": "gemini-pro", "apiKey": "AIza"});

        for _ in 0..3 {
            let resp = client.post(&url).json(&body).send().await.unwrap();
            assert_eq!(resp.status(), 201);
        }
        let resp = client.post(&url).json(&body).send().await.unwrap();
        assert_eq!(resp.status(), 409);
    }

    #[tokio::test]
    async fn test_round_over_stored_targets_becomes_latest() {
        let base = serve(None).await;
        let client = reqwest::Client::new();

        let resp = client
            .get(format!("{}/api/rounds/latest", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);

        client
            .post(format!("{}/api/targets", base))
            .json(&json!({"provider": "openai", "model": "gpt-4o", "apiKey": "sk-valid"}))
            .send()
            .await
            .unwrap();

        let round: Value = client
            .post(format!("{}/api/rounds", base))
            .json(&json!({"prompt": "2+2?"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(round["results"][0]["status"], "succeeded");
        assert_eq!(round["results"][0]["text"], "4");

        let latest: Value = client
            .get(format!("{}/api/rounds/latest", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(latest["roundId"], round["roundId"]);
    }

    #[tokio::test]
    async fn test_adhoc_round_mixed_outcomes() {
        let base = serve(None).await;
        let round: Value = reqwest::Client::new()
            .post(format!("{}/api/rounds/adhoc", base))
            .json(&json!({
                "prompt": "2+2?",
                "targets": [
                    {"id": "t1", "provider": "openai", "model": "gpt-4o", "apiKey": "sk-valid"},
                    {"id": "t2", "provider": "anthropic", "model": "claude-3-opus-20240229", "apiKey": "bad"},
                    {"id": "t3", "provider": "gemini"}
                ]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let results = round["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["targetId"], "t1");
        assert_eq!(results[0]["text"], "4");
        assert_eq!(results[1]["status"], "failed");
        assert_eq!(results[1]["errorMessage"], "invalid credential");
        assert_eq!(
            results[2]["errorMessage"],
            "Configuration incomplete: provider, model and API key are required"
        );
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let base = serve(None).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/rounds", base))
            .json(&json!({"prompt": "  "}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn test_generate_contract() {
        let base = serve(None).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/generate", base);

        let resp = client
            .post(&url)
            .json(&json!({"provider": "mistral", "model": "m", "prompt": "hi", "apiKey": "k"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "Unsupported provider"}));

        let resp = client
            .post(&url)
            .json(&json!({"provider": "openai", "model": "gpt-4o", "prompt": "hi", "apiKey": "sk-valid"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"output": {"text": "4"}}));

        let resp = client
            .post(&url)
            .json(&json!({"provider": "anthropic", "model": "claude-3-opus-20240229", "prompt": "hi", "apiKey": "bad"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body, json!({"error": "invalid credential"}));
    }

    #[tokio::test]
    async fn test_adhoc_round_validates_targets() {
        let base = serve(None).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/rounds/adhoc", base);
        let gemini = json!({"provider": "gemini", "model": "../../../v1/files?x=", "apiKey": "AIza"});

        let resp = client
            .post(&url)
            .json(&json!({"prompt": "hi", "targets": [gemini]}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("not available"));

        let legal = json!({"provider": "google", "model": "gemini-pro", "apiKey": "AIza"});
        let targets: Vec<Value> = vec![legal; 5];
        let resp = client
            .post(&url)
            .json(&json!({"prompt": "hi", "targets": targets}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 409);
    }

    #[tokio::test]
    async fn test_generate_rejects_unknown_model() {
        let base = serve(None).await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/generate", base))
            .json(&json!({"provider": "openai", "model": "not-a-model", "prompt": "hi", "apiKey": "sk-valid"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "model 'not-a-model' is not available for OpenAI");
    }

    #[tokio::test]
    async fn test_bearer_token_required_when_configured() {
        let base = serve(Some("gateway-secret")).await;
        let client = reqwest::Client::new();
        let url = format!("{}/api/status", base);

        let resp = client.get(&url).send().await.unwrap();
        assert_eq!(resp.status(), 401);

        let resp = client
            .get(&url)
            .bearer_auth("gateway-secret")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}
