// SPDX-FileCopyrightText: 2026 Aipipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end gateway tests.
//!
//! `TestHarness` assembles the gateway with a temp SQLite ledger, both
//! providers pointed at a wiremock server, and a fixed OpenRouter price
//! table. `request()` drives the router in-process.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use aipipe_auth::{CredentialClaims, CredentialVerifier, IdentityProof};
use aipipe_core::{AipipeError, BudgetPolicy, Identity};
use aipipe_cost::{BudgetResolver, CostLedger};
use aipipe_gateway::GatewayState;
use aipipe_providers::{
    upstream_client, ModelPrice, OpenAi, OpenRouter, PriceCache, Provider, ProviderRegistry,
};
use aipipe_storage::{map_tr_err, Database};
use axum::body::{to_bytes, Body, Bytes};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;
use wiremock::MockServer;

/// Secret the harness signs credentials with.
pub const TEST_SECRET: &str = "test-secret-do-not-use";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    budgets: BTreeMap<String, BudgetPolicy>,
    admins: Vec<String>,
    salts: BTreeMap<String, String>,
    prices: Vec<(String, ModelPrice)>,
    identity_proof: Option<Arc<dyn IdentityProof>>,
    idle_timeout: Duration,
    openrouter_base_url: Option<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            budgets: BTreeMap::new(),
            admins: Vec::new(),
            salts: BTreeMap::new(),
            prices: Vec::new(),
            identity_proof: None,
            idle_timeout: Duration::from_secs(30),
            openrouter_base_url: None,
        }
    }

    /// Add a budget table entry (`*`, `@domain` or an identity).
    pub fn with_budget(mut self, key: &str, limit: f64, days: u32) -> Self {
        self.budgets.insert(key.to_string(), BudgetPolicy { limit, days });
        self
    }

    pub fn with_admin(mut self, email: &str) -> Self {
        self.admins.push(email.to_string());
        self
    }

    /// Configure an invalidation tag for `email`.
    pub fn with_salt(mut self, email: &str, salt: &str) -> Self {
        self.salts.insert(email.to_string(), salt.to_string());
        self
    }

    /// Price an OpenRouter model (USD per token).
    pub fn with_openrouter_price(mut self, model: &str, prompt: f64, completion: f64, request: f64) -> Self {
        self.prices.push((
            model.to_string(),
            ModelPrice {
                prompt,
                completion,
                request,
            },
        ));
        self
    }

    pub fn with_identity_proof(mut self, proof: impl IdentityProof + 'static) -> Self {
        self.identity_proof = Some(Arc::new(proof));
        self
    }

    /// Read timeout of the forwarding client.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Point OpenRouter somewhere other than the wiremock server.
    pub fn with_openrouter_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.openrouter_base_url = Some(base_url.into());
        self
    }

    /// Build the harness, creating the temp database and mock upstream.
    pub async fn build(self) -> Result<TestHarness, AipipeError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| AipipeError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("aipipe.db");
        let db = Database::open(&db_path.to_string_lossy(), true).await?;
        let ledger = CostLedger::new(db.clone());

        let upstream = MockServer::start().await;

        let mut providers = ProviderRegistry::new();
        providers.register(Provider::OpenAi(OpenAi::new(
            "sk-upstream-openai".into(),
            upstream.uri(),
        )));
        providers.register(Provider::OpenRouter(OpenRouter::new(
            "sk-upstream-openrouter".into(),
            self.openrouter_base_url
                .unwrap_or_else(|| format!("{}/api", upstream.uri())),
            PriceCache::with_prices(self.prices),
        )));

        let credentials = Arc::new(CredentialVerifier::new(TEST_SECRET, self.salts)?);
        let state = GatewayState {
            credentials: credentials.clone(),
            identity_proof: self.identity_proof,
            admins: Arc::new(self.admins.into_iter().map(Identity::new).collect::<BTreeSet<_>>()),
            budgets: Arc::new(BudgetResolver::new(self.budgets)),
            ledger: ledger.clone(),
            providers,
            http: upstream_client(self.idle_timeout)?,
            prometheus: None,
            charges: TaskTracker::new(),
        };

        Ok(TestHarness {
            router: aipipe_gateway::router(state),
            upstream,
            ledger,
            credentials,
            db,
            _temp_dir: temp_dir,
        })
    }
}

/// A fully buffered gateway response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// The body parsed as JSON; `Value::Null` if it is not JSON.
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A gateway wired to a temp ledger and a mock upstream.
pub struct TestHarness {
    router: Router,
    /// Mock upstream serving both providers (`/v1/...` and `/api/v1/...`).
    pub upstream: MockServer,
    /// Ledger sharing the gateway's database.
    pub ledger: CostLedger,
    pub credentials: Arc<CredentialVerifier>,
    db: Database,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A credential for `email` carrying its configured invalidation tag.
    pub fn token(&self, email: &str) -> String {
        self.credentials
            .issue(&Identity::new(email))
            .unwrap_or_default()
    }

    /// A credential for `email` with an explicit (possibly stale) tag.
    pub fn token_with_salt(&self, email: &str, salt: Option<&str>) -> String {
        self.credentials
            .sign(&CredentialClaims {
                email: email.to_string(),
                salt: salt.map(str::to_string),
                iat: None,
                exp: None,
            })
            .unwrap_or_default()
    }

    /// Send a request through the gateway router.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        json_body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match json_body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).unwrap_or_default();

        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap_or_default();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, path, token, None).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, path, token, Some(body)).await
    }

    /// Run raw SQL against the ledger database, e.g. to make it fail.
    pub async fn execute_sql(&self, sql: &str) -> Result<(), AipipeError> {
        let sql = sql.to_string();
        self.db
            .connection()
            .call(move |conn| conn.execute_batch(&sql))
            .await
            .map_err(map_tr_err)
    }

    /// Wait until `email`'s spend over `days` reaches `at_least`, for charges
    /// made after a streamed response. Returns the last observed spend.
    pub async fn settled_cost(&self, email: &str, days: u32, at_least: f64) -> f64 {
        let identity = Identity::new(email);
        let mut cost = 0.0;
        for _ in 0..100 {
            cost = self.ledger.cost_since(&identity, days).await.unwrap_or(0.0);
            if cost >= at_least {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        cost
    }
}
