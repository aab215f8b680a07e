//! Main SessionClient

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::auth::CheckOutcome;
use crate::auth::CookieSource;
use crate::auth::ExpiryBody;
use crate::auth::HttpRefreshEndpoint;
use crate::auth::JarCookies;
use crate::auth::RefreshCoordinator;
use crate::auth::ScheduledTask;
use crate::auth::SessionMonitor;
use crate::auth::SessionTerminator;
use crate::config::SessionConfig;
use crate::error::ApiError;
use crate::error::RefreshError;
use crate::error::RequestError;
use crate::host::SessionHost;
use crate::policy::FailureContext;
use crate::policy::SilentErrorPolicy;
use crate::request::ApiRequest;
use crate::response::ApiResponse;

/// An HTTP client for the storefront API that keeps the session alive.
///
/// Every request goes through the same pipeline:
///
/// 1. **Proactive refresh**: if the access token expires within the expiry
///    buffer, the request waits for a refresh first.
/// 2. **Dispatch** with the shared cookie jar.
/// 3. **Reactive refresh**: a 401 from a non-auth endpoint triggers one
///    refresh, after which the original request is replayed exactly once.
///    The replay's result is final, whatever its status.
/// 4. **Classification**: failures are marked silent or visible by the
///    [`SilentErrorPolicy`].
///
/// Refreshes from all requests go through one [`RefreshCoordinator`], so
/// concurrent requests never produce more than one refresh call.
///
/// This client is cheap to clone (uses `Arc` internally) and can be shared
/// across tasks safely.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use storefront_session::{SessionClient, Credentials, ApiRequest};
/// use storefront_session::host::MemoryHost;
///
/// let client = SessionClient::builder()
///     .url("https://shop.example.com")
///     .host(Arc::new(MemoryHost::at("/admin/orders")))
///     .build()?;
///
/// client.login(&Credentials::new("admin@shop.example.com", "secret")).await?;
/// let orders = client.send(ApiRequest::get("/api/orders")).await?;
/// ```
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<SessionClientInner>,
}

struct SessionClientInner {
    base_url: String,
    http_client: Client,
    cookies: Arc<JarCookies>,
    host: Arc<dyn SessionHost>,
    coordinator: RefreshCoordinator,
    policy: SilentErrorPolicy,
    config: SessionConfig,
    timeout: Option<Duration>,
    monitor: Mutex<Option<ScheduledTask>>,
}

/// Login credentials.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials from an email and password.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl SessionClient {
    /// Creates a new builder for constructing a client.
    pub fn builder() -> SessionClientBuilder<Missing, Missing> {
        SessionClientBuilder::new()
    }

    /// Sends a request through the session pipeline.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        let endpoints = &self.inner.config.endpoints;
        let bypass = endpoints.bypasses_refresh(request.path());

        if !bypass {
            self.refresh_if_expiring(&request).await?;
        }

        let response = self
            .dispatch(&request)
            .await
            .map_err(|err| self.fail(&request, err))?;

        if response.status() != 401 || bypass {
            return self.finish(&request, response);
        }

        if !self.can_refresh() {
            log::debug!(
                "{} {} returned 401 with no usable refresh cookie",
                request.method(),
                request.path()
            );
            return self.finish(&request, response);
        }

        log::debug!(
            "{} {} returned 401, refreshing token before retry",
            request.method(),
            request.path()
        );

        match self.inner.coordinator.ensure_fresh_token().await {
            Ok(()) => {
                let retry = self
                    .dispatch(&request)
                    .await
                    .map_err(|err| self.fail(&request, err))?;
                self.finish(&request, retry)
            }
            Err(err) => {
                log::debug!("refresh before retry failed: {}", err);
                self.finish(&request, response)
            }
        }
    }

    /// Sends a `GET` and parses the JSON response.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, RequestError> {
        let request = ApiRequest::get(path);
        self.send_json(request).await
    }

    /// Sends a `POST` with a JSON body and parses the JSON response.
    pub async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        let request = ApiRequest::post(path).json(to_value(&reqwest::Method::POST, path, body)?);
        self.send_json(request).await
    }

    /// Sends a `PUT` with a JSON body and parses the JSON response.
    pub async fn put_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        let request = ApiRequest::put(path).json(to_value(&reqwest::Method::PUT, path, body)?);
        self.send_json(request).await
    }

    /// Sends a `DELETE`.
    pub async fn delete(&self, path: &str) -> Result<(), RequestError> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    /// Logs in and starts the background session check.
    ///
    /// Stores the returned user in the host (the `user` field of the response,
    /// or the whole body if absent) and records the token expiry.
    pub async fn login(&self, credentials: &Credentials) -> Result<Value, RequestError> {
        let path = self.inner.config.endpoints.login.clone();
        let request =
            ApiRequest::post(&path).json(to_value(&reqwest::Method::POST, &path, credentials)?);
        let response = self.send(request).await?;

        let body: Value = response
            .json()
            .map_err(|err| self.fail(&ApiRequest::post(&path), err))?;
        let expiry = serde_json::from_value::<ExpiryBody>(body.clone())
            .map_err(|err| err.to_string())
            .and_then(ExpiryBody::into_expiry)
            .unwrap_or_else(|err| {
                log::warn!("ignoring login token expiry: {}", err);
                Default::default()
            });
        let user = body.get("user").cloned().unwrap_or(body);

        self.inner.coordinator.record_login(expiry).await;
        self.inner.host.set_user(user.clone());
        self.start_session_monitor();

        log::info!("logged in");
        Ok(user)
    }

    /// Logs out.
    ///
    /// Local session state is always cleared; the returned error only
    /// reports whether the server acknowledged the logout.
    pub async fn logout(&self) -> Result<(), RequestError> {
        self.stop_session_monitor();

        let path = self.inner.config.endpoints.logout.clone();
        let result = self.send(ApiRequest::post(path).silent()).await;
        if let Err(err) = &result {
            log::debug!("logout call failed: {}", err);
        }

        self.inner.coordinator.clear().await;
        self.inner.cookies.expire(&self.inner.config.refresh_cookie);
        self.inner.host.clear_user();

        log::info!("logged out");
        result.map(|_| ())
    }

    /// Starts (or restarts) the background session check.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_session_monitor(&self) {
        let config = &self.inner.config;
        let task = self
            .session_monitor()
            .start(config.check_initial_delay, config.check_interval);
        let previous = self.lock_monitor().replace(task);
        drop(previous);
    }

    /// Stops the background session check, if running.
    pub fn stop_session_monitor(&self) {
        let task = self.lock_monitor().take();
        if let Some(task) = task {
            task.cancel();
        }
    }

    /// Returns `true` while the background session check is scheduled.
    pub fn is_monitoring(&self) -> bool {
        self.lock_monitor()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Runs one background session check now.
    pub async fn check_session(&self) -> CheckOutcome {
        self.session_monitor().check().await
    }

    /// Returns `true` if the refresh-token cookie is present.
    pub fn has_refresh_cookie(&self) -> bool {
        self.inner
            .cookies
            .has_cookie(&self.inner.config.refresh_cookie)
    }

    /// Returns the refresh coordinator.
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Returns the base URL of the storefront API.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    // -------------------------------------------------------------------------
    // Pipeline
    // -------------------------------------------------------------------------

    async fn refresh_if_expiring(&self, request: &ApiRequest) -> Result<(), RequestError> {
        let coordinator = &self.inner.coordinator;
        if !coordinator.needs_refresh() {
            return Ok(());
        }

        if !self.can_refresh() {
            log::debug!("access token expiring but no usable refresh cookie");
            return Ok(());
        }

        match coordinator.ensure_fresh_token().await {
            Ok(()) => Ok(()),
            Err(RefreshError::RateLimited { .. }) => {
                log::debug!("proactive refresh rate limited, sending request anyway");
                Ok(())
            }
            Err(err) => Err(self.fail(request, ApiError::Refresh(err))),
        }
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut url = self.url(request.path())?;
        if !request.query_pairs().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query_pairs());
        }

        let mut builder = self
            .inner
            .http_client
            .request(request.method().clone(), url);

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        if let Some(timeout) = self.inner.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(ApiResponse::new(status, headers, body))
    }

    fn finish(
        &self,
        request: &ApiRequest,
        response: ApiResponse,
    ) -> Result<ApiResponse, RequestError> {
        if response.is_success() {
            return Ok(response);
        }
        let status = response.status();
        Err(self.fail(request, ApiError::from_body(status, response.into_text())))
    }

    /// Wraps an error with its visibility and logs it accordingly.
    fn fail(&self, request: &ApiRequest, err: ApiError) -> RequestError {
        let endpoints = &self.inner.config.endpoints;
        // A failed held-back refresh is a refresh endpoint failure.
        let (endpoint, status) = match &err {
            ApiError::Refresh(refresh) if refresh.is_auth_failure() || refresh.is_force_logout() => {
                (endpoints.refresh.as_str(), Some(401))
            }
            ApiError::Refresh(_) => (endpoints.refresh.as_str(), None),
            other => (request.path(), other.status_code()),
        };

        let route = self.inner.host.current_path();
        let silent = self.inner.policy.is_silent(&FailureContext {
            endpoint,
            status,
            route: &route,
            has_refresh_cookie: self.can_refresh(),
            silent_requested: request.is_silent(),
        });

        let error = RequestError::new(request.method().clone(), request.path(), err)
            .with_silent(silent);
        if silent {
            log::debug!("{}", error);
        } else {
            log::warn!("{}", error);
        }
        error
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<T, RequestError> {
        let response = self.send(request.clone()).await?;
        response.json().map_err(|err| self.fail(&request, err))
    }

    /// A refresh is worth trying: the cookie is present and not known to be expired.
    fn can_refresh(&self) -> bool {
        self.has_refresh_cookie() && !self.inner.coordinator.token_expiry().refresh_expired()
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        join_url(&self.inner.base_url, path)
    }

    fn session_monitor(&self) -> SessionMonitor {
        SessionMonitor::new(
            self.inner.coordinator.clone(),
            self.inner.host.clone(),
            self.inner.cookies.clone(),
            &self.inner.config,
        )
    }

    fn lock_monitor(&self) -> std::sync::MutexGuard<'_, Option<ScheduledTask>> {
        self.inner
            .monitor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("base_url", &self.inner.base_url)
            .field("coordinator", &self.inner.coordinator)
            .finish()
    }
}

fn to_value<B: Serialize>(
    method: &reqwest::Method,
    path: &str,
    body: &B,
) -> Result<Value, RequestError> {
    serde_json::to_value(body).map_err(|err| {
        RequestError::new(
            method.clone(),
            path,
            ApiError::Parse {
                message: format!("request body: {}", err),
                body: None,
            },
        )
    })
}

fn join_url(base_url: &str, path: &str) -> Result<Url, ApiError> {
    let raw = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))
}

// =============================================================================
// Typestate Builder
// =============================================================================

/// Marker type for missing required builder fields.
pub struct Missing;

/// Marker type for set builder fields.
pub struct Set<T>(T);

/// Builder for constructing a [`SessionClient`].
///
/// Uses the typestate pattern to ensure required fields are set at compile time.
///
/// # Required Fields
///
/// - `url` - The storefront API base URL
/// - `host` - The embedding application, as a [`SessionHost`]
///
/// # Example
///
/// ```ignore
/// let client = SessionClient::builder()
///     .url("https://shop.example.com")
///     .host(host)
///     .config(SessionConfig::default().with_failure_threshold(5))
///     .timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub struct SessionClientBuilder<U, H> {
    url: U,
    host: H,
    config: SessionConfig,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    http_client: Option<Client>,
    cookie_jar: Option<Arc<Jar>>,
}

impl SessionClientBuilder<Missing, Missing> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            url: Missing,
            host: Missing,
            config: SessionConfig::default(),
            timeout: None,
            connect_timeout: None,
            http_client: None,
            cookie_jar: None,
        }
    }
}

impl Default for SessionClientBuilder<Missing, Missing> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> SessionClientBuilder<Missing, H> {
    /// Sets the storefront API base URL.
    ///
    /// # Example
    ///
    /// ```ignore
    /// .url("https://shop.example.com")
    /// ```
    pub fn url(self, url: impl Into<String>) -> SessionClientBuilder<Set<String>, H> {
        SessionClientBuilder {
            url: Set(url.into()),
            host: self.host,
            config: self.config,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            http_client: self.http_client,
            cookie_jar: self.cookie_jar,
        }
    }
}

impl<U> SessionClientBuilder<U, Missing> {
    /// Sets the embedding application.
    pub fn host<T: SessionHost + 'static>(
        self,
        host: Arc<T>,
    ) -> SessionClientBuilder<U, Set<Arc<dyn SessionHost>>> {
        SessionClientBuilder {
            url: self.url,
            host: Set(host as Arc<dyn SessionHost>),
            config: self.config,
            timeout: self.timeout,
            connect_timeout: self.connect_timeout,
            http_client: self.http_client,
            cookie_jar: self.cookie_jar,
        }
    }
}

impl<U, H> SessionClientBuilder<U, H> {
    /// Sets the session configuration.
    ///
    /// Defaults to [`SessionConfig::default`].
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connection timeout.
    ///
    /// This is applied when building the HTTP client.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets a custom HTTP client.
    ///
    /// The client must have been built with the same jar passed to
    /// [`cookie_jar`](Self::cookie_jar), or refresh-token presence cannot be
    /// observed.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the cookie jar.
    ///
    /// If not set, a new empty jar is created.
    pub fn cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }
}

impl SessionClientBuilder<Set<String>, Set<Arc<dyn SessionHost>>> {
    /// Builds the [`SessionClient`].
    ///
    /// This method is only available when both `url` and `host` have been set.
    pub fn build(self) -> Result<SessionClient, ApiError> {
        let base_url = self.url.0;
        let refresh_url = join_url(&base_url, &self.config.endpoints.refresh)?;

        let jar = self.cookie_jar.unwrap_or_default();
        let http_client = match self.http_client {
            Some(client) => client,
            None => {
                let mut builder = Client::builder().cookie_provider(jar.clone());
                if let Some(timeout) = self.connect_timeout {
                    builder = builder.connect_timeout(timeout);
                }
                builder.build()?
            }
        };

        let host = self.host.0;
        let endpoint =
            HttpRefreshEndpoint::new(http_client.clone(), refresh_url.clone())
                .with_timeout(self.timeout);
        let terminator = SessionTerminator::new(host.clone(), &self.config);
        let coordinator = RefreshCoordinator::new(endpoint, terminator, &self.config);
        let policy = SilentErrorPolicy::new(
            self.config.endpoints.clone(),
            self.config.routes.clone(),
        );

        Ok(SessionClient {
            inner: Arc::new(SessionClientInner {
                base_url,
                http_client,
                cookies: Arc::new(JarCookies::new(jar, refresh_url)),
                host,
                coordinator,
                policy,
                config: self.config,
                timeout: self.timeout,
                monitor: Mutex::new(None),
            }),
        })
    }
}
