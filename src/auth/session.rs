//! PKCE session manager.
//!
//! Owns the verifier and the stored credential triple, decides when the
//! access token needs renewing, and guarantees that concurrent callers who
//! all observe an expired token share one refresh request.

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;

use super::credential::{Credential, TokenResponse};
use super::error::AuthError;
use super::pkce::{code_challenge, generate_code_verifier, CHALLENGE_METHOD};
use super::store::{
    CredentialStore, ACCESS_TOKEN_KEY, CODE_VERIFIER_KEY, DISPLAY_PROFILE_KEY,
    REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY,
};
use super::token_endpoint::{HttpTokenEndpoint, TokenEndpoint, TokenEndpointError, TokenRequest};
use crate::config::SpotifyConfig;

type SharedRefresh = Shared<BoxFuture<'static, Result<String, AuthError>>>;

/// Observable lifecycle state, derived from what the store currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Unauthenticated,
    /// A verifier is stored and the authorization redirect is pending.
    AwaitingExchange,
    Authenticated,
    /// A refresh token is stored but the access token is inside the expiry buffer.
    Expired,
}

/// Query parameters of the authorization redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub error: Option<String>,
}

impl CallbackParams {
    /// Accepts a full redirect URL, a `?code=...` query, or a bare query string.
    pub fn from_query(input: &str) -> Self {
        let input = input.trim();
        let parsed = if input.contains("://") {
            Url::parse(input)
        } else {
            Url::parse(&format!("http://localhost/?{}", input.trim_start_matches('?')))
        };

        let mut params = Self::default();
        if let Ok(url) = parsed {
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "code" if !value.is_empty() => params.code = Some(value.into_owned()),
                    "error" => params.error = Some(value.into_owned()),
                    _ => {}
                }
            }
        }
        params
    }
}

struct SessionInner {
    config: SpotifyConfig,
    store: Arc<dyn CredentialStore>,
    endpoint: Arc<dyn TokenEndpoint>,
    /// Readers of the credential triple take the read side, every write or
    /// purge takes the write side, so no reader sees a half-written triple.
    credential_lock: RwLock<()>,
    in_flight: Mutex<RefreshSlot>,
}

/// The refresh currently shared by callers, tagged so that a refresh
/// orphaned by `logout()` cannot clear its successor.
#[derive(Default)]
struct RefreshSlot {
    generation: u64,
    current: Option<SharedRefresh>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(
        config: SpotifyConfig,
        store: Arc<dyn CredentialStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                store,
                endpoint,
                credential_lock: RwLock::new(()),
                in_flight: Mutex::new(RefreshSlot::default()),
            }),
        }
    }

    /// Session talking to the real accounts service.
    pub fn with_http(
        config: SpotifyConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, AuthError> {
        let endpoint = HttpTokenEndpoint::new(&config)
            .map_err(|e| AuthError::InvalidConfig(format!("HTTP client: {}", e)))?;
        Ok(Self::new(config, store, Arc::new(endpoint)))
    }

    pub fn config(&self) -> &SpotifyConfig {
        &self.inner.config
    }

    pub fn store(&self) -> Arc<dyn CredentialStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn state(&self) -> Result<SessionState, AuthError> {
        if let Some(credential) = self.inner.load()? {
            return Ok(if self.inner.is_usable(&credential) {
                SessionState::Authenticated
            } else {
                SessionState::Expired
            });
        }

        if self.inner.store.get(CODE_VERIFIER_KEY)?.is_some() {
            Ok(SessionState::AwaitingExchange)
        } else {
            Ok(SessionState::Unauthenticated)
        }
    }

    /// A session counts as authenticated as long as a refresh token is stored.
    pub fn is_authenticated(&self) -> bool {
        let _guard = self.inner.credential_lock.read();
        match self.inner.store.get(REFRESH_TOKEN_KEY) {
            Ok(token) => token.is_some(),
            Err(e) => {
                log::warn!("Could not read session store: {}", e);
                false
            }
        }
    }

    /// True when no usable access token is stored or it is inside the buffer window.
    pub fn is_token_expired(&self) -> bool {
        match self.inner.load() {
            Ok(Some(credential)) => !self.inner.is_usable(&credential),
            Ok(None) => true,
            Err(e) => {
                log::warn!("Could not read session store: {}", e);
                true
            }
        }
    }

    /// Start a login: store a fresh verifier and return the authorization URL
    /// the user agent must be sent to.
    pub fn begin_login(&self) -> Result<String, AuthError> {
        let config = &self.inner.config;
        if config.client_id.is_empty() || config.redirect_uri.is_empty() {
            return Err(AuthError::InvalidConfig(
                "client_id and redirect_uri are required".to_string(),
            ));
        }

        let verifier = generate_code_verifier();
        let challenge = code_challenge(&verifier);
        let scope = config.scope_string();

        let url = Url::parse_with_params(
            &config.authorize_endpoint(),
            &[
                ("client_id", config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("code_challenge_method", CHALLENGE_METHOD),
                ("code_challenge", challenge.as_str()),
            ],
        )
        .map_err(|e| AuthError::InvalidConfig(format!("authorize URL: {}", e)))?;

        self.inner.store.set(CODE_VERIFIER_KEY, &verifier)?;
        log::info!("Login started, redirecting to {}", config.authorize_endpoint());

        Ok(url.into())
    }

    /// Finish a login from the raw redirect (full URL or query string).
    ///
    /// A redirect without a code drops the pending verifier and nothing else.
    pub async fn handle_callback(&self, redirect: &str) -> Result<(), AuthError> {
        let params = CallbackParams::from_query(redirect);

        if let Some(error) = params.error {
            log::warn!("Authorization redirect carried an error: {}", error);
            self.inner.take_verifier()?;
            return Err(AuthError::AuthorizationDenied(error));
        }

        match params.code {
            Some(code) => self.complete_login(&code).await,
            None => {
                log::warn!("Authorization redirect carried no code");
                self.inner.take_verifier()?;
                Err(AuthError::AuthorizationDenied("missing code".to_string()))
            }
        }
    }

    /// Exchange an authorization code plus the stored verifier for a credential.
    ///
    /// The verifier is consumed whatever the outcome. A failure is never
    /// retried and leaves any credential already stored untouched.
    pub async fn complete_login(&self, code: &str) -> Result<(), AuthError> {
        let Some(code_verifier) = self.inner.take_verifier()? else {
            log::warn!("Authorization code received without a stored verifier");
            return Err(AuthError::MissingVerifier);
        };

        let request = TokenRequest::AuthorizationCode {
            code: code.to_string(),
            redirect_uri: self.inner.config.redirect_uri.clone(),
            code_verifier,
        };

        let issued_at = Utc::now();
        let result = match self.inner.request_token(&request).await {
            Ok(response) => Credential::from_response(&response, issued_at, None).map_err(|e| {
                AuthError::CodeRejected {
                    status: 200,
                    message: e.to_string(),
                }
            }),
            Err(TokenEndpointError::Rejected { status, message }) => {
                Err(AuthError::CodeRejected { status, message })
            }
            Err(TokenEndpointError::Transport(msg)) => Err(AuthError::Network(msg)),
        };

        match result {
            Ok(credential) => {
                self.inner.replace(&credential)?;
                log::info!(
                    "Authorization code exchanged, access token valid until {}",
                    credential.expires_at
                );
                Ok(())
            }
            Err(e) => {
                log::error!("Token exchange failed: {}", e);
                Err(e)
            }
        }
    }

    /// Return an access token that is outside the expiry buffer, refreshing
    /// first when needed.
    pub async fn get_valid_access_token(&self) -> Result<String, AuthError> {
        let credential = self.inner.load()?.ok_or(AuthError::NotAuthenticated)?;

        if self.inner.is_usable(&credential) {
            return Ok(credential.access_token);
        }

        log::info!("Access token expired or about to expire, refreshing");
        self.shared_refresh(false).await
    }

    /// Refresh now, even if the current access token is still usable.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }
        self.shared_refresh(true).await
    }

    /// Drop every piece of session material.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.inner.in_flight.lock().current.take();
        self.inner.purge()?;
        log::info!("Logged out");
        Ok(())
    }

    /// Write `value` under `key` only while a session exists. Runs under the
    /// credential write lock, so it cannot interleave with `logout()`.
    pub(crate) fn store_if_authenticated(&self, key: &str, value: &str) -> Result<bool, AuthError> {
        let _guard = self.inner.credential_lock.write();
        if self.inner.store.get(REFRESH_TOKEN_KEY)?.is_none() {
            return Ok(false);
        }
        self.inner.store.set(key, value)?;
        Ok(true)
    }

    fn shared_refresh(&self, force: bool) -> SharedRefresh {
        let mut slot = self.inner.in_flight.lock();
        if let Some(existing) = slot.current.as_ref() {
            log::debug!("Joining in-flight token refresh");
            return existing.clone();
        }

        slot.generation += 1;
        let generation = slot.generation;
        let inner = Arc::clone(&self.inner);
        let refresh = async move {
            let result = Arc::clone(&inner).refresh_if_needed(force).await;
            {
                let mut slot = inner.in_flight.lock();
                if slot.generation == generation {
                    slot.current = None;
                }
            }
            result
        }
        .boxed()
        .shared();

        slot.current = Some(refresh.clone());
        refresh
    }
}

impl SessionInner {
    fn load(&self) -> Result<Option<Credential>, AuthError> {
        let _guard = self.credential_lock.read();
        Credential::load(self.store.as_ref())
    }

    fn replace(&self, credential: &Credential) -> Result<(), AuthError> {
        let _guard = self.credential_lock.write();
        credential.save(self.store.as_ref())
    }

    fn take_verifier(&self) -> Result<Option<String>, AuthError> {
        let _guard = self.credential_lock.write();
        let verifier = self.store.get(CODE_VERIFIER_KEY)?;
        self.store.delete(CODE_VERIFIER_KEY)?;
        Ok(verifier)
    }

    fn purge(&self) -> Result<(), AuthError> {
        let _guard = self.credential_lock.write();
        for key in [
            ACCESS_TOKEN_KEY,
            REFRESH_TOKEN_KEY,
            TOKEN_EXPIRY_KEY,
            CODE_VERIFIER_KEY,
            DISPLAY_PROFILE_KEY,
        ] {
            self.store.delete(key)?;
        }
        Ok(())
    }

    fn is_usable(&self, credential: &Credential) -> bool {
        !credential.access_token.is_empty()
            && !credential.is_expired_at(Utc::now(), self.config.expiry_buffer)
    }

    async fn request_token(&self, request: &TokenRequest) -> Result<TokenResponse, TokenEndpointError> {
        match tokio::time::timeout(
            self.config.request_timeout,
            self.endpoint.request_token(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TokenEndpointError::Transport(format!(
                "token request timed out after {:?}",
                self.config.request_timeout
            ))),
        }
    }

    async fn refresh_if_needed(self: Arc<Self>, force: bool) -> Result<String, AuthError> {
        // A caller that read the credential before the previous refresh landed
        // may get here with a token that is already fresh again.
        let current = self.load()?.ok_or(AuthError::NotAuthenticated)?;
        if !force && self.is_usable(&current) {
            return Ok(current.access_token);
        }

        let request = TokenRequest::RefreshToken {
            refresh_token: current.refresh_token.clone(),
        };
        let attempts = self.config.refresh_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let issued_at = Utc::now();

            // A 2xx body that cannot become a credential counts as a
            // malformed response: transient, and the stored one is kept.
            let outcome = self.request_token(&request).await.and_then(|response| {
                Credential::from_response(
                    &response,
                    issued_at,
                    Some(current.refresh_token.as_str()),
                )
                .map_err(|e| TokenEndpointError::Rejected {
                    status: 200,
                    message: e.to_string(),
                })
            });

            match outcome {
                Ok(credential) => {
                    {
                        let _guard = self.credential_lock.write();
                        // logout() ran while the request was in flight
                        if self.store.get(REFRESH_TOKEN_KEY)?.is_none() {
                            return Err(AuthError::NotAuthenticated);
                        }
                        credential.save(self.store.as_ref())?;
                    }

                    log::info!(
                        "Access token refreshed, valid until {}",
                        credential.expires_at
                    );
                    return Ok(credential.access_token);
                }
                Err(TokenEndpointError::Rejected { status, message })
                    if status == 400 || status == 401 =>
                {
                    log::warn!(
                        "Refresh token rejected ({}): {}, clearing session",
                        status,
                        message
                    );
                    self.purge()?;
                    return Err(AuthError::RefreshRejected { status, message });
                }
                Err(e) => {
                    if attempt >= attempts {
                        log::error!(
                            "Token refresh failed after {} attempts: {}",
                            attempt,
                            e
                        );
                        return Err(AuthError::Network(e.to_string()));
                    }
                    log::warn!(
                        "Token refresh attempt {}/{} failed: {}, retrying in {:?}",
                        attempt,
                        attempts,
                        e,
                        self.config.refresh_retry_delay
                    );
                    tokio::time::sleep(self.config.refresh_retry_delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Token endpoint that replays scripted answers and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedEndpoint {
        responses: Mutex<VecDeque<Result<TokenResponse, TokenEndpointError>>>,
        requests: Mutex<Vec<TokenRequest>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedEndpoint {
        pub(crate) fn new(
            responses: Vec<Result<TokenResponse, TokenEndpointError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> Option<TokenRequest> {
            self.requests.lock().last().cloned()
        }
    }

    #[async_trait]
    impl TokenEndpoint for ScriptedEndpoint {
        async fn request_token(
            &self,
            request: &TokenRequest,
        ) -> Result<TokenResponse, TokenEndpointError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TokenEndpointError::Transport("no script left".into())))
        }
    }

    pub(crate) fn token(access: &str, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.to_string(),
            refresh_token: refresh.map(String::from),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
            scope: "user-top-read".to_string(),
        }
    }

    fn rejected(status: u16) -> Result<TokenResponse, TokenEndpointError> {
        Err(TokenEndpointError::Rejected {
            status,
            message: "invalid_grant".to_string(),
        })
    }

    pub(crate) fn test_config() -> SpotifyConfig {
        let mut config = SpotifyConfig::new("client-123", "http://127.0.0.1:5173/callback");
        config.refresh_retry_delay = Duration::ZERO;
        config.request_timeout = Duration::from_secs(2);
        config
    }

    fn session_with(
        endpoint: ScriptedEndpoint,
    ) -> (SessionManager, Arc<MemoryStore>, Arc<ScriptedEndpoint>) {
        let store = Arc::new(MemoryStore::new());
        let endpoint = Arc::new(endpoint);
        let session = SessionManager::new(test_config(), store.clone(), endpoint.clone());
        (session, store, endpoint)
    }

    pub(crate) fn seed_credential(store: &dyn CredentialStore, access: &str, expires_at: DateTime<Utc>) {
        Credential {
            access_token: access.to_string(),
            refresh_token: "refresh-0".to_string(),
            expires_at,
        }
        .save(store)
        .unwrap();
    }

    #[test]
    fn test_callback_params_parsing() {
        let params = CallbackParams::from_query("http://127.0.0.1:5173/callback?code=abc&state=x");
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.error, None);

        let params = CallbackParams::from_query("?error=access_denied");
        assert_eq!(params.code, None);
        assert_eq!(params.error.as_deref(), Some("access_denied"));

        assert_eq!(CallbackParams::from_query("code="), CallbackParams::default());
    }

    #[test]
    fn test_begin_login_stores_verifier_and_builds_url() {
        let (session, store, _) = session_with(ScriptedEndpoint::default());

        let url = session.begin_login().unwrap();
        let verifier = store.get(CODE_VERIFIER_KEY).unwrap().unwrap();
        assert_eq!(verifier.len(), 128);
        assert_eq!(session.state().unwrap(), SessionState::AwaitingExchange);

        let url = Url::parse(&url).unwrap();
        assert_eq!(url.path(), "/authorize");
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "client-123");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["redirect_uri"], "http://127.0.0.1:5173/callback");
        assert_eq!(query["code_challenge_method"], "S256");
        assert_eq!(query["code_challenge"], code_challenge(&verifier));
        assert!(query["scope"].contains("user-top-read"));
    }

    #[test]
    fn test_begin_login_requires_client_id() {
        let store = Arc::new(MemoryStore::new());
        let session = SessionManager::new(
            SpotifyConfig::default(),
            store.clone(),
            Arc::new(ScriptedEndpoint::default()),
        );
        assert!(matches!(
            session.begin_login(),
            Err(AuthError::InvalidConfig(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_complete_login_stores_credential_and_consumes_verifier() {
        let (session, store, endpoint) =
            session_with(ScriptedEndpoint::new(vec![Ok(token("access-1", Some("refresh-1")))]));
        session.begin_login().unwrap();
        let verifier = store.get(CODE_VERIFIER_KEY).unwrap().unwrap();

        session.complete_login("auth-code").await.unwrap();

        assert_eq!(
            endpoint.last_request(),
            Some(TokenRequest::AuthorizationCode {
                code: "auth-code".to_string(),
                redirect_uri: "http://127.0.0.1:5173/callback".to_string(),
                code_verifier: verifier,
            })
        );
        assert_eq!(store.get(CODE_VERIFIER_KEY).unwrap(), None);
        assert!(session.is_authenticated());
        assert_eq!(session.state().unwrap(), SessionState::Authenticated);
        assert_eq!(session.get_valid_access_token().await.unwrap(), "access-1");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_complete_login_without_verifier_makes_no_request() {
        let (session, _, endpoint) = session_with(ScriptedEndpoint::default());

        let err = session.complete_login("auth-code").await.unwrap_err();
        assert_eq!(err, AuthError::MissingVerifier);
        assert_eq!(endpoint.calls(), 0);
        assert_eq!(session.state().unwrap(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_rejected_code_leaves_session_unauthenticated() {
        let (session, store, endpoint) = session_with(ScriptedEndpoint::new(vec![rejected(400)]));
        session.begin_login().unwrap();

        let err = session.complete_login("bad-code").await.unwrap_err();
        assert!(matches!(err, AuthError::CodeRejected { status: 400, .. }));
        assert!(!session.is_authenticated());
        assert!(store.is_empty());

        // The verifier was single use: a second attempt cannot reach the provider.
        let err = session.complete_login("bad-code").await.unwrap_err();
        assert_eq!(err, AuthError::MissingVerifier);
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_callback_error_is_surfaced() {
        let (session, store, endpoint) = session_with(ScriptedEndpoint::default());
        session.begin_login().unwrap();

        let err = session
            .handle_callback("http://127.0.0.1:5173/callback?error=access_denied")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AuthorizationDenied("access_denied".to_string()));
        assert!(store.is_empty());
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_callback_code_is_exchanged() {
        let (session, _, _) =
            session_with(ScriptedEndpoint::new(vec![Ok(token("access-1", Some("refresh-1")))]));
        session.begin_login().unwrap();

        session.handle_callback("code=xyz").await.unwrap();
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_replayed_callback_keeps_existing_session() {
        let (session, store, endpoint) =
            session_with(ScriptedEndpoint::new(vec![Ok(token("access-1", Some("refresh-1")))]));
        session.begin_login().unwrap();
        session.handle_callback("code=xyz").await.unwrap();
        assert!(session.is_authenticated());

        // Reloading the redirect finds no verifier.
        let err = session.handle_callback("code=xyz").await.unwrap_err();
        assert_eq!(err, AuthError::MissingVerifier);
        assert!(session.is_authenticated());
        assert_eq!(
            store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("refresh-1")
        );
        assert_eq!(session.get_valid_access_token().await.unwrap(), "access-1");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_relogin_keeps_existing_session() {
        let (session, store, _) = session_with(ScriptedEndpoint::new(vec![rejected(400)]));
        seed_credential(store.as_ref(), "still-good", Utc::now() + ChronoDuration::minutes(30));
        store.set(DISPLAY_PROFILE_KEY, "{}").unwrap();
        session.begin_login().unwrap();

        let err = session.complete_login("bad-code").await.unwrap_err();
        assert!(matches!(err, AuthError::CodeRejected { status: 400, .. }));
        assert_eq!(store.get(CODE_VERIFIER_KEY).unwrap(), None);
        assert_eq!(store.get(DISPLAY_PROFILE_KEY).unwrap().as_deref(), Some("{}"));
        assert_eq!(session.get_valid_access_token().await.unwrap(), "still-good");

        let err = session
            .handle_callback("?error=access_denied")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::AuthorizationDenied("access_denied".to_string()));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_exchange_with_out_of_range_lifetime_is_rejected() {
        let mut response = token("access-1", Some("refresh-1"));
        response.expires_in = 9_000_000_000_000;
        let (session, _, _) = session_with(ScriptedEndpoint::new(vec![Ok(response)]));
        session.begin_login().unwrap();

        let err = session.complete_login("auth-code").await.unwrap_err();
        assert!(matches!(err, AuthError::CodeRejected { status: 200, .. }));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_unauthenticated_session_never_refreshes() {
        let (session, _, endpoint) = session_with(ScriptedEndpoint::default());

        assert_eq!(
            session.get_valid_access_token().await,
            Err(AuthError::NotAuthenticated)
        );
        assert_eq!(session.refresh().await, Err(AuthError::NotAuthenticated));
        assert!(session.is_token_expired());
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_token_is_returned_without_refresh() {
        let (session, store, endpoint) = session_with(ScriptedEndpoint::default());
        seed_credential(store.as_ref(), "still-good", Utc::now() + ChronoDuration::minutes(30));

        assert_eq!(session.get_valid_access_token().await.unwrap(), "still-good");
        assert!(!session.is_token_expired());
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_token_inside_buffer_is_refreshed() {
        let (session, store, endpoint) =
            session_with(ScriptedEndpoint::new(vec![Ok(token("access-2", None))]));
        // Still valid at the provider, but inside the five minute buffer.
        seed_credential(store.as_ref(), "almost-stale", Utc::now() + ChronoDuration::minutes(4));
        assert_eq!(session.state().unwrap(), SessionState::Expired);

        let before = Utc::now();
        assert_eq!(session.get_valid_access_token().await.unwrap(), "access-2");

        assert_eq!(
            endpoint.last_request(),
            Some(TokenRequest::RefreshToken {
                refresh_token: "refresh-0".to_string()
            })
        );
        let credential = Credential::load(store.as_ref()).unwrap().unwrap();
        assert_eq!(credential.access_token, "access-2");
        assert_eq!(credential.refresh_token, "refresh-0");
        assert!(credential.expires_at >= before + ChronoDuration::seconds(3600));
    }

    #[tokio::test]
    async fn test_refresh_replaces_refresh_token_when_rotated() {
        let (session, store, _) =
            session_with(ScriptedEndpoint::new(vec![Ok(token("access-2", Some("refresh-2")))]));
        seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));

        session.get_valid_access_token().await.unwrap();
        assert_eq!(
            store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("refresh-2")
        );
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_purges_session() {
        for status in [400, 401] {
            let (session, store, endpoint) =
                session_with(ScriptedEndpoint::new(vec![rejected(status)]));
            seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));
            store.set(DISPLAY_PROFILE_KEY, "{}").unwrap();

            let err = session.get_valid_access_token().await.unwrap_err();
            assert!(matches!(err, AuthError::RefreshRejected { status: s, .. } if s == status));
            assert!(!err.is_transient());
            assert!(!session.is_authenticated());
            assert!(store.is_empty());
            // Never retried.
            assert_eq!(endpoint.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_keeps_credential() {
        let (session, store, endpoint) = session_with(ScriptedEndpoint::new(vec![
            rejected(503),
            Err(TokenEndpointError::Transport("connection reset".to_string())),
            rejected(502),
        ]));
        seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));

        let err = session.get_valid_access_token().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(endpoint.calls(), 3);
        assert!(session.is_authenticated());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_transient_refresh_failure_is_retried() {
        let (session, store, endpoint) = session_with(ScriptedEndpoint::new(vec![
            Err(TokenEndpointError::Transport("dns".to_string())),
            Ok(token("access-2", None)),
        ]));
        seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));

        assert_eq!(session.get_valid_access_token().await.unwrap(), "access-2");
        assert_eq!(endpoint.calls(), 2);
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_does_not_wedge_refresh() {
        let mut overflowing = token("never", None);
        overflowing.expires_in = 9_000_000_000_000;
        let (session, store, endpoint) = session_with(ScriptedEndpoint::new(vec![
            Ok(overflowing.clone()),
            Ok(overflowing.clone()),
            Ok(overflowing),
            Ok(token("access-2", None)),
        ]));
        seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));

        let err = session.get_valid_access_token().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(endpoint.calls(), 3);
        assert!(session.is_authenticated());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("old"));
        assert!(session.inner.in_flight.lock().current.is_none());

        assert_eq!(session.get_valid_access_token().await.unwrap(), "access-2");
        assert_eq!(endpoint.calls(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let (session, store, endpoint) = session_with(
            ScriptedEndpoint::new(vec![Ok(token("access-2", None)), Ok(token("access-3", None))])
                .with_delay(Duration::from_millis(50)),
        );
        seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));

        let (a, b, c) = tokio::join!(
            session.get_valid_access_token(),
            session.get_valid_access_token(),
            session.get_valid_access_token(),
        );

        assert_eq!(a.unwrap(), "access-2");
        assert_eq!(b.unwrap(), "access-2");
        assert_eq!(c.unwrap(), "access-2");
        assert_eq!(endpoint.calls(), 1);

        // The slot is cleared once the refresh lands.
        assert_eq!(session.get_valid_access_token().await.unwrap(), "access-2");
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn test_hanging_token_endpoint_times_out() {
        let store = Arc::new(MemoryStore::new());
        let endpoint = Arc::new(
            ScriptedEndpoint::new(vec![Ok(token("late", None))]).with_delay(Duration::from_millis(200)),
        );
        let mut config = test_config();
        config.request_timeout = Duration::from_millis(20);
        config.refresh_attempts = 1;
        let session = SessionManager::new(config, store.clone(), endpoint);
        seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));

        let err = session.get_valid_access_token().await.unwrap_err();
        assert!(err.is_transient());
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_purges_everything() {
        let (session, store, _) = session_with(ScriptedEndpoint::default());
        seed_credential(store.as_ref(), "a", Utc::now() + ChronoDuration::hours(1));
        store.set(CODE_VERIFIER_KEY, "v").unwrap();
        store.set(DISPLAY_PROFILE_KEY, "{}").unwrap();

        session.logout().unwrap();

        assert!(store.is_empty());
        assert!(!session.is_authenticated());
        assert_eq!(session.state().unwrap(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_logout_during_refresh_discards_result() {
        let (session, store, _) = session_with(
            ScriptedEndpoint::new(vec![Ok(token("access-2", None))])
                .with_delay(Duration::from_millis(50)),
        );
        seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));

        let refreshing = session.get_valid_access_token();
        let logging_out = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            session.logout().unwrap();
        };
        let (result, _) = tokio::join!(refreshing, logging_out);

        assert_eq!(result, Err(AuthError::NotAuthenticated));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_orphaned_refresh_does_not_clear_successor() {
        let (session, store, endpoint) = session_with(
            ScriptedEndpoint::new(vec![Ok(token("access-a", None)), Ok(token("access-b", None))])
                .with_delay(Duration::from_millis(300)),
        );
        seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));

        let orphaned = session.get_valid_access_token();
        let relogin = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            session.logout().unwrap();
            seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));
            session.get_valid_access_token().await
        };
        // The orphaned refresh lands at ~300ms, its successor at ~400ms.
        let check_slot = async {
            tokio::time::sleep(Duration::from_millis(350)).await;
            let in_flight = session.inner.in_flight.lock().current.is_some();
            let joined = session.refresh().await;
            (in_flight, joined)
        };
        let (_, second, (in_flight, joined)) = tokio::join!(orphaned, relogin, check_slot);

        assert!(in_flight);
        assert_eq!(second.unwrap(), "access-b");
        assert_eq!(joined.unwrap(), "access-b");
        assert_eq!(endpoint.calls(), 2);
        assert!(session.inner.in_flight.lock().current.is_none());
    }

    #[test]
    fn test_store_if_authenticated_requires_session() {
        let (session, store, _) = session_with(ScriptedEndpoint::default());
        assert!(!session.store_if_authenticated(DISPLAY_PROFILE_KEY, "{}").unwrap());
        assert_eq!(store.get(DISPLAY_PROFILE_KEY).unwrap(), None);

        seed_credential(store.as_ref(), "a", Utc::now() + ChronoDuration::hours(1));
        assert!(session.store_if_authenticated(DISPLAY_PROFILE_KEY, "{}").unwrap());
        assert_eq!(store.get(DISPLAY_PROFILE_KEY).unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_revoked_refresh_over_http_purges_session() {
        let server = crate::test_support::StubServer::start().await;
        server.respond(
            "/api/token",
            400,
            r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
        );
        let mut config = test_config();
        config.accounts_url = server.url().to_string();
        let store = Arc::new(MemoryStore::new());
        let session = SessionManager::with_http(config, store.clone()).unwrap();
        seed_credential(store.as_ref(), "old", Utc::now() - ChronoDuration::minutes(1));

        assert_eq!(
            session.get_valid_access_token().await,
            Err(AuthError::RefreshRejected {
                status: 400,
                message: "Refresh token revoked".to_string(),
            })
        );
        assert!(store.is_empty());
        assert_eq!(server.requests().len(), 1);
        assert_eq!(server.requests()[0].form()["refresh_token"], "refresh-0");
    }
}
