use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex},
    time::Duration,
};

use capsuleer_core::time::Timestamp;
use tokio::{sync::Mutex as AsyncMutex, time::Instant};

use super::{
    callback::CallbackListener,
    types::{Credential, LoginRequest, SessionState},
};
use crate::{
    EsiError, EsiResult,
    client::SsoAuthClient,
    config::DEFAULT_CALLBACK_URL,
    errors::AuthError,
    token_store::{RefreshLock, TokenStore},
};

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

pub struct AuthService<C, S, T = SystemClock>
where
    C: SsoAuthClient,
    S: TokenStore,
    T: Clock,
{
    client: C,
    store: S,
    required_scopes: Vec<String>,
    clock: T,
    refresh_skew: Duration,
    callback_url: String,
    callback_timeout: Duration,
    lock_wait: Duration,
    lock_poll_interval: Duration,
    character_gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<C, S> AuthService<C, S, SystemClock>
where
    C: SsoAuthClient,
    S: TokenStore,
{
    pub fn new(client: C, store: S, required_scopes: Vec<String>) -> Self {
        Self::with_clock(client, store, required_scopes, SystemClock)
    }
}

impl<C, S, T> AuthService<C, S, T>
where
    C: SsoAuthClient,
    S: TokenStore,
    T: Clock,
{
    pub fn with_clock(client: C, store: S, required_scopes: Vec<String>, clock: T) -> Self {
        Self {
            client,
            store,
            required_scopes,
            clock,
            refresh_skew: Duration::from_secs(60),
            callback_url: DEFAULT_CALLBACK_URL.to_owned(),
            callback_timeout: Duration::from_secs(120),
            lock_wait: Duration::from_secs(30),
            lock_poll_interval: Duration::from_millis(50),
            character_gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_refresh_skew(mut self, refresh_skew: Duration) -> Self {
        self.refresh_skew = refresh_skew;
        self
    }

    pub fn with_callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = callback_url.into();
        self
    }

    pub fn with_callback_timeout(mut self, callback_timeout: Duration) -> Self {
        self.callback_timeout = callback_timeout;
        self
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs the full browser login for `character_name`. The listener is bound
    /// before `present` sees the authorization URL, so an immediate redirect
    /// cannot be missed.
    pub async fn authorize<F>(&self, character_name: &str, present: F) -> EsiResult<Credential>
    where
        F: FnOnce(&LoginRequest),
    {
        let login = self.client.begin_login()?;
        let listener = CallbackListener::bind(&self.callback_url).await?;
        log::info!(
            "waiting up to {}s for SSO callback on {}",
            self.callback_timeout.as_secs(),
            self.callback_url
        );
        present(&login);

        let callback = listener.wait(self.callback_timeout).await?;
        self.complete_login(character_name, &login, &callback.code, &callback.state)
            .await
    }

    pub async fn complete_login(
        &self,
        character_name: &str,
        login: &LoginRequest,
        code: &str,
        callback_state: &str,
    ) -> EsiResult<Credential> {
        if callback_state != login.state {
            return Err(AuthError::StateMismatch {
                expected: login.state.clone(),
                got: callback_state.to_owned(),
            }
            .into());
        }

        let tokens = self
            .client
            .exchange_code(code, &login.code_verifier)
            .await?;

        let missing = missing_required_scopes(&tokens.scopes, &self.required_scopes);
        if !missing.is_empty() {
            return Err(AuthError::MissingRequiredScopes { missing }.into());
        }

        let now = self.clock.now();
        let credential = Credential {
            character_name: character_name.to_owned(),
            character_id: tokens.character_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_token_expiry: expiry_after(now, tokens.expires_in),
            scopes: tokens.scopes,
            updated_at: now,
        };

        let gate = self.character_gate(character_name);
        let _gate = gate.lock().await;
        let _lock = self.acquire_refresh_lock(character_name).await?;
        self.store.save(&credential)?;

        log::info!(
            "authorized '{}' as character {} ({})",
            character_name,
            credential.character_id,
            tokens.character_name.as_deref().unwrap_or("<unknown>")
        );
        Ok(credential)
    }

    /// Returns a usable access token, refreshing (and rotating the refresh
    /// token) when the cached one is inside the refresh skew.
    pub async fn get_valid_token(&self, character_name: &str) -> EsiResult<String> {
        let credential = self.require_credential(character_name)?;
        if !credential.should_refresh(self.clock.now(), self.refresh_skew) {
            return Ok(credential.access_token);
        }

        let gate = self.character_gate(character_name);
        let _gate = gate.lock().await;
        let _lock = self.acquire_refresh_lock(character_name).await?;

        // Another caller may have rotated the token while we waited.
        let mut credential = self.require_credential(character_name)?;
        let now = self.clock.now();
        if !credential.should_refresh(now, self.refresh_skew) {
            log::debug!("token for '{character_name}' was refreshed by another caller");
            return Ok(credential.access_token);
        }

        log::debug!("refreshing access token for '{character_name}'");
        let tokens = self
            .client
            .refresh(&credential.refresh_token)
            .await
            .map_err(|err| refresh_failure(character_name, err))?;

        credential.access_token = tokens.access_token;
        credential.refresh_token = tokens.refresh_token;
        credential.access_token_expiry = expiry_after(now, tokens.expires_in);
        credential.updated_at = now;
        self.store.save(&credential)?;

        Ok(credential.access_token)
    }

    pub fn list_characters(&self) -> EsiResult<BTreeSet<String>> {
        self.store.character_names()
    }

    pub fn load_credential(&self, character_name: &str) -> EsiResult<Option<Credential>> {
        self.store.load(character_name)
    }

    pub fn session_state(&self, character_name: &str) -> EsiResult<SessionState> {
        Ok(match self.store.load(character_name)? {
            Some(credential) => credential.state_at(self.clock.now(), self.refresh_skew),
            None => SessionState::Unauthenticated,
        })
    }

    pub fn logout(&self, character_name: &str) -> EsiResult<()> {
        self.store.remove(character_name)
    }

    fn require_credential(&self, character_name: &str) -> EsiResult<Credential> {
        self.store
            .load(character_name)?
            .ok_or_else(|| EsiError::NotAuthenticated {
                character: character_name.to_owned(),
            })
    }

    fn character_gate(&self, character_name: &str) -> Arc<AsyncMutex<()>> {
        let mut gates = match self.character_gates.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(gates.entry(character_name.to_owned()).or_default())
    }

    async fn acquire_refresh_lock(&self, character_name: &str) -> EsiResult<RefreshLock> {
        let deadline = Instant::now() + self.lock_wait;
        loop {
            if let Some(lock) = self.store.try_lock_character(character_name)? {
                return Ok(lock);
            }
            if Instant::now() >= deadline {
                return Err(EsiError::LockTimeout {
                    character: character_name.to_owned(),
                });
            }
            log::trace!("refresh lock for '{character_name}' is held elsewhere; waiting");
            tokio::time::sleep(self.lock_poll_interval).await;
        }
    }
}

/// Only a 4xx from the token endpoint means the refresh token itself is dead;
/// outages and malformed replies leave the credential usable for a later retry.
fn refresh_failure(character_name: &str, err: AuthError) -> EsiError {
    if let AuthError::TokenRejected { status, .. } = &err
        && (400..500).contains(status)
    {
        return EsiError::Refresh {
            character: character_name.to_owned(),
            reason: err.to_string(),
        };
    }
    log::warn!("refresh for '{character_name}' failed transiently: {err}");
    EsiError::Auth(err)
}

fn expiry_after(now: Timestamp, expires_in: Duration) -> Timestamp {
    now.checked_add(expires_in).unwrap_or(now)
}

fn missing_required_scopes(granted_scopes: &[String], required_scopes: &[String]) -> Vec<String> {
    required_scopes
        .iter()
        .filter(|required| !granted_scopes.iter().any(|granted| granted == *required))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use capsuleer_core::{ids::CharacterId, time::Timestamp};

    use super::{AuthService, Clock};
    use crate::{
        EsiError, EsiResult,
        auth::{Credential, LoginRequest, SessionState},
        client::{InitialAuthTokens, RefreshTokens, SsoAuthClient},
        errors::AuthError,
        token_store::{MemoryTokenStore, TokenStore},
    };

    #[derive(Clone, Copy)]
    struct FixedClock {
        now: Timestamp,
    }

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            self.now
        }
    }

    #[derive(Default)]
    struct MockClient {
        initial_tokens: Option<InitialAuthTokens>,
        refresh_results: Mutex<VecDeque<Result<RefreshTokens, AuthError>>>,
        refresh_calls: AtomicUsize,
        refreshed_with: Mutex<Vec<String>>,
    }

    impl MockClient {
        fn refreshing_with(results: Vec<Result<RefreshTokens, AuthError>>) -> Self {
            Self {
                refresh_results: Mutex::new(results.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl SsoAuthClient for MockClient {
        fn begin_login(&self) -> EsiResult<LoginRequest> {
            Ok(login_request())
        }

        async fn exchange_code(
            &self,
            _code: &str,
            code_verifier: &str,
        ) -> Result<InitialAuthTokens, AuthError> {
            assert_eq!(code_verifier, "verifier");
            self.initial_tokens
                .clone()
                .ok_or_else(|| AuthError::MalformedTokenResponse("not configured".to_string()))
        }

        async fn refresh(&self, refresh_token: &str) -> Result<RefreshTokens, AuthError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refreshed_with
                .lock()
                .expect("lock")
                .push(refresh_token.to_owned());
            // Let a concurrent caller run while this refresh is "in flight".
            tokio::task::yield_now().await;
            self.refresh_results
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or_else(|| {
                    Err(AuthError::TokenRejected {
                        status: 400,
                        body: "invalid_grant".to_string(),
                    })
                })
        }
    }

    fn login_request() -> LoginRequest {
        LoginRequest {
            authorization_url: "https://login.example/authorize".to_string(),
            state: "expected-state".to_string(),
            code_verifier: "verifier".to_string(),
        }
    }

    fn sample_credential(expires_at: Timestamp) -> Credential {
        Credential {
            character_name: "main".to_string(),
            character_id: CharacterId(9001),
            access_token: "access".to_string(),
            refresh_token: "refresh-0".to_string(),
            access_token_expiry: expires_at,
            scopes: vec!["esi-planets.manage_planets.v1".to_string()],
            updated_at: ts(100),
        }
    }

    fn rotated(n: u32) -> RefreshTokens {
        RefreshTokens {
            access_token: format!("access-{n}"),
            expires_in: Duration::from_secs(1200),
            refresh_token: format!("refresh-{n}"),
        }
    }

    fn service_at(
        client: MockClient,
        store: MemoryTokenStore,
        now: i64,
    ) -> AuthService<MockClient, MemoryTokenStore, FixedClock> {
        AuthService::with_clock(
            client,
            store,
            vec!["esi-planets.manage_planets.v1".to_string()],
            FixedClock { now: ts(now) },
        )
        .with_refresh_skew(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn complete_login_persists_credential_under_name() {
        let client = MockClient {
            initial_tokens: Some(InitialAuthTokens {
                character_id: CharacterId(9001),
                character_name: Some("Pilot".to_string()),
                scopes: vec!["esi-planets.manage_planets.v1".to_string()],
                access_token: "new-access".to_string(),
                expires_in: Duration::from_secs(1200),
                refresh_token: "new-refresh".to_string(),
            }),
            ..MockClient::default()
        };
        let service = service_at(client, MemoryTokenStore::default(), 777);

        let credential = service
            .complete_login("main", &login_request(), "code", "expected-state")
            .await
            .expect("complete login should succeed");

        assert_eq!(credential.character_id, CharacterId(9001));
        assert_eq!(credential.access_token_expiry, ts(777 + 1200));
        assert_eq!(
            service.load_credential("main").expect("load"),
            Some(credential)
        );
        assert_eq!(
            service.list_characters().expect("list").into_iter().collect::<Vec<_>>(),
            vec!["main"]
        );
    }

    #[tokio::test]
    async fn complete_login_rejects_state_mismatch() {
        let service = service_at(MockClient::default(), MemoryTokenStore::default(), 777);

        let err = service
            .complete_login("main", &login_request(), "code", "forged-state")
            .await
            .expect_err("state mismatch must fail");

        assert!(matches!(
            err,
            EsiError::Auth(AuthError::StateMismatch { .. })
        ));
        assert!(service.load_credential("main").expect("load").is_none());
    }

    #[tokio::test]
    async fn complete_login_fails_when_required_scope_missing() {
        let client = MockClient {
            initial_tokens: Some(InitialAuthTokens {
                character_id: CharacterId(9001),
                character_name: None,
                scopes: vec!["publicData".to_string()],
                access_token: "new-access".to_string(),
                expires_in: Duration::from_secs(1200),
                refresh_token: "new-refresh".to_string(),
            }),
            ..MockClient::default()
        };
        let service = service_at(client, MemoryTokenStore::default(), 777);

        let err = service
            .complete_login("main", &login_request(), "code", "expected-state")
            .await
            .expect_err("missing scope must fail");

        assert!(matches!(
            err,
            EsiError::Auth(AuthError::MissingRequiredScopes { .. })
        ));
        assert!(service.load_credential("main").expect("load").is_none());
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_refresh() {
        let store = MemoryTokenStore::default();
        store
            .save(&sample_credential(ts(10_000)))
            .expect("save should work");
        let service = service_at(MockClient::default(), store, 500);

        for _ in 0..5 {
            let token = service.get_valid_token("main").await.expect("token");
            assert_eq!(token, "access");
        }

        assert_eq!(service.client.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.session_state("main").expect("state"), SessionState::Valid);
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed_once_and_rotated() {
        let store = MemoryTokenStore::default();
        store
            .save(&sample_credential(ts(530)))
            .expect("save should work");
        let service = service_at(MockClient::refreshing_with(vec![Ok(rotated(1))]), store, 500);
        assert_eq!(
            service.session_state("main").expect("state"),
            SessionState::Expired
        );

        let token = service.get_valid_token("main").await.expect("refresh");

        assert_eq!(token, "access-1");
        assert_eq!(service.client.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *service.client.refreshed_with.lock().expect("lock"),
            vec!["refresh-0"]
        );
        let stored = service.load_credential("main").expect("load").expect("present");
        assert_eq!(stored.refresh_token, "refresh-1");
        assert_eq!(stored.access_token_expiry, ts(500 + 1200));
        assert_eq!(stored.updated_at, ts(500));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let store = MemoryTokenStore::default();
        store
            .save(&sample_credential(ts(510)))
            .expect("save should work");
        let service = service_at(
            MockClient::refreshing_with(vec![Ok(rotated(1)), Ok(rotated(2))]),
            store,
            500,
        );

        let (first, second) = tokio::join!(
            service.get_valid_token("main"),
            service.get_valid_token("main")
        );

        assert_eq!(first.expect("first"), "access-1");
        assert_eq!(second.expect("second"), "access-1");
        assert_eq!(service.client.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_is_terminal_and_keeps_record() {
        let store = MemoryTokenStore::default();
        store
            .save(&sample_credential(ts(510)))
            .expect("save should work");
        let service = service_at(MockClient::default(), store, 500);

        let err = service
            .get_valid_token("main")
            .await
            .expect_err("refresh should fail");

        let EsiError::Refresh { character, reason } = &err else {
            panic!("expected refresh error, got {err:?}");
        };
        assert_eq!(character, "main");
        assert!(reason.contains("invalid_grant"));
        assert!(err.requires_reauth());
        assert_eq!(service.client.refresh_calls.load(Ordering::SeqCst), 1);
        assert!(service.load_credential("main").expect("load").is_some());
    }

    #[tokio::test]
    async fn sso_outage_is_not_terminal() {
        let store = MemoryTokenStore::default();
        store
            .save(&sample_credential(ts(510)))
            .expect("save should work");
        let service = service_at(
            MockClient::refreshing_with(vec![
                Err(AuthError::TokenRejected {
                    status: 503,
                    body: "service unavailable".to_string(),
                }),
                Err(AuthError::MalformedTokenResponse("truncated body".to_string())),
                Ok(rotated(1)),
            ]),
            store,
            500,
        );

        let err = service
            .get_valid_token("main")
            .await
            .expect_err("503 should fail");
        assert!(matches!(
            err,
            EsiError::Auth(AuthError::TokenRejected { status: 503, .. })
        ));
        assert!(!err.requires_reauth());

        let err = service
            .get_valid_token("main")
            .await
            .expect_err("malformed reply should fail");
        assert!(matches!(
            err,
            EsiError::Auth(AuthError::MalformedTokenResponse(_))
        ));
        assert!(!err.requires_reauth());

        let token = service.get_valid_token("main").await.expect("recovered");
        assert_eq!(token, "access-1");
        assert_eq!(
            *service.client.refreshed_with.lock().expect("lock"),
            vec!["refresh-0", "refresh-0", "refresh-0"]
        );
    }

    #[tokio::test]
    async fn unknown_character_is_not_authenticated() {
        let service = service_at(MockClient::default(), MemoryTokenStore::default(), 500);

        let err = service
            .get_valid_token("ghost")
            .await
            .expect_err("no credential");

        assert!(matches!(err, EsiError::NotAuthenticated { ref character } if character == "ghost"));
        assert_eq!(
            service.session_state("ghost").expect("state"),
            SessionState::Unauthenticated
        );
    }

    #[tokio::test]
    async fn refresh_waits_for_lock_held_elsewhere() {
        let store = MemoryTokenStore::default();
        store
            .save(&sample_credential(ts(510)))
            .expect("save should work");
        let service = service_at(MockClient::refreshing_with(vec![Ok(rotated(1))]), store, 500)
            .with_lock_wait(Duration::from_millis(120));

        let held = service
            .store()
            .try_lock_character("main")
            .expect("attempt")
            .expect("lock");
        let err = service
            .get_valid_token("main")
            .await
            .expect_err("lock is held");
        assert!(matches!(err, EsiError::LockTimeout { .. }));
        assert_eq!(service.client.refresh_calls.load(Ordering::SeqCst), 0);

        drop(held);
        let token = service.get_valid_token("main").await.expect("refresh");
        assert_eq!(token, "access-1");
    }

    #[tokio::test]
    async fn logout_removes_credential() {
        let store = MemoryTokenStore::default();
        store
            .save(&sample_credential(ts(10_000)))
            .expect("save should work");
        let service = service_at(MockClient::default(), store, 500);

        service.logout("main").expect("logout");

        assert!(service.list_characters().expect("list").is_empty());
    }

    fn ts(epoch_secs: i64) -> Timestamp {
        Timestamp::from_epoch_secs(epoch_secs).expect("valid epoch seconds")
    }
}
