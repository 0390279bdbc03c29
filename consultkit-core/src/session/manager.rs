//! Live session state and single-flight token refresh.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};

use crate::accounts::AccountKey;
use crate::http::AuthHeaderSource;
use crate::{ConsultKitError, ConsultKitResult};

use super::{Clock, Token};

/// Exchanges an expired token for a fresh one.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Performs one refresh exchange for `expired`.
    ///
    /// # Errors
    /// Any error is treated as a failed refresh and ends the session.
    async fn refresh(&self, expired: &Token) -> ConsultKitResult<Token>;
}

/// Receives session changes that should outlive the process.
///
/// Implementations handle their own failures; nothing returned from an
/// observer can affect the session.
pub trait SessionObserver: Send + Sync {
    /// A login made `token` the live token of `account`.
    fn session_started(&self, _account: &AccountKey, _token: &Token) {}

    /// A refresh replaced the live token of `account`.
    fn token_refreshed(&self, account: &AccountKey, token: &Token);

    /// The session of `account` ended through logout or a failed refresh.
    fn session_ended(&self, _account: &AccountKey) {}
}

/// Observable state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SessionStatus {
    /// Nobody is logged in.
    NoSession,
    /// The live token is usable.
    Valid,
    /// The live token is expired and no refresh has started yet.
    Expired,
    /// A refresh is in flight.
    Refreshing,
}

type RefreshOutcome = Shared<BoxFuture<'static, ConsultKitResult<Token>>>;

struct ActiveSession {
    account: AccountKey,
    token: Token,
}

#[derive(Default)]
struct SessionState {
    active: Option<ActiveSession>,
    in_flight: Option<RefreshOutcome>,
    /// Bumped on login and logout so a refresh started for an earlier
    /// session cannot write into the current one.
    generation: u64,
}

struct Inner {
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn SessionObserver>>,
    state: Mutex<SessionState>,
}

/// Owns the live token.
///
/// Callers that find the token expired all wait on the same refresh: the
/// first one starts it on the runtime, later ones join it, and every waiter
/// receives the same result. The refresh keeps running when its callers are
/// dropped, so an abandoned request still leaves the session refreshed.
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager with no active session.
    #[must_use]
    pub fn new(
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
        observer: Option<Arc<dyn SessionObserver>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                refresher,
                clock,
                observer,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    /// Makes `token` the live token for `account`, replacing any session and
    /// detaching any refresh still in flight.
    ///
    /// # Errors
    /// Returns an error if the session state is unusable.
    pub fn start(&self, account: AccountKey, token: Token) -> ConsultKitResult<()> {
        let mut state = self.inner.lock_state()?;
        state.generation += 1;
        state.in_flight = None;
        state.active = Some(ActiveSession {
            account: account.clone(),
            token: token.clone(),
        });
        drop(state);
        log::info!("session started");
        if let Some(observer) = &self.inner.observer {
            observer.session_started(&account, &token);
        }
        Ok(())
    }

    /// Ends the session. Waiters on an in-flight refresh receive
    /// [`ConsultKitError::AuthExpired`].
    pub fn end(&self) -> Option<AccountKey> {
        let ended = {
            let Ok(mut state) = self.inner.lock_state() else {
                return None;
            };
            state.generation += 1;
            state.in_flight = None;
            state.active.take().map(|session| session.account)
        };
        if let Some(account) = &ended {
            log::info!("session ended");
            self.inner.notify_ended(account);
        }
        ended
    }

    /// Account of the live session.
    #[must_use]
    pub fn current_account(&self) -> Option<AccountKey> {
        let state = self.inner.lock_state().ok()?;
        state.active.as_ref().map(|session| session.account.clone())
    }

    /// Current [`SessionStatus`].
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let Ok(state) = self.inner.lock_state() else {
            return SessionStatus::NoSession;
        };
        match (&state.active, &state.in_flight) {
            (None, _) => SessionStatus::NoSession,
            (Some(_), Some(_)) => SessionStatus::Refreshing,
            (Some(session), None) if session.token.is_expired(self.inner.clock.now_millis()) => {
                SessionStatus::Expired
            }
            (Some(_), None) => SessionStatus::Valid,
        }
    }

    /// Returns a token that is valid now, refreshing it first if needed.
    ///
    /// # Errors
    /// - [`ConsultKitError::NotAuthenticated`] when there is no session.
    /// - [`ConsultKitError::AuthExpired`] when the refresh failed. The session
    ///   is cleared and later calls return `NotAuthenticated`.
    pub async fn valid_token(&self) -> ConsultKitResult<Token> {
        let pending = {
            let mut state = self.inner.lock_state()?;
            if let Some(in_flight) = &state.in_flight {
                in_flight.clone()
            } else {
                let session = state
                    .active
                    .as_ref()
                    .ok_or(ConsultKitError::NotAuthenticated)?;
                if !session.token.is_expired(self.inner.clock.now_millis()) {
                    return Ok(session.token.clone());
                }
                let refresh = Inner::spawn_refresh(&self.inner, session.token.clone(), state.generation);
                state.in_flight = Some(refresh.clone());
                refresh
            }
        };
        pending.await
    }

    /// `Authorization` header value for a token that is valid now.
    ///
    /// # Errors
    /// See [`SessionManager::valid_token`].
    pub async fn valid_auth_header(&self) -> ConsultKitResult<String> {
        self.valid_token().await.map(|token| token.auth_header())
    }
}

#[async_trait]
impl AuthHeaderSource for SessionManager {
    async fn valid_auth_header(&self) -> ConsultKitResult<String> {
        Self::valid_auth_header(self).await
    }
}

impl Inner {
    fn lock_state(&self) -> ConsultKitResult<MutexGuard<'_, SessionState>> {
        self.state.lock().map_err(|_| ConsultKitError::AuthExpired {
            reason: "session state poisoned".to_string(),
        })
    }

    fn spawn_refresh(inner: &Arc<Self>, expired: Token, generation: u64) -> RefreshOutcome {
        let task = Arc::clone(inner);
        let handle = tokio::spawn(async move { task.run_refresh(&expired, generation).await });
        let cleanup = Arc::clone(inner);
        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(err) => cleanup.finish_refresh(
                    generation,
                    Err(ConsultKitError::AuthExpired {
                        reason: format!("refresh task failed: {err}"),
                    }),
                ),
            }
        }
        .boxed()
        .shared()
    }

    async fn run_refresh(&self, expired: &Token, generation: u64) -> ConsultKitResult<Token> {
        log::info!("access token expired, refreshing");
        let result = self.refresher.refresh(expired).await.map_err(|err| match err {
            ConsultKitError::AuthExpired { .. } => err,
            other => ConsultKitError::AuthExpired {
                reason: other.to_string(),
            },
        });
        self.finish_refresh(generation, result)
    }

    /// Applies a refresh result to the session it was started for and
    /// returns what the waiters receive.
    fn finish_refresh(
        &self,
        generation: u64,
        result: ConsultKitResult<Token>,
    ) -> ConsultKitResult<Token> {
        let mut state = self.lock_state()?;
        if state.generation != generation {
            log::debug!("discarding refresh result for a replaced session");
            return Err(ConsultKitError::AuthExpired {
                reason: "session changed while refreshing".to_string(),
            });
        }
        state.in_flight = None;

        match result {
            Ok(token) => {
                let account = state.active.as_mut().map(|session| {
                    session.token = token.clone();
                    session.account.clone()
                });
                drop(state);
                log::info!("access token refreshed");
                if let (Some(account), Some(observer)) = (account, &self.observer) {
                    observer.token_refreshed(&account, &token);
                }
                Ok(token)
            }
            Err(err) => {
                state.generation += 1;
                let ended = state.active.take();
                drop(state);
                log::warn!("token refresh failed, session cleared: {err}");
                if let Some(session) = ended {
                    self.notify_ended(&session.account);
                }
                Err(err)
            }
        }
    }

    fn notify_ended(&self, account: &AccountKey) {
        if let Some(observer) = &self.observer {
            observer.session_ended(account);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;
    use crate::session::{test_token, ManualClock};
    use crate::Environment;

    const NOW: u64 = 1_700_000_000_000;

    struct FakeRefresher {
        calls: AtomicUsize,
        delay: Duration,
        fail_with: Option<ConsultKitError>,
    }

    impl FakeRefresher {
        fn succeeding(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                fail_with: None,
            })
        }

        fn failing(error: ConsultKitError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(20),
                fail_with: Some(error),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh(&self, expired: &Token) -> ConsultKitResult<Token> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.delay).await;
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            let mut token = test_token(&format!("refreshed-{call}"), 3600, NOW);
            token.refresh_token.clone_from(&expired.refresh_token);
            Ok(token)
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        started: Mutex<Vec<String>>,
        refreshed: Mutex<Vec<String>>,
        ended: Mutex<Vec<String>>,
    }

    impl SessionObserver for RecordingObserver {
        fn session_started(&self, account: &AccountKey, token: &Token) {
            self.started
                .lock()
                .unwrap()
                .push(format!("{account}:{}", token.access_token));
        }

        fn token_refreshed(&self, account: &AccountKey, token: &Token) {
            self.refreshed
                .lock()
                .unwrap()
                .push(format!("{account}:{}", token.access_token));
        }

        fn session_ended(&self, account: &AccountKey) {
            self.ended.lock().unwrap().push(account.to_string());
        }
    }

    fn alice() -> AccountKey {
        AccountKey::new("alice", Environment::Production)
    }

    fn manager(refresher: Arc<FakeRefresher>) -> (SessionManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        (SessionManager::new(refresher, clock.clone(), None), clock)
    }

    #[tokio::test]
    async fn test_no_session_is_not_authenticated() {
        let (session, _) = manager(FakeRefresher::succeeding(Duration::ZERO));
        assert_eq!(session.status(), SessionStatus::NoSession);
        assert_eq!(
            session.valid_auth_header().await,
            Err(ConsultKitError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn test_valid_token_is_returned_without_refresh() {
        let refresher = FakeRefresher::succeeding(Duration::ZERO);
        let (session, _) = manager(refresher.clone());
        session.start(alice(), test_token("t1", 3600, NOW)).unwrap();

        assert_eq!(session.valid_auth_header().await.unwrap(), "Bearer t1");
        assert_eq!(session.valid_auth_header().await.unwrap(), "Bearer t1");
        assert_eq!(refresher.calls(), 0);
        assert_eq!(session.status(), SessionStatus::Valid);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_callers_share_one_refresh() {
        let refresher = FakeRefresher::succeeding(Duration::from_millis(50));
        let (session, clock) = manager(refresher.clone());
        session.start(alice(), test_token("t1", 1, NOW)).unwrap();
        clock.advance_millis(2_000);
        assert_eq!(session.status(), SessionStatus::Expired);

        let headers = join_all((0..10).map(|_| session.valid_auth_header())).await;

        assert_eq!(refresher.calls(), 1);
        for header in headers {
            assert_eq!(header.unwrap(), "Bearer refreshed-1");
        }
        assert_eq!(session.status(), SessionStatus::Valid);
        assert_eq!(
            session.valid_token().await.unwrap().refresh_token.as_deref(),
            Some("refresh-t1")
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_is_shared_and_clears_session() {
        let refresher = FakeRefresher::failing(ConsultKitError::Http {
            status: 400,
            detail: "invalid_grant".to_string(),
        });
        let (session, clock) = manager(refresher.clone());
        session.start(alice(), test_token("t1", 1, NOW)).unwrap();
        clock.advance_millis(2_000);

        let results = join_all((0..5).map(|_| session.valid_auth_header())).await;

        assert_eq!(refresher.calls(), 1);
        let first = results[0].clone().unwrap_err();
        assert!(matches!(first, ConsultKitError::AuthExpired { .. }));
        assert!(results.iter().all(|result| result == &Err(first.clone())));

        assert_eq!(session.status(), SessionStatus::NoSession);
        assert_eq!(
            session.valid_auth_header().await,
            Err(ConsultKitError::NotAuthenticated)
        );
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_abandoned_refresh_still_applies() {
        let refresher = FakeRefresher::succeeding(Duration::from_millis(40));
        let (session, clock) = manager(refresher.clone());
        session.start(alice(), test_token("t1", 1, NOW)).unwrap();
        clock.advance_millis(2_000);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(5), session.valid_auth_header()).await;
        assert!(abandoned.is_err());
        assert_eq!(session.status(), SessionStatus::Refreshing);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(session.status(), SessionStatus::Valid);
        assert_eq!(session.valid_auth_header().await.unwrap(), "Bearer refreshed-1");
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_login_during_refresh_wins() {
        let refresher = FakeRefresher::succeeding(Duration::from_millis(40));
        let (session, clock) = manager(refresher.clone());
        session.start(alice(), test_token("old", 1, NOW)).unwrap();
        clock.advance_millis(2_000);

        let waiting = session.valid_auth_header();
        let relogin = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            session
                .start(alice(), test_token("fresh-login", 3600, NOW + 2_000))
                .unwrap();
        };
        let (waited, ()) = tokio::join!(waiting, relogin);

        assert!(matches!(waited, Err(ConsultKitError::AuthExpired { .. })));
        assert_eq!(session.valid_auth_header().await.unwrap(), "Bearer fresh-login");
        assert_eq!(session.status(), SessionStatus::Valid);
    }

    #[tokio::test]
    async fn test_observer_sees_refresh_and_logout() {
        let refresher = FakeRefresher::succeeding(Duration::ZERO);
        let observer = Arc::new(RecordingObserver::default());
        let clock = Arc::new(ManualClock::new(NOW));
        let session = SessionManager::new(
            refresher,
            clock.clone(),
            Some(observer.clone() as Arc<dyn SessionObserver>),
        );
        session.start(alice(), test_token("t1", 0, NOW)).unwrap();
        clock.advance_millis(1);

        session.valid_token().await.unwrap();
        assert_eq!(session.end(), Some(alice()));
        assert_eq!(session.end(), None);

        assert_eq!(
            *observer.started.lock().unwrap(),
            vec!["alice__prod:t1".to_string()]
        );
        assert_eq!(
            *observer.refreshed.lock().unwrap(),
            vec!["alice__prod:refreshed-1".to_string()]
        );
        assert_eq!(*observer.ended.lock().unwrap(), vec!["alice__prod".to_string()]);
    }
}
