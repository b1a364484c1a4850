use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::PortalBackend;
use crate::error::{PortalError, PortalResult};
use crate::models::{Identity, ProfileUpdate, Registration, Role};
use crate::validate;

const LOGIN_FAILED: &str = "Login failed. Please try again.";
const REGISTER_OK: &str = "Registration successful. You can now log in.";
const REGISTER_FAILED: &str = "Registration failed. Please try again.";
const UPDATE_OK: &str = "Profile updated successfully.";
const UPDATE_FAILED: &str = "Failed to update profile.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    /// True while a login, registration or profile update is in flight.
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn phase(&self) -> SessionPhase {
        match (&self.identity, self.loading) {
            (Some(_), _) => SessionPhase::Authenticated,
            (None, true) => SessionPhase::Authenticating,
            (None, false) => SessionPhase::Unauthenticated,
        }
    }
}

/// Result shape of every session operation. Operations never return `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: String,
    pub identity: Option<Identity>,
}

impl AuthOutcome {
    fn ok(message: &str, identity: Option<Identity>) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            identity,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            identity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub identity: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// JSON file holding the signed-in identity between CLI invocations.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A file that no longer decodes counts as no session, so `login` and
    /// `logout` can still replace or remove it.
    pub fn load(&self) -> PortalResult<Option<StoredSession>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(stored) => Ok(Some(stored)),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &StoredSession) -> PortalResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(session)
            .map_err(|e| PortalError::decode(e.to_string()))?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    pub fn clear(&self) -> PortalResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// The single current identity. Readers take a [`SessionSnapshot`]; only the
/// operations below write, and concurrent writes are last-write-wins.
pub struct Session {
    backend: Arc<dyn PortalBackend>,
    store: Option<SessionStore>,
    state: watch::Sender<SessionSnapshot>,
}

impl Session {
    pub fn new(backend: Arc<dyn PortalBackend>, store: Option<SessionStore>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            backend,
            store,
            state,
        }
    }

    /// Picks up an identity persisted by an earlier `login`.
    pub fn restore(&self) -> PortalResult<Option<StoredSession>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };
        let stored = store.load()?;
        if let Some(session) = &stored {
            self.state.send_modify(|s| s.identity = Some(session.identity.clone()));
        }
        Ok(stored)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity.clone()
    }

    pub fn backend(&self) -> Arc<dyn PortalBackend> {
        Arc::clone(&self.backend)
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_modify(|s| s.loading = loading);
    }

    pub async fn login(&self, email: &str, password: &str, role: Role) -> AuthOutcome {
        if let Err(errors) = validate::login(email, password) {
            return AuthOutcome::failed(first_message(&errors));
        }

        self.set_loading(true);
        let result = self.backend.login(role, email, password).await;

        let outcome = match result {
            Ok((person, token)) => match Identity::from_person(person, role) {
                Some(identity) => {
                    self.persist(&identity, token);
                    self.state.send_modify(|s| {
                        s.identity = Some(identity.clone());
                        s.loading = false;
                    });
                    info!(user = %identity.id, %role, "signed in");
                    return AuthOutcome::ok("Login successful.", Some(identity));
                }
                None => {
                    warn!(%role, "login response had no user id");
                    AuthOutcome::failed(LOGIN_FAILED.to_string())
                }
            },
            Err(err) => {
                warn!(%role, error = %err, "login rejected");
                AuthOutcome::failed(err.message_or(LOGIN_FAILED))
            }
        };

        self.set_loading(false);
        outcome
    }

    /// Drops the persisted session and clears the in-memory identity before
    /// returning, so every later snapshot is unauthenticated.
    pub fn logout(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = store.clear() {
                warn!(error = %err, path = %store.path().display(), "could not remove session file");
            }
        }
        self.state.send_modify(|s| {
            s.identity = None;
            s.loading = false;
        });
        info!("signed out");
    }

    /// Registration never signs the new user in.
    pub async fn register(&self, registration: &Registration) -> AuthOutcome {
        if let Err(errors) = validate::registration(registration) {
            return AuthOutcome::failed(first_message(&errors));
        }

        self.set_loading(true);
        let result = self.backend.register(registration).await;
        self.set_loading(false);

        match result {
            Ok(()) => {
                info!(role = %registration.role(), "registered");
                AuthOutcome::ok(REGISTER_OK, None)
            }
            Err(err) => {
                warn!(role = %registration.role(), error = %err, "registration failed");
                AuthOutcome::failed(err.message_or(REGISTER_FAILED))
            }
        }
    }

    pub async fn update_profile(&self, id: &str, role: Role, update: &ProfileUpdate) -> AuthOutcome {
        self.set_loading(true);
        let result = self.backend.update_profile(role, id, update).await;

        let outcome = match result {
            Ok(person) => {
                let mut merged = None;
                self.state.send_modify(|s| {
                    if let Some(identity) = s.identity.as_mut() {
                        identity.merge(person);
                        merged = Some(identity.clone());
                    }
                    s.loading = false;
                });
                if let Some(identity) = &merged {
                    self.persist_identity(identity);
                }
                return AuthOutcome::ok(UPDATE_OK, merged);
            }
            Err(err) => {
                warn!(user = id, error = %err, "profile update failed");
                AuthOutcome::failed(err.message_or(UPDATE_FAILED))
            }
        };

        self.set_loading(false);
        outcome
    }

    fn persist(&self, identity: &Identity, token: Option<String>) {
        let Some(store) = &self.store else { return };
        let stored = StoredSession {
            identity: identity.clone(),
            token,
        };
        if let Err(err) = store.save(&stored) {
            warn!(error = %err, "could not persist session");
        }
    }

    /// Rewrites the stored identity, keeping whatever token was saved at login.
    fn persist_identity(&self, identity: &Identity) {
        let Some(store) = &self.store else { return };
        let token = store.load().ok().flatten().and_then(|s| s.token);
        self.persist(identity, token);
    }
}

fn first_message(errors: &crate::error::FieldErrors) -> String {
    errors
        .values()
        .next()
        .cloned()
        .unwrap_or_else(|| LOGIN_FAILED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdminRegistration, Person};
    use crate::testing::{person, FakeBackend};
    use std::sync::atomic::Ordering;

    fn backend() -> FakeBackend {
        FakeBackend {
            login_user: Some(Person {
                email: Some("ada@uni.edu".into()),
                department: Some("CS".into()),
                ..person("m1", "Ada")
            }),
            ..FakeBackend::default()
        }
    }

    #[tokio::test]
    async fn login_sets_identity_with_requested_role() {
        let session = Session::new(Arc::new(backend()), None);
        let before = session.snapshot();

        let outcome = session.login("ada@uni.edu", "secret", Role::Mentor).await;

        assert!(outcome.success);
        let identity = outcome.identity.unwrap();
        assert_eq!(identity.role, Role::Mentor);
        assert_eq!(identity.id, "m1");
        assert_eq!(before.phase(), SessionPhase::Unauthenticated);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.phase(), SessionPhase::Authenticated);
        assert!(!snapshot.loading);
    }

    #[tokio::test]
    async fn rejected_login_leaves_identity_unset() {
        let session = Session::new(Arc::new(backend()), None);
        let outcome = session.login("ada@uni.edu", "wrong", Role::Mentor).await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Invalid credentials");
        assert_eq!(session.snapshot().phase(), SessionPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn invalid_login_form_never_reaches_backend() {
        let fake = Arc::new(backend());
        let session = Session::new(fake.clone(), None);

        let outcome = session.login("not-an-email", "secret", Role::Student).await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Email is invalid");
        assert_eq!(fake.calls.login.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logout_clears_file_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested").join("session.json"));
        let session = Session::new(Arc::new(backend()), Some(store.clone()));

        session.login("ada@uni.edu", "secret", Role::Mentor).await;
        let stored = store.load().unwrap().unwrap();
        assert_eq!(stored.token.as_deref(), Some("token-1"));

        session.logout();

        assert!(store.load().unwrap().is_none());
        assert!(session.identity().is_none());
    }

    #[tokio::test]
    async fn restore_reads_persisted_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.json"));
        {
            let session = Session::new(Arc::new(backend()), Some(store.clone()));
            session.login("ada@uni.edu", "secret", Role::Mentor).await;
        }

        let session = Session::new(Arc::new(backend()), Some(store));
        let restored = session.restore().unwrap().unwrap();
        assert_eq!(restored.identity.id, "m1");
        assert_eq!(session.identity().unwrap().name, "Ada");
        assert_eq!(session.snapshot().phase(), SessionPhase::Authenticated);
    }

    #[tokio::test]
    async fn corrupt_session_file_reads_as_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        let store = SessionStore::new(&path);

        assert!(store.load().unwrap().is_none());

        let session = Session::new(Arc::new(backend()), Some(store.clone()));
        assert!(session.restore().unwrap().is_none());
        assert_eq!(session.snapshot().phase(), SessionPhase::Unauthenticated);

        session.logout();
        assert!(!path.exists());

        let outcome = session.login("ada@uni.edu", "secret", Role::Mentor).await;
        assert!(outcome.success);
        assert_eq!(store.load().unwrap().unwrap().identity.id, "m1");
    }

    #[tokio::test]
    async fn registration_does_not_sign_in() {
        let fake = Arc::new(backend());
        let session = Session::new(fake.clone(), None);
        let outcome = session
            .register(&Registration::Admin(AdminRegistration {
                name: "Root".into(),
                email: "root@uni.edu".into(),
                password: "pw".into(),
            }))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.message, REGISTER_OK);
        assert!(session.identity().is_none());
        assert_eq!(fake.calls.register.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registration_failure_surfaces_backend_message() {
        let fake = FakeBackend {
            fail_mutations: true,
            ..backend()
        };
        let session = Session::new(Arc::new(fake), None);
        let outcome = session
            .register(&Registration::Admin(AdminRegistration {
                name: "Root".into(),
                email: "root@uni.edu".into(),
                password: "pw".into(),
            }))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "Email already registered");
    }

    #[tokio::test]
    async fn profile_update_merges_into_identity() {
        let fake = FakeBackend {
            update_user: Some(Person {
                phone: Some("555-0101".into()),
                role: Some("admin".into()),
                ..Person::default()
            }),
            ..backend()
        };
        let session = Session::new(Arc::new(fake), None);
        session.login("ada@uni.edu", "secret", Role::Mentor).await;

        let outcome = session
            .update_profile("m1", Role::Mentor, &ProfileUpdate::default())
            .await;

        assert!(outcome.success);
        let identity = session.identity().unwrap();
        assert_eq!(identity.phone.as_deref(), Some("555-0101"));
        assert_eq!(identity.department.as_deref(), Some("CS"));
        assert_eq!(identity.role, Role::Mentor);
    }

    #[tokio::test]
    async fn failed_profile_update_leaves_identity_untouched() {
        let fake = FakeBackend {
            fail_mutations: true,
            ..backend()
        };
        let session = Session::new(Arc::new(fake), None);
        session.login("ada@uni.edu", "secret", Role::Mentor).await;
        let before = session.identity();

        let outcome = session
            .update_profile(
                "m1",
                Role::Mentor,
                &ProfileUpdate {
                    name: Some("Changed".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.message, "backend down");
        assert_eq!(session.identity(), before);
        assert!(!session.snapshot().loading);
    }
}
