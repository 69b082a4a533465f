use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, create_dir_all};
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{PortalError, Result};
use crate::session::ADMIN_USER;

#[cfg(feature = "web")]
use crate::app::AppState;
#[cfg(feature = "web")]
use crate::session::Session;
#[cfg(feature = "web")]
use axum::{
    Form,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
#[cfg(feature = "web")]
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
#[cfg(feature = "web")]
use std::sync::Arc;
#[cfg(feature = "web")]
use tracing::{info, warn};

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// Checks a username/password pair.
///
/// Call sites only see this trait, so the roster can live in code, in a
/// hashed users file, or anywhere else.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> bool;
}

/// Plain username → password table.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster {
    users: HashMap<String, String>,
}

impl StaticRoster {
    pub fn new<I, U, P>(users: I) -> Self
    where
        I: IntoIterator<Item = (U, P)>,
        U: Into<String>,
        P: Into<String>,
    {
        StaticRoster {
            users: users.into_iter().map(|(u, p)| (u.into(), p.into())).collect(),
        }
    }

    /// The fixed roster: `SR01`..`SR13` with passwords `test01`..`test13`,
    /// plus `admin`.
    pub fn builtin() -> Self {
        let mut users: Vec<(String, String)> = (1..=13)
            .map(|i| (format!("SR{i:02}"), format!("test{i:02}")))
            .collect();
        users.push((ADMIN_USER.to_string(), ADMIN_USER.to_string()));
        StaticRoster::new(users)
    }
}

impl CredentialVerifier for StaticRoster {
    fn verify(&self, username: &str, password: &str) -> bool {
        self.users.get(username).is_some_and(|p| p == password)
    }
}

/// Stored account in a hashed users file.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub username: String,
    /// Argon2 hash of the user's password
    pub password_hash: String,
}

/// Roster backed by a JSON file of argon2 password hashes.
#[derive(Debug, Clone, Default)]
pub struct HashedRoster {
    users: BTreeMap<String, User>,
}

impl HashedRoster {
    /// Load the users file
    ///
    /// # Arguments
    /// * `path` - JSON file mapping usernames to [`User`] records
    ///
    /// # Returns
    /// * `Result<HashedRoster>` - The roster; a missing file is an empty roster
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(HashedRoster::default());
        }

        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        let users = serde_json::from_str(&contents)?;
        Ok(HashedRoster { users })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.users)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Add a user or replace their password
    ///
    /// # Arguments
    /// * `username` - Login name
    /// * `password` - Plain-text password, stored only as an Argon2 hash
    ///
    /// # Returns
    /// * `Result<()>` - A validation error when either field is empty
    pub fn set_password(&mut self, username: &str, password: &str) -> Result<()> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(PortalError::Validation(
                "Username and password cannot be empty".to_string(),
            ));
        }

        let user = User {
            username: username.to_string(),
            password_hash: hash_password(password)?,
        };
        self.users.insert(username.to_string(), user);
        Ok(())
    }

    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialVerifier for HashedRoster {
    fn verify(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|user| verify_password(password, &user.password_hash).unwrap_or(false))
    }
}

/// Hash a password with Argon2id and a random salt
///
/// # Arguments
/// * `password` - The plain-text password
///
/// # Returns
/// * `Result<String>` - The PHC-format hash string
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PortalError::Validation(format!("Password hashing failed: {e}")))
}

/// Check a password against a stored Argon2 hash
///
/// # Arguments
/// * `password` - The password to check
/// * `hash` - The stored PHC-format hash
///
/// # Returns
/// * `Result<bool>` - Whether they match; an error if the hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| PortalError::Validation("Invalid password hash format".to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Login form fields.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

/// The session attached to an authenticated request.
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub id: String,
    pub session: Session,
}

#[cfg(feature = "web")]
impl CurrentSession {
    pub fn user(&self) -> &str {
        self.session.user().unwrap_or_default()
    }
}

#[cfg(feature = "web")]
pub async fn serve_login_page(State(state): State<Arc<AppState>>) -> Response {
    state.renderer.login(None, StatusCode::OK)
}

/// Handle login form submission
///
/// A mismatch re-renders the form with an inline message; there is no lockout.
///
/// # Arguments
/// * `state` - Application state holding the credential verifier and sessions
/// * `jar` - Cookie jar that receives the session cookie
/// * `credentials` - Submitted username and password
///
/// # Returns
/// * `Response` - Redirect to `/submit`, or the login page with status 401
#[cfg(feature = "web")]
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(credentials): Form<UserCredentials>,
) -> Response {
    let username = credentials.username.trim();

    if !state.credentials.verify(username, &credentials.password) {
        warn!("Rejected login for '{username}'");
        return state.renderer.login(
            Some("❌ 아이디 또는 비밀번호가 올바르지 않습니다."),
            StatusCode::UNAUTHORIZED,
        );
    }

    let session_id = state.sessions.create(username);
    info!("User '{username}' logged in");

    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), Redirect::to("/submit")).into_response()
}

#[cfg(feature = "web")]
pub async fn handle_logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.update(cookie.value(), Session::logout);
        state.sessions.remove(cookie.value());
    }

    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        Redirect::to("/login"),
    )
}

/// Let requests with a live signed-in session through, attaching a
/// [`CurrentSession`]; everything else goes to the login page (or gets a
/// 401 on `/api/`).
#[cfg(feature = "web")]
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let id = cookie.value().to_string();
        if let Some(session) = state.sessions.get(&id).filter(Session::is_logged_in) {
            request.extensions_mut().insert(CurrentSession { id, session });
            return next.run(request).await;
        }
    }

    if request.uri().path().starts_with("/api/") {
        return PortalError::Unauthorized.into_response();
    }
    Redirect::to("/login").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_roster() {
        let roster = StaticRoster::builtin();
        assert!(roster.verify("SR01", "test01"));
        assert!(roster.verify("SR13", "test13"));
        assert!(roster.verify("admin", "admin"));
        assert!(!roster.verify("SR01", "test02"));
        assert!(!roster.verify("SR14", "test14"));
        assert!(!roster.verify("", ""));
    }

    #[test]
    fn hashed_roster_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("users.json");

        let mut roster = HashedRoster::default();
        roster.set_password("SR01", "s3cret").unwrap();
        roster.save(&path).unwrap();

        let loaded = HashedRoster::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.verify("SR01", "s3cret"));
        assert!(!loaded.verify("SR01", "wrong"));
        assert!(!loaded.verify("SR02", "s3cret"));
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let mut roster = HashedRoster::default();
        assert!(roster.set_password("", "x").is_err());
        assert!(roster.set_password("SR01", "").is_err());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("x", "not-a-hash").is_err());
        let hash = hash_password("pw").unwrap();
        assert!(verify_password("pw", &hash).unwrap());
    }

    #[test]
    fn verifier_is_object_safe() {
        let verifiers: Vec<Box<dyn CredentialVerifier>> =
            vec![Box::new(StaticRoster::new([("a", "b")])), Box::new(HashedRoster::default())];
        assert!(verifiers[0].verify("a", "b"));
        assert!(!verifiers[1].verify("a", "b"));
    }
}
