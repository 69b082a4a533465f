use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use uuid::Uuid;

use crate::error::{PortalError, Result};
use crate::submission::{CivilTime, MealType, duration_seconds};

/// Default session lifetime: 24 hours.
pub const SESSION_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Name of the roster entry with administrator rights.
pub const ADMIN_USER: &str = "admin";

/// State of one signed-in browser session.
///
/// Transitions: [`login`](Session::login), [`logout`](Session::logout),
/// [`select_meal_type`](Session::select_meal_type),
/// [`start_task`](Session::start_task),
/// [`finish_submission`](Session::finish_submission) and
/// [`reset_task`](Session::reset_task).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: Option<String>,
    meal_type: MealType,
    started_at: Option<CivilTime>,
}

impl Default for Session {
    fn default() -> Self {
        Session { user: None, meal_type: MealType::A, started_at: None }
    }
}

impl Session {
    pub fn logged_in(user: &str) -> Self {
        let mut session = Session::default();
        session.login(user);
        session
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_deref() == Some(ADMIN_USER)
    }

    pub fn meal_type(&self) -> MealType {
        self.meal_type
    }

    pub fn started_at(&self) -> Option<CivilTime> {
        self.started_at
    }

    pub fn login(&mut self, user: &str) {
        *self = Session { user: Some(user.to_string()), ..Session::default() };
    }

    /// Forget the user and every task field.
    pub fn logout(&mut self) {
        *self = Session::default();
    }

    pub fn select_meal_type(&mut self, meal_type: MealType) {
        self.meal_type = meal_type;
    }

    /// Start timing the task. A task already in progress keeps its start.
    pub fn start_task(&mut self, now: CivilTime) -> Result<CivilTime> {
        if !self.is_logged_in() {
            return Err(PortalError::Unauthorized);
        }
        Ok(*self.started_at.get_or_insert(now))
    }

    /// Take the start time for a submission and end the task.
    pub fn finish_submission(&mut self) -> Option<CivilTime> {
        self.started_at.take()
    }

    pub fn reset_task(&mut self) {
        self.started_at = None;
    }

    /// Seconds since the task started, if one is running.
    pub fn elapsed_seconds(&self, now: &CivilTime) -> Option<u64> {
        self.started_at.map(|start| duration_seconds(&start, now))
    }
}

#[derive(Debug, Clone)]
struct Entry {
    session: Session,
    expires_at: SystemTime,
}

/// Sessions keyed by the id stored in the `session` cookie.
#[derive(Debug)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        SessionStore::new(SESSION_DURATION)
    }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        SessionStore { sessions: RwLock::new(HashMap::new()), ttl }
    }

    /// Register a signed-in session and return its id.
    pub fn create(&self, user: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let entry = Entry {
            session: Session::logged_in(user),
            expires_at: SystemTime::now() + self.ttl,
        };

        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.retain(|_, e| e.expires_at > SystemTime::now());
        sessions.insert(id.clone(), entry);
        id
    }

    /// Snapshot of a live session. Expired sessions are dropped.
    pub fn get(&self, id: &str) -> Option<Session> {
        {
            let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
            match sessions.get(id) {
                Some(entry) if entry.expires_at > SystemTime::now() => {
                    return Some(entry.session.clone());
                }
                None => return None,
                Some(_) => {}
            }
        }
        self.remove(id);
        None
    }

    /// Apply a transition to a live session.
    pub fn update<R>(&self, id: &str, apply: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let entry = sessions.get_mut(id)?;
        if entry.expires_at <= SystemTime::now() {
            sessions.remove(id);
            return None;
        }
        Some(apply(&mut entry.session))
    }

    pub fn remove(&self, id: &str) {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        sessions.remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::parse_civil;

    #[test]
    fn login_resets_task_fields() {
        let mut session = Session::logged_in("SR01");
        session.select_meal_type(MealType::B);
        session.start_task(parse_civil("2025-10-01 10:00:00").unwrap()).unwrap();

        session.login("SR02");
        assert_eq!(session.user(), Some("SR02"));
        assert_eq!(session.meal_type(), MealType::A);
        assert_eq!(session.started_at(), None);
    }

    #[test]
    fn logout_clears_everything() {
        let mut session = Session::logged_in("admin");
        assert!(session.is_admin());
        session.logout();
        assert_eq!(session, Session::default());
        assert!(!session.is_logged_in());
    }

    #[test]
    fn start_is_kept_until_submission() {
        let t0 = parse_civil("2025-10-01 10:00:00").unwrap();
        let t1 = parse_civil("2025-10-01 10:00:30").unwrap();
        let mut session = Session::logged_in("SR01");

        assert_eq!(session.start_task(t0).unwrap(), t0);
        assert_eq!(session.start_task(t1).unwrap(), t0);
        assert_eq!(session.elapsed_seconds(&t1), Some(30));

        assert_eq!(session.finish_submission(), Some(t0));
        assert_eq!(session.started_at(), None);
        assert_eq!(session.finish_submission(), None);
    }

    #[test]
    fn anonymous_session_cannot_start() {
        let now = parse_civil("2025-10-01 10:00:00").unwrap();
        assert!(matches!(
            Session::default().start_task(now),
            Err(PortalError::Unauthorized)
        ));
    }

    #[test]
    fn store_round_trip() {
        let store = SessionStore::default();
        let id = store.create("SR05");
        assert_eq!(store.get(&id).unwrap().user(), Some("SR05"));

        store.update(&id, |s| s.select_meal_type(MealType::B)).unwrap();
        assert_eq!(store.get(&id).unwrap().meal_type(), MealType::B);

        store.remove(&id);
        assert!(store.get(&id).is_none());
        assert!(store.update(&id, |_| ()).is_none());
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let store = SessionStore::new(Duration::ZERO);
        let id = store.create("SR05");
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }
}
