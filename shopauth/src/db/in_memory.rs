//! In-memory implementation of the storage traits.
//!
//! All maps live behind a single lock so multi-map updates (session rotation in particular) are
//! atomic. Intended for development and tests.

use crate::db::{
    errors::{DbError, Result},
    handlers::{ResourceClassResolver, SessionStore, UserStore},
    models::{
        products::ProductDBResponse,
        sessions::Session,
        users::{UserCreateDBRequest, UserDBResponse},
    },
};
use crate::types::{ProductCategory, ProductId, UserId};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, UserDBResponse>,
    user_ids_by_email: HashMap<String, UserId>,
    sessions: HashMap<UserId, Session>,
    session_by_access_token: HashMap<String, UserId>,
    session_by_refresh_token: HashMap<String, UserId>,
    products: HashMap<ProductId, ProductDBResponse>,
}

impl Inner {
    fn write_session(&mut self, session: &Session) -> Result<()> {
        for (token, index) in [
            (&session.access_token, &self.session_by_access_token),
            (&session.refresh_token, &self.session_by_refresh_token),
        ] {
            if index.get(token).is_some_and(|owner| *owner != session.user_id) {
                return Err(DbError::UniqueViolation {
                    constraint: Some("sessions_token_key".to_string()),
                    table: Some("sessions".to_string()),
                    message: "token already belongs to another session".to_string(),
                });
            }
        }

        self.remove_session(session.user_id);
        self.session_by_access_token.insert(session.access_token.clone(), session.user_id);
        self.session_by_refresh_token.insert(session.refresh_token.clone(), session.user_id);
        self.sessions.insert(session.user_id, session.clone());
        Ok(())
    }

    fn remove_session(&mut self, user_id: UserId) -> bool {
        match self.sessions.remove(&user_id) {
            Some(old) => {
                self.session_by_access_token.remove(&old.access_token);
                self.session_by_refresh_token.remove(&old.refresh_token);
                true
            }
            None => false,
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&self, product: ProductDBResponse) {
        self.inner.lock().products.insert(product.id, product);
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn session_for_user(&self, user_id: UserId) -> Option<Session> {
        self.inner.lock().sessions.get(&user_id).cloned()
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn create(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut inner = self.inner.lock();
        if inner.user_ids_by_email.contains_key(&request.email) {
            return Err(DbError::UniqueViolation {
                constraint: Some("users_email_key".to_string()),
                table: Some("users".to_string()),
                message: format!("email {} already exists", request.email),
            });
        }

        let now = Utc::now();
        let user = UserDBResponse {
            id: Uuid::new_v4(),
            email: request.email.clone(),
            password_hash: request.password_hash.clone(),
            role: request.role,
            created_at: now,
            updated_at: now,
        };
        inner.user_ids_by_email.insert(user.email.clone(), user.id);
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        Ok(self.inner.lock().users.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        let inner = self.inner.lock();
        Ok(inner.user_ids_by_email.get(email).and_then(|id| inner.users.get(id)).cloned())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn upsert(&self, session: &Session) -> Result<()> {
        self.inner.lock().write_session(session)
    }

    async fn find_by_access_token(&self, access_token: &str) -> Result<Option<Session>> {
        let inner = self.inner.lock();
        Ok(inner
            .session_by_access_token
            .get(access_token)
            .and_then(|user_id| inner.sessions.get(user_id))
            .cloned())
    }

    async fn find_refresh_token(&self, access_token: &str) -> Result<Option<String>> {
        let inner = self.inner.lock();
        Ok(inner
            .session_by_access_token
            .get(access_token)
            .and_then(|user_id| inner.sessions.get(user_id))
            .map(|session| session.refresh_token.clone()))
    }

    async fn delete_by_refresh_token(&self, refresh_token: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        match inner.session_by_refresh_token.get(refresh_token).copied() {
            Some(user_id) => Ok(inner.remove_session(user_id)),
            None => Ok(false),
        }
    }

    async fn rotate(&self, old_refresh_token: &str, next: &Session) -> Result<bool> {
        let mut inner = self.inner.lock();
        let Some(user_id) = inner.session_by_refresh_token.get(old_refresh_token).copied() else {
            return Ok(false);
        };
        inner.remove_session(user_id);
        inner.write_session(next)?;
        Ok(true)
    }
}

#[async_trait]
impl ResourceClassResolver for InMemoryStore {
    async fn category_by_id(&self, id: ProductId) -> Result<Option<ProductCategory>> {
        Ok(self.inner.lock().products.get(&id).map(|p| p.category))
    }

    async fn category_by_name(&self, name: &str) -> Result<Option<ProductCategory>> {
        Ok(self
            .inner
            .lock()
            .products
            .values()
            .find(|p| p.name == name)
            .map(|p| p.category))
    }
}
