use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::User,
};

/// Lookup and creation of user records for the auth handlers.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Inserts a new user; fails with `AppError::Conflict` on a taken username.
    async fn create_user(&self, user: User) -> Result<User>;

    /// Finds a user by their username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Finds a user by their ID.
    async fn find_by_id(&self, user_id: &Uuid) -> Result<Option<User>>;
}

#[derive(Default)]
struct Users {
    by_id: HashMap<Uuid, User>,
    id_by_username: HashMap<String, Uuid>,
}

/// An in-process user directory.
#[derive(Clone, Default)]
pub struct MemoryUserDirectory {
    users: Arc<RwLock<Users>>,
}

impl MemoryUserDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn create_user(&self, user: User) -> Result<User> {
        let mut users = self.users.write().await;
        if users.id_by_username.contains_key(&user.username) {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }
        users.id_by_username.insert(user.username.clone(), user.id);
        users.by_id.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .id_by_username
            .get(username)
            .and_then(|id| users.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, user_id: &Uuid) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.by_id.get(user_id).cloned())
    }
}
