use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySql, Pool, Transaction};
use uuid::Uuid;

use super::model::{NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    Conflict(&'static str),

    #[error("row not found")]
    NotFound,

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Persistence boundary for user accounts and their 2FA state. One
/// production adapter ([`SqlUserStore`]) plus an in-memory stand-in
/// ([`MemoryUserStore`]) for tests and local runs.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Open a unit of work. Writes go through the returned transaction and
    /// only land on `commit`; dropping it discards them.
    async fn begin(&self) -> Result<Box<dyn UserStoreTx>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait UserStoreTx: Send {
    async fn create_user(&mut self, new: NewUser) -> Result<User, StoreError>;

    async fn set_two_factor_enabled(&mut self, id: &str, enabled: bool) -> Result<(), StoreError>;

    async fn store_totp_secret(&mut self, id: &str, secret: &str) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

fn new_user_record(new: NewUser) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4().to_string(),
        username: new.username,
        email: new.email,
        password_hash: new.password_hash,
        role: new.role,
        two_factor_enabled: false,
        totp_secret: None,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// MYSQL ADAPTER
// =============================================================================

#[derive(Clone)]
pub struct SqlUserStore {
    pool: Pool<MySql>,
}

impl SqlUserStore {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqlUserStore {
    async fn begin(&self) -> Result<Box<dyn UserStoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqlUserStoreTx { tx }))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}

struct SqlUserStoreTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl UserStoreTx for SqlUserStoreTx {
    async fn create_user(&mut self, new: NewUser) -> Result<User, StoreError> {
        let user = new_user_record(new);

        let result = sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, role, two_factor_enabled, totp_secret, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(user.two_factor_enabled)
        .bind(&user.totp_secret)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict("email"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_two_factor_enabled(&mut self, id: &str, enabled: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET two_factor_enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn store_totp_secret(&mut self, id: &str, secret: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET totp_secret = ?, updated_at = ? WHERE id = ?")
            .bind(secret)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// HashMap-backed store with the same commit/rollback contract as the SQL
/// adapter: writes are staged on the transaction and applied atomically on
/// commit.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<Mutex<HashMap<String, User>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

enum StagedWrite {
    Insert(User),
    SetTwoFactor { id: String, enabled: bool },
    SetSecret { id: String, secret: String },
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn begin(&self) -> Result<Box<dyn UserStoreTx>, StoreError> {
        Ok(Box::new(MemoryUserStoreTx {
            users: Arc::clone(&self.users),
            staged: Vec::new(),
        }))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.get(id).cloned())
    }
}

struct MemoryUserStoreTx {
    users: Arc<Mutex<HashMap<String, User>>>,
    staged: Vec<StagedWrite>,
}

impl MemoryUserStoreTx {
    fn staged_user_exists(&self, id: &str) -> bool {
        self.staged
            .iter()
            .any(|w| matches!(w, StagedWrite::Insert(u) if u.id == id))
    }
}

#[async_trait]
impl UserStoreTx for MemoryUserStoreTx {
    async fn create_user(&mut self, new: NewUser) -> Result<User, StoreError> {
        let email_taken = {
            let users = self.users.lock().unwrap();
            users.values().any(|u| u.email == new.email)
        } || self
            .staged
            .iter()
            .any(|w| matches!(w, StagedWrite::Insert(u) if u.email == new.email));

        if email_taken {
            return Err(StoreError::Conflict("email"));
        }

        let user = new_user_record(new);
        self.staged.push(StagedWrite::Insert(user.clone()));
        Ok(user)
    }

    async fn set_two_factor_enabled(&mut self, id: &str, enabled: bool) -> Result<(), StoreError> {
        let exists = self.users.lock().unwrap().contains_key(id) || self.staged_user_exists(id);
        if !exists {
            return Err(StoreError::NotFound);
        }
        self.staged.push(StagedWrite::SetTwoFactor {
            id: id.to_string(),
            enabled,
        });
        Ok(())
    }

    async fn store_totp_secret(&mut self, id: &str, secret: &str) -> Result<(), StoreError> {
        let exists = self.users.lock().unwrap().contains_key(id) || self.staged_user_exists(id);
        if !exists {
            return Err(StoreError::NotFound);
        }
        self.staged.push(StagedWrite::SetSecret {
            id: id.to_string(),
            secret: secret.to_string(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUserStoreTx { users, staged } = *self;
        let mut users = users.lock().unwrap();

        // Validate before applying so a failed commit leaves no partial state.
        for write in &staged {
            if let StagedWrite::Insert(user) = write {
                if users.values().any(|u| u.email == user.email) {
                    return Err(StoreError::Conflict("email"));
                }
            }
        }

        for write in staged {
            match write {
                StagedWrite::Insert(user) => {
                    users.insert(user.id.clone(), user);
                }
                StagedWrite::SetTwoFactor { id, enabled } => {
                    if let Some(user) = users.get_mut(&id) {
                        user.two_factor_enabled = enabled;
                        user.updated_at = Utc::now();
                    }
                }
                StagedWrite::SetSecret { id, secret } => {
                    if let Some(user) = users.get_mut(&id) {
                        user.totp_secret = Some(secret);
                        user.updated_at = Utc::now();
                    }
                }
            }
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Staged writes are simply discarded.
        Ok(())
    }
}
