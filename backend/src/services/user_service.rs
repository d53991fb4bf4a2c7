//! User accounts: registration, credential checks, profile updates.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::user::User;

pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: Option<String>,
    pub phone: Option<String>,
    pub image_url: Option<String>,
}

pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub image_url: Option<String>,
    pub is_active: Option<bool>,
}

pub struct UserService {
    db: PgPool,
}

impl UserService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, new: NewUser) -> Result<User> {
        let email = new.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("A valid email is required".into()));
        }

        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(&email)
            .fetch_optional(&self.db)
            .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "A user with email {email} already exists"
            )));
        }

        let password_hash = match &new.password {
            Some(password) => {
                if password.len() < 8 {
                    return Err(AppError::Validation(
                        "Password must be at least 8 characters".into(),
                    ));
                }
                Some(
                    bcrypt::hash(password, bcrypt::DEFAULT_COST)
                        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))?,
                )
            }
            None => None,
        };

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, first_name, last_name, password_hash, phone, image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&password_hash)
        .bind(&new.phone)
        .bind(&new.image_url)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    pub async fn get(&self, id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY email")
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    pub async fn update(&self, id: Uuid, update: UserUpdate) -> Result<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                phone = COALESCE($4, phone),
                image_url = COALESCE($5, image_url),
                is_active = COALESCE($6, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.phone)
        .bind(&update.image_url)
        .bind(update.is_active)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))
    }

    /// Verify email + password. Returns the user on success, an
    /// `Authentication` error otherwise. The same error covers unknown
    /// emails, wrong passwords, and passwordless accounts.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let invalid = || AppError::Authentication("Invalid email or password".into());

        let user = self.get_by_email(email).await?.ok_or_else(invalid)?;
        if !user.is_active {
            return Err(AppError::Authentication("Account is disabled".into()));
        }
        let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
        let ok = bcrypt::verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {e}")))?;
        if !ok {
            return Err(invalid());
        }
        Ok(user)
    }
}
