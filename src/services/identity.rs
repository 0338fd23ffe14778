//! Accounts, password hashing and bearer-token sessions.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Duration;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::db::{begin_write, Role, User};

use super::clock::{format_timestamp, Clock};
use super::error::{is_unique_violation, ServiceError, ServiceResult};

/// Profile submitted at registration, already validated
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub country: String,
    pub city: String,
    pub job: String,
    pub description: Option<String>,
    pub role: Role,
    pub password: String,
}

/// An authenticated request: the user and the session it presented
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token_hash: String,
}

impl AuthSession {
    /// Fail unless the session belongs to a user with `role`
    pub fn require(&self, role: Role) -> ServiceResult<&User> {
        if self.user.role_enum() == role {
            Ok(&self.user)
        } else {
            Err(ServiceError::Authorization(format!(
                "Only {} accounts can perform this action",
                role
            )))
        }
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Insert a session row and return the plain token
async fn issue_token(
    conn: &mut SqliteConnection,
    clock: &dyn Clock,
    config: &AuthConfig,
    user_id: &str,
) -> ServiceResult<String> {
    let token = generate_token();
    let now = clock.now();
    let expires_at = format_timestamp(now + Duration::days(config.token_ttl_days));

    sqlx::query(
        "INSERT INTO sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(hash_token(&token))
    .bind(&expires_at)
    .bind(format_timestamp(now))
    .execute(&mut *conn)
    .await?;

    Ok(token)
}

fn email_taken() -> ServiceError {
    ServiceError::invalid_field("email", "The email has already been taken.")
}

/// Create an account and log it in
pub async fn register(
    db: &SqlitePool,
    clock: &dyn Clock,
    config: &AuthConfig,
    new_user: NewUser,
) -> ServiceResult<(User, String)> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&new_user.email)
        .fetch_optional(db)
        .await?;
    if existing.is_some() {
        return Err(email_taken());
    }

    let password_hash = hash_password(&new_user.password)
        .map_err(|e| ServiceError::Internal(format!("Failed to hash password: {}", e)))?;

    let id = Uuid::new_v4().to_string();
    let now = clock.timestamp();

    let mut tx = begin_write(db).await?;

    sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, role, country, city, job, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new_user.name)
    .bind(&new_user.email)
    .bind(&password_hash)
    .bind(new_user.role.as_str())
    .bind(&new_user.country)
    .bind(&new_user.city)
    .bind(&new_user.job)
    .bind(&new_user.description)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            email_taken()
        } else {
            ServiceError::Database(e)
        }
    })?;

    let token = issue_token(&mut tx, clock, config, &id).await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(user_id = %user.id, role = %new_user.role, "Registered new user");
    Ok((user, token))
}

/// Check credentials, revoke every existing session and issue a fresh one
pub async fn login(
    db: &SqlitePool,
    clock: &dyn Clock,
    config: &AuthConfig,
    email: &str,
    password: &str,
) -> ServiceResult<(User, String)> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?
        .ok_or(ServiceError::Authentication)?;

    if !verify_password(password, &user.password_hash) {
        return Err(ServiceError::Authentication);
    }

    let mut tx = begin_write(db).await?;

    let revoked = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(&user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let token = issue_token(&mut tx, clock, config, &user.id).await?;

    tx.commit().await?;

    info!(user_id = %user.id, revoked_sessions = revoked, "User logged in");
    Ok((user, token))
}

/// Revoke the presented session only
pub async fn logout(db: &SqlitePool, session: &AuthSession) -> ServiceResult<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(&session.token_hash)
        .execute(db)
        .await?;

    info!(user_id = %session.user.id, "User logged out");
    Ok(())
}

/// Resolve a bearer token to its user. Unknown and expired tokens fail alike.
pub async fn authenticate(
    db: &SqlitePool,
    clock: &dyn Clock,
    token: &str,
) -> ServiceResult<AuthSession> {
    let token_hash = hash_token(token);

    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.* FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = ? AND s.expires_at > ?
        "#,
    )
    .bind(&token_hash)
    .bind(clock.timestamp())
    .fetch_optional(db)
    .await?
    .ok_or(ServiceError::Authentication)?;

    Ok(AuthSession { user, token_hash })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::services::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap())
    }

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            name: "Test User".to_string(),
            email: email.to_string(),
            country: "Morocco".to_string(),
            city: "Tanger".to_string(),
            job: "Driver".to_string(),
            description: None,
            role,
            password: "correct horse".to_string(),
        }
    }

    async fn session_count(pool: &SqlitePool, user_id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(verify_password("s3cret-pass", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret-pass", "not-a-hash"));
    }

    #[test]
    fn test_tokens_are_random_and_hashed() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_ne!(hash_token(&a), a);
        assert_eq!(hash_token(&a), hash_token(&a));
    }

    #[tokio::test]
    async fn test_register_issues_a_working_token() {
        let pool = db::init_in_memory().await.unwrap();
        let clock = clock();
        let config = AuthConfig::default();

        let (user, token) = register(&pool, &clock, &config, new_user("a@example.com", Role::Client))
            .await
            .unwrap();
        assert_eq!(user.role_enum(), Role::Client);
        assert_ne!(user.password_hash, "correct horse");

        let session = authenticate(&pool, &clock, &token).await.unwrap();
        assert_eq!(session.user.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_validation_error() {
        let pool = db::init_in_memory().await.unwrap();
        let clock = clock();
        let config = AuthConfig::default();

        register(&pool, &clock, &config, new_user("dup@example.com", Role::Client))
            .await
            .unwrap();
        let err = register(&pool, &clock, &config, new_user("dup@example.com", Role::Partner))
            .await
            .unwrap_err();

        match err {
            ServiceError::Validation(errors) => assert!(errors.contains_key("email")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_keeps_a_single_active_session() {
        let pool = db::init_in_memory().await.unwrap();
        let clock = clock();
        let config = AuthConfig::default();

        let (user, first) = register(&pool, &clock, &config, new_user("s@example.com", Role::Client))
            .await
            .unwrap();
        let (_, second) = login(&pool, &clock, &config, "s@example.com", "correct horse")
            .await
            .unwrap();

        assert_eq!(session_count(&pool, &user.id).await, 1);
        assert!(matches!(
            authenticate(&pool, &clock, &first).await,
            Err(ServiceError::Authentication)
        ));
        assert!(authenticate(&pool, &clock, &second).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let pool = db::init_in_memory().await.unwrap();
        let clock = clock();
        let config = AuthConfig::default();

        register(&pool, &clock, &config, new_user("x@example.com", Role::Client))
            .await
            .unwrap();

        assert!(matches!(
            login(&pool, &clock, &config, "x@example.com", "wrong password").await,
            Err(ServiceError::Authentication)
        ));
        assert!(matches!(
            login(&pool, &clock, &config, "nobody@example.com", "correct horse").await,
            Err(ServiceError::Authentication)
        ));
    }

    #[tokio::test]
    async fn test_logout_revokes_only_the_presented_token() {
        let pool = db::init_in_memory().await.unwrap();
        let clock = clock();
        let config = AuthConfig::default();

        let (user, token) = register(&pool, &clock, &config, new_user("l@example.com", Role::Client))
            .await
            .unwrap();
        let session = authenticate(&pool, &clock, &token).await.unwrap();

        logout(&pool, &session).await.unwrap();

        assert_eq!(session_count(&pool, &user.id).await, 0);
        assert!(authenticate(&pool, &clock, &token).await.is_err());
    }

    #[tokio::test]
    async fn test_expired_tokens_are_rejected() {
        let pool = db::init_in_memory().await.unwrap();
        let clock = clock();
        let config = AuthConfig {
            token_ttl_days: 1,
            ..AuthConfig::default()
        };

        let (_, token) = register(&pool, &clock, &config, new_user("e@example.com", Role::Client))
            .await
            .unwrap();
        clock.advance(Duration::days(2));

        assert!(matches!(
            authenticate(&pool, &clock, &token).await,
            Err(ServiceError::Authentication)
        ));
    }

    #[tokio::test]
    async fn test_require_role() {
        let pool = db::init_in_memory().await.unwrap();
        let clock = clock();
        let config = AuthConfig::default();

        let (_, token) = register(&pool, &clock, &config, new_user("p@example.com", Role::Partner))
            .await
            .unwrap();
        let session = authenticate(&pool, &clock, &token).await.unwrap();

        assert!(session.require(Role::Partner).is_ok());
        assert!(matches!(
            session.require(Role::Client),
            Err(ServiceError::Authorization(_))
        ));
    }
}
