//! User and session models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Closed set of account roles, fixed at registration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Partner,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Partner => "partner",
            Self::Client => "client",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Partner => "Partner",
            Self::Client => "Client",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    // "1" and "2" are the numeric codes older clients still send
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "partner" | "1" => Ok(Self::Partner),
            "client" | "2" => Ok(Self::Client),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub country: String,
    pub city: String,
    pub job: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn role_enum(&self) -> Role {
        // The column has a CHECK constraint, anything else is unreachable
        self.role.parse().unwrap_or(Role::Client)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub country: String,
    pub city: String,
    pub job: String,
    pub description: Option<String>,
    pub role: Role,
    pub role_name: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let role = user.role_enum();
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            country: user.country,
            city: user.city,
            job: user.job,
            description: user.description,
            role,
            role_name: role.label().to_string(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

/// Registration payload. Fields default to empty so missing values surface
/// as field-level validation errors instead of a body rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub country: String,
    pub city: String,
    pub job: String,
    pub description: Option<String>,
    pub role: String,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
    pub token_type: &'static str,
}

impl AuthResponse {
    pub fn bearer(user: User, token: String) -> Self {
        Self {
            user: UserResponse::from(user),
            token,
            token_type: "Bearer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parses_names_and_legacy_codes() {
        assert_eq!("partner".parse::<Role>().unwrap(), Role::Partner);
        assert_eq!("Client".parse::<Role>().unwrap(), Role::Client);
        assert_eq!("1".parse::<Role>().unwrap(), Role::Partner);
        assert_eq!("2".parse::<Role>().unwrap(), Role::Client);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_user_response_hides_password_hash() {
        let user = User {
            id: "u1".to_string(),
            name: "Amal".to_string(),
            email: "amal@example.com".to_string(),
            password_hash: "secret-hash".to_string(),
            role: "partner".to_string(),
            country: "Morocco".to_string(),
            city: "Tetouan".to_string(),
            job: "Agency".to_string(),
            description: None,
            created_at: "2026-10-19T00:00:00.000000Z".to_string(),
            updated_at: "2026-10-19T00:00:00.000000Z".to_string(),
        };

        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert_eq!(json["role"], "partner");
        assert_eq!(json["role_name"], "Partner");
        assert!(json.get("password_hash").is_none());
    }
}
