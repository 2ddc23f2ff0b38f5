//! Account registration, login and profile settings

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::constants::MIN_PASSWORD_LEN;
use crate::domain::users::{self, NewUser};
use crate::models::{Role, User, Voice};
use crate::services::error::{AppError, AppResult};
use crate::services::session::{self, SessionError, SessionUser};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub user: User,
}

/// Normalize an email and check the password policy for a new account.
pub fn validate_credentials(email: &str, password: &str) -> AppResult<String> {
    let email = email.trim().to_ascii_lowercase();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(AppError::Validation("A valid email address is required".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }
    Ok(email)
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().is_some_and(|db| db.is_unique_violation())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Create an account, mapping a taken email to `Conflict`.
pub async fn create_account(
    db: &PgPool,
    email: &str,
    password: &str,
    first_name: Option<&str>,
    last_name: Option<&str>,
    role: Role,
    class_id: Option<Uuid>,
) -> AppResult<User> {
    let email = validate_credentials(email, password)?;
    let password_hash = session::hash_password(password).map_err(|e| {
        tracing::error!(error = %e, "Password hashing failed");
        AppError::Validation("Could not process password".into())
    })?;

    let new_user = NewUser {
        email: &email,
        password_hash: &password_hash,
        first_name: non_empty(first_name),
        last_name: non_empty(last_name),
        role,
        class_id,
    };

    users::create_user(db, &new_user).await.map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("An account with this email already exists".into())
        } else {
            e.into()
        }
    })
}

pub struct AuthService {
    db: PgPool,
    jwt_secret: Vec<u8>,
}

impl AuthService {
    pub fn new(db: PgPool, jwt_secret: Vec<u8>) -> Self {
        Self { db, jwt_secret }
    }

    pub fn issue(&self, user: User) -> AppResult<AuthResponse> {
        let access_token = session::create_access_token(user.id, user.role, &self.jwt_secret)
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to create access token");
                AppError::Unauthorized("Could not create session".into())
            })?;
        Ok(AuthResponse { access_token, user })
    }

    /// Teacher self-registration. Students join through a class code.
    pub async fn register(&self, req: RegisterRequest) -> AppResult<AuthResponse> {
        let user = create_account(
            &self.db,
            &req.email,
            &req.password,
            req.first_name.as_deref(),
            req.last_name.as_deref(),
            Role::Teacher,
            None,
        )
        .await?;

        tracing::info!(user_id = %user.id, "Registered teacher");
        self.issue(user)
    }

    pub async fn login(&self, req: LoginRequest) -> AppResult<AuthResponse> {
        let invalid = || AppError::Unauthorized("Invalid email or password".into());

        let user = users::find_by_email(&self.db, req.email.trim())
            .await?
            .ok_or_else(invalid)?;
        if !session::verify_password(&req.password, &user.password_hash) {
            return Err(invalid());
        }

        tracing::debug!(user_id = %user.id, "User logged in");
        self.issue(user)
    }

    pub fn authenticate(&self, token: &str) -> AppResult<SessionUser> {
        session::validate_access_token(token, &self.jwt_secret).map_err(|e| match e {
            SessionError::Expired => AppError::Unauthorized("Session expired".into()),
            _ => AppError::Unauthorized("Invalid access token".into()),
        })
    }

    pub async fn me(&self, user_id: Uuid) -> AppResult<User> {
        users::find_by_id(&self.db, user_id)
            .await?
            .ok_or(AppError::NotFound("User"))
    }

    pub async fn update_voice(&self, user_id: Uuid, voice: Voice) -> AppResult<User> {
        users::update_voice(&self.db, user_id, voice)
            .await?
            .ok_or(AppError::NotFound("User"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_credentials_are_normalized() {
        assert_eq!(
            validate_credentials("  Ada@School.Test ", "long-enough").unwrap(),
            "ada@school.test"
        );
    }

    #[test]
    fn test_bad_credentials_rejected() {
        assert_matches!(validate_credentials("no-at-sign", "long-enough"), Err(AppError::Validation(_)));
        assert_matches!(validate_credentials("a@localhost", "long-enough"), Err(AppError::Validation(_)));
        assert_matches!(
            validate_credentials("ada@school.test", "short"),
            Err(AppError::Validation(ref m)) if m.contains("at least 8")
        );
    }
}
