//! User repository.

use crate::errors::ApiError;
use crate::models::User;
use common::types::Role;
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = r#"
    user_id, email, password_hash, phone, first_name, last_name, middle_name,
    role, is_active, is_verified, two_factor_enabled, date_joined, last_login, updated_at
"#;

/// Fields of a new account.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub middle_name: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub role: Role,
}

/// Get user by (normalized) email.
pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch user by email: {}", e)))?;

    Ok(user)
}

/// Get user by user_id.
pub async fn get_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch user by id: {}", e)))?;

    Ok(user)
}

/// Create a new user.
///
/// A duplicate email surfaces as `ApiError::Conflict`.
pub async fn create_user(pool: &PgPool, new_user: &NewUser<'_>) -> Result<User, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (
            email, password_hash, first_name, last_name, middle_name, phone, role
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(new_user.email)
    .bind(new_user.password_hash)
    .bind(new_user.first_name)
    .bind(new_user.last_name)
    .bind(new_user.middle_name)
    .bind(new_user.phone)
    .bind(new_user.role)
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict("A user with this email already exists".to_string())
        }
        _ => ApiError::Database(format!("Failed to create user: {}", e)),
    })?;

    Ok(user)
}

/// Update profile fields; `None` leaves a column unchanged.
pub async fn update_details(
    pool: &PgPool,
    user_id: Uuid,
    first_name: Option<&str>,
    last_name: Option<&str>,
    middle_name: Option<&str>,
    phone: Option<&str>,
) -> Result<User, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            middle_name = COALESCE($4, middle_name),
            phone = COALESCE($5, phone),
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(first_name)
    .bind(last_name)
    .bind(middle_name)
    .bind(phone)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update user: {}", e)))?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(user)
}

/// Stamp `last_login` and return the updated row.
pub async fn update_last_login(pool: &PgPool, user_id: Uuid) -> Result<User, ApiError> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET last_login = NOW()
        WHERE user_id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update last login: {}", e)))?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(user)
}

pub async fn update_password(
    pool: &PgPool,
    user_id: Uuid,
    password_hash: &str,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $2, updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(password_hash)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update password: {}", e)))?;

    Ok(())
}

pub async fn set_two_factor_enabled(
    pool: &PgPool,
    user_id: Uuid,
    enabled: bool,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        UPDATE users
        SET two_factor_enabled = $2, updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(enabled)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update 2FA flag: {}", e)))?;

    Ok(())
}

/// Activate or deactivate an account.
pub async fn set_active(pool: &PgPool, user_id: Uuid, is_active: bool) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        UPDATE users
        SET is_active = $2, updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(is_active)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update user status: {}", e)))?;

    Ok(())
}

/// Change a user's role.
pub async fn set_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        UPDATE users
        SET role = $2, updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(role)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update user role: {}", e)))?;

    Ok(())
}
