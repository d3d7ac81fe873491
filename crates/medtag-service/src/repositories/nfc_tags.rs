//! NFC tag repository.

use crate::errors::ApiError;
use common::api::NfcTag;
use sqlx::PgPool;
use uuid::Uuid;

const TAG_COLUMNS: &str = r#"
    tag_id, user_id, tag_uid, tag_type, public_key_id, checksum, status,
    last_scanned_at, scan_count, revoked_at, revoked_reason, created_at, updated_at
"#;

/// Register a tag. A `tag_uid` that is already registered is a `Conflict`.
pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    tag_uid: &str,
    tag_type: &str,
    public_key_id: Uuid,
    checksum: &str,
) -> Result<NfcTag, ApiError> {
    sqlx::query_as::<_, NfcTag>(&format!(
        r#"
        INSERT INTO nfc_tags (user_id, tag_uid, tag_type, public_key_id, checksum)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {TAG_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(tag_uid)
    .bind(tag_type)
    .bind(public_key_id)
    .bind(checksum)
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict("This NFC tag is already registered".to_string())
        }
        _ => ApiError::Database(format!("Failed to register NFC tag: {}", e)),
    })
}

/// Tags of one user, newest first.
pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<NfcTag>, ApiError> {
    sqlx::query_as::<_, NfcTag>(&format!(
        "SELECT {TAG_COLUMNS} FROM nfc_tags WHERE user_id = $1 ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to list NFC tags: {}", e)))
}

pub async fn get_by_id(pool: &PgPool, tag_id: Uuid) -> Result<Option<NfcTag>, ApiError> {
    sqlx::query_as::<_, NfcTag>(&format!(
        "SELECT {TAG_COLUMNS} FROM nfc_tags WHERE tag_id = $1"
    ))
    .bind(tag_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch NFC tag: {}", e)))
}

pub async fn get_by_uid(pool: &PgPool, tag_uid: &str) -> Result<Option<NfcTag>, ApiError> {
    sqlx::query_as::<_, NfcTag>(&format!(
        "SELECT {TAG_COLUMNS} FROM nfc_tags WHERE tag_uid = $1"
    ))
    .bind(tag_uid)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch NFC tag: {}", e)))
}

/// Bump `scan_count` and `last_scanned_at`.
pub async fn record_scan(pool: &PgPool, tag_id: Uuid) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        UPDATE nfc_tags
        SET scan_count = scan_count + 1, last_scanned_at = NOW(), updated_at = NOW()
        WHERE tag_id = $1
        "#,
    )
    .bind(tag_id)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update scan statistics: {}", e)))?;

    Ok(())
}

/// Move an active tag to `REVOKED`. Returns `None` if the tag was not active.
pub async fn revoke(
    pool: &PgPool,
    tag_id: Uuid,
    reason: Option<&str>,
) -> Result<Option<NfcTag>, ApiError> {
    sqlx::query_as::<_, NfcTag>(&format!(
        r#"
        UPDATE nfc_tags
        SET status = 'REVOKED', revoked_at = NOW(), revoked_reason = $2, updated_at = NOW()
        WHERE tag_id = $1 AND status = 'ACTIVE'
        RETURNING {TAG_COLUMNS}
        "#
    ))
    .bind(tag_id)
    .bind(reason)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to revoke NFC tag: {}", e)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::repositories::users::{self, NewUser};
    use common::types::{Role, TagStatus};

    async fn seed_user(pool: &PgPool) -> Uuid {
        users::create_user(
            pool,
            &NewUser {
                email: "anna@example.com",
                password_hash: "$2b$12$hash",
                first_name: "Anna",
                last_name: "Ivanova",
                middle_name: None,
                phone: None,
                role: Role::Patient,
            },
        )
        .await
        .unwrap()
        .user_id
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_create_and_lookup(pool: PgPool) -> Result<(), ApiError> {
        let user_id = seed_user(&pool).await;
        let checksum = "0".repeat(64);

        let tag = create(&pool, user_id, "04A224B1C25E80", "NTAG215", Uuid::new_v4(), &checksum)
            .await?;
        assert_eq!(tag.status, TagStatus::Active);
        assert_eq!(tag.scan_count, 0);

        let by_uid = get_by_uid(&pool, "04A224B1C25E80").await?.expect("by uid");
        assert_eq!(by_uid.tag_id, tag.tag_id);
        assert_eq!(list_by_user(&pool, user_id).await?.len(), 1);
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_duplicate_uid_is_conflict(pool: PgPool) -> Result<(), ApiError> {
        let user_id = seed_user(&pool).await;
        let checksum = "0".repeat(64);
        create(&pool, user_id, "04A224B1C25E80", "NTAG215", Uuid::new_v4(), &checksum).await?;

        let err = create(&pool, user_id, "04A224B1C25E80", "NTAG215", Uuid::new_v4(), &checksum)
            .await
            .expect_err("duplicate uid");
        assert!(matches!(err, ApiError::Conflict(_)));
        Ok(())
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_record_scan_and_revoke(pool: PgPool) -> Result<(), ApiError> {
        let user_id = seed_user(&pool).await;
        let tag = create(&pool, user_id, "04A2", "NTAG215", Uuid::new_v4(), &"0".repeat(64)).await?;

        record_scan(&pool, tag.tag_id).await?;
        record_scan(&pool, tag.tag_id).await?;
        let scanned = get_by_id(&pool, tag.tag_id).await?.expect("tag");
        assert_eq!(scanned.scan_count, 2);
        assert!(scanned.last_scanned_at.is_some());

        let revoked = revoke(&pool, tag.tag_id, Some("lost")).await?.expect("revoked");
        assert_eq!(revoked.status, TagStatus::Revoked);
        assert_eq!(revoked.revoked_reason.as_deref(), Some("lost"));
        assert!(revoked.revoked_at.is_some());

        assert!(revoke(&pool, tag.tag_id, None).await?.is_none());
        Ok(())
    }
}
