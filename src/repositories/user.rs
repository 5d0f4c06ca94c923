use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, User};
use crate::repositories::{TokenKind, UserStore};

const USER_COLUMNS: &str = "id, email, password_hash, name, is_verified, \
     verification_token, verification_token_expires_at, \
     reset_password_token, reset_password_expires_at, \
     last_login_at, created_at, updated_at";

/// PostgreSQL 上のユーザーストア
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, name, verification_token, verification_token_expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(&new_user.name)
        .bind(&new_user.verification_token)
        .bind(new_user.verification_token_expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            // UNIQUE制約違反チェック
            if let sqlx::Error::Database(db_err) = &e
                && db_err.constraint() == Some("users_email_key")
            {
                return AppError::EmailAlreadyExists;
            }
            AppError::Database(e)
        })
    }

    async fn record_login(&self, user_id: Uuid, at: OffsetDateTime) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET last_login_at = GREATEST(COALESCE(last_login_at, $2), $2), updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)
    }

    async fn set_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET verification_token = $2, verification_token_expires_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_password_token = $2, reset_password_expires_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 単一の UPDATE ... RETURNING で照合・変更・削除を行う
    ///
    /// 6桁コードは利用者間で衝突しうるため、検証コードは一件だけ行ロックして消費する
    async fn find_and_consume_token(
        &self,
        kind: TokenKind,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AppError> {
        let user = match kind {
            TokenKind::Verification => {
                sqlx::query_as::<_, User>(&format!(
                    r#"
                    UPDATE users
                    SET is_verified = TRUE,
                        verification_token = NULL,
                        verification_token_expires_at = NULL,
                        updated_at = NOW()
                    WHERE id = (
                        SELECT id FROM users
                        WHERE verification_token = $1 AND verification_token_expires_at > $2
                        ORDER BY verification_token_expires_at DESC
                        LIMIT 1
                        FOR UPDATE
                    )
                    RETURNING {USER_COLUMNS}
                    "#
                ))
                .bind(token)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?
            }
            TokenKind::PasswordReset { password_hash } => {
                sqlx::query_as::<_, User>(&format!(
                    r#"
                    UPDATE users
                    SET password_hash = $3,
                        reset_password_token = NULL,
                        reset_password_expires_at = NULL,
                        updated_at = NOW()
                    WHERE reset_password_token = $1 AND reset_password_expires_at > $2
                    RETURNING {USER_COLUMNS}
                    "#
                ))
                .bind(token)
                .bind(now)
                .bind(password_hash)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(user)
    }

    async fn purge_expired_tokens(&self, now: OffsetDateTime) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET verification_token = CASE WHEN verification_token_expires_at <= $1 THEN NULL ELSE verification_token END,
                verification_token_expires_at = CASE WHEN verification_token_expires_at <= $1 THEN NULL ELSE verification_token_expires_at END,
                reset_password_token = CASE WHEN reset_password_expires_at <= $1 THEN NULL ELSE reset_password_token END,
                reset_password_expires_at = CASE WHEN reset_password_expires_at <= $1 THEN NULL ELSE reset_password_expires_at END
            WHERE verification_token_expires_at <= $1 OR reset_password_expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
