use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, User};
use crate::repositories::{TokenKind, UserStore};

/// プロセス内メモリ上のユーザーストア（開発・テスト用）
///
/// 全ての書き込みは単一の書き込みロック内で完結するため、
/// トークン消費は他の要求と競合しない。
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// テスト用: レコードを直接書き換える
    #[cfg(test)]
    pub(crate) async fn update_with(&self, user_id: Uuid, f: impl FnOnce(&mut User)) {
        if let Some(user) = self.users.write().await.get_mut(&user_id) {
            f(user);
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new_user.email) {
            return Err(AppError::EmailAlreadyExists);
        }

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            name: new_user.name,
            is_verified: false,
            verification_token: Some(new_user.verification_token),
            verification_token_expires_at: Some(new_user.verification_token_expires_at),
            reset_password_token: None,
            reset_password_expires_at: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn record_login(&self, user_id: Uuid, at: OffsetDateTime) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(&user_id).ok_or(AppError::NotFound)?;
        user.last_login_at = Some(user.last_login_at.map_or(at, |prev| prev.max(at)));
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn set_verification_token(
        &self,
        user_id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&user_id) {
            user.verification_token = Some(token.to_string());
            user.verification_token_expires_at = Some(expires_at);
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&user_id) {
            user.reset_password_token = Some(token_hash.to_string());
            user.reset_password_expires_at = Some(expires_at);
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn find_and_consume_token(
        &self,
        kind: TokenKind,
        token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AppError> {
        let mut users = self.users.write().await;

        let matched = users.values_mut().find(|u| match kind {
            TokenKind::Verification => {
                u.verification_token.as_deref() == Some(token) && u.has_pending_verification(now)
            }
            TokenKind::PasswordReset { .. } => {
                u.reset_password_token.as_deref() == Some(token) && u.has_pending_reset(now)
            }
        });

        let Some(user) = matched else {
            return Ok(None);
        };

        match kind {
            TokenKind::Verification => {
                user.is_verified = true;
                user.verification_token = None;
                user.verification_token_expires_at = None;
            }
            TokenKind::PasswordReset { password_hash } => {
                user.password_hash = password_hash;
                user.reset_password_token = None;
                user.reset_password_expires_at = None;
            }
        }
        user.updated_at = OffsetDateTime::now_utc();

        Ok(Some(user.clone()))
    }

    async fn purge_expired_tokens(&self, now: OffsetDateTime) -> Result<u64, AppError> {
        let mut users = self.users.write().await;
        let mut purged = 0;

        for user in users.values_mut() {
            let mut touched = false;
            if user.verification_token_expires_at.is_some_and(|exp| exp <= now) {
                user.verification_token = None;
                user.verification_token_expires_at = None;
                touched = true;
            }
            if user.reset_password_expires_at.is_some_and(|exp| exp <= now) {
                user.reset_password_token = None;
                user.reset_password_expires_at = None;
                touched = true;
            }
            if touched {
                purged += 1;
            }
        }

        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn new_user(email: &str, code: &str, expires_at: OffsetDateTime) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            name: "A".to_string(),
            verification_token: code.to_string(),
            verification_token_expires_at: expires_at,
        }
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_email() {
        let store = InMemoryUserStore::new();
        let exp = OffsetDateTime::now_utc() + Duration::hours(24);
        store.create(new_user("a@x.com", "123456", exp)).await.unwrap();

        let result = store.create(new_user("a@x.com", "654321", exp)).await;
        assert!(matches!(result, Err(AppError::EmailAlreadyExists)));
    }

    #[tokio::test]
    async fn test_consume_verification_is_single_use() {
        let store = InMemoryUserStore::new();
        let now = OffsetDateTime::now_utc();
        let user = store
            .create(new_user("a@x.com", "123456", now + Duration::hours(24)))
            .await
            .unwrap();

        let consumed = store
            .find_and_consume_token(TokenKind::Verification, "123456", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(consumed.id, user.id);
        assert!(consumed.is_verified);
        assert!(consumed.verification_token.is_none());
        assert!(consumed.verification_token_expires_at.is_none());

        let again = store
            .find_and_consume_token(TokenKind::Verification, "123456", now)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_consume_rejects_token_at_expiry() {
        let store = InMemoryUserStore::new();
        let now = OffsetDateTime::now_utc();
        store
            .create(new_user("a@x.com", "123456", now))
            .await
            .unwrap();

        let result = store
            .find_and_consume_token(TokenKind::Verification, "123456", now)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_consume_reset_replaces_hash() {
        let store = InMemoryUserStore::new();
        let now = OffsetDateTime::now_utc();
        let user = store
            .create(new_user("a@x.com", "123456", now + Duration::hours(24)))
            .await
            .unwrap();
        store
            .set_reset_token(user.id, "digest", now + Duration::minutes(15))
            .await
            .unwrap();

        let kind = TokenKind::PasswordReset {
            password_hash: "new-hash".to_string(),
        };
        let consumed = store
            .find_and_consume_token(kind, "digest", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(consumed.password_hash, "new-hash");
        assert!(consumed.reset_password_token.is_none());
        // 検証コードには影響しない
        assert!(consumed.verification_token.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_consumption_succeeds_once() {
        let store = InMemoryUserStore::new();
        let now = OffsetDateTime::now_utc();
        store
            .create(new_user("a@x.com", "123456", now + Duration::hours(24)))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .find_and_consume_token(TokenKind::Verification, "123456", now)
                        .await
                        .unwrap()
                        .is_some()
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_record_login_never_moves_backwards() {
        let store = InMemoryUserStore::new();
        let now = OffsetDateTime::now_utc();
        let user = store
            .create(new_user("a@x.com", "123456", now + Duration::hours(24)))
            .await
            .unwrap();

        let later = now + Duration::seconds(5);
        store.record_login(user.id, later).await.unwrap();

        // 先に時刻を取った別のログインが後から書き込む
        let stale = store.record_login(user.id, now).await.unwrap();
        assert_eq!(stale.last_login_at, Some(later));

        let newer = store
            .record_login(user.id, later + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(newer.last_login_at, Some(later + Duration::seconds(1)));
    }

    #[tokio::test]
    async fn test_purge_expired_tokens() {
        let store = InMemoryUserStore::new();
        let now = OffsetDateTime::now_utc();
        let expired = store
            .create(new_user("a@x.com", "111111", now - Duration::minutes(1)))
            .await
            .unwrap();
        let live = store
            .create(new_user("b@x.com", "222222", now + Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(store.purge_expired_tokens(now).await.unwrap(), 1);

        let expired = store.find_by_id(expired.id).await.unwrap().unwrap();
        assert!(expired.verification_token.is_none());
        let live = store.find_by_id(live.id).await.unwrap().unwrap();
        assert_eq!(live.verification_token.as_deref(), Some("222222"));
    }
}
