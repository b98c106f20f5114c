use async_trait::async_trait;
use secrecy::ExposeSecret;
use secrecy::Secret;
use sqlx::PgPool;

use super::StoredToken;
use super::TokenStore;
use super::TokenStoreError;
use crate::domain::TenantId;

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    #[tracing::instrument(skip(self, token), fields(tenant_id = %token.tenant_id))]
    async fn put(
        &self,
        token: StoredToken,
    ) -> Result<(), TokenStoreError> {
        let scopes = token.scopes.join(" ");
        let now = chrono::Utc::now();
        sqlx::query!(
            r#"
            INSERT INTO mailbox_tokens (tenant_id, access_token, refresh_token, scopes, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (tenant_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                scopes = EXCLUDED.scopes,
                expires_at = EXCLUDED.expires_at,
                updated_at = EXCLUDED.updated_at
            "#,
            token.tenant_id.as_ref(),
            token.access_token.expose_secret(),
            token.refresh_token.expose_secret(),
            scopes,
            token.expires_at,
            now,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(%tenant_id))]
    async fn get(
        &self,
        tenant_id: &TenantId,
    ) -> Result<StoredToken, TokenStoreError> {
        let row = sqlx::query!(
            r#"
            SELECT tenant_id, access_token, refresh_token, scopes, expires_at, created_at, updated_at
            FROM mailbox_tokens
            WHERE tenant_id = $1
            "#,
            tenant_id.as_ref(),
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TokenStoreError::NotFound)?;

        Ok(StoredToken {
            tenant_id: TenantId::new(row.tenant_id),
            access_token: Secret::new(row.access_token),
            refresh_token: Secret::new(row.refresh_token),
            scopes: row.scopes.split_whitespace().map(str::to_string).collect(),
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    #[tracing::instrument(skip(self), fields(%tenant_id))]
    async fn delete(
        &self,
        tenant_id: &TenantId,
    ) -> Result<(), TokenStoreError> {
        sqlx::query!("DELETE FROM mailbox_tokens WHERE tenant_id = $1", tenant_id.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>, TokenStoreError> {
        let rows = sqlx::query!("SELECT tenant_id FROM mailbox_tokens").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| TenantId::new(r.tenant_id)).collect())
    }
}
