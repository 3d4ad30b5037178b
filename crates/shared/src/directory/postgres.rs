//! Postgres-backed tenant directory

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use super::TenantDirectory;
use crate::error::{DirectoryError, DirectoryResult};
use crate::models::{NewTenant, Restriction, Tenant, TenantId, TenantSlug, TenantStatus};

const TENANT_COLUMNS: &str = r#"
    id, slug, name, contact_email, status,
    login_blocked, login_block_reason, site_blocked, site_block_reason,
    decline_reason, created_at, updated_at
"#;

/// Database row type for the `tenants` table
#[derive(Debug, FromRow)]
struct TenantRow {
    id: i64,
    slug: String,
    name: String,
    contact_email: String,
    status: String,
    login_blocked: bool,
    login_block_reason: Option<String>,
    site_blocked: bool,
    site_block_reason: Option<String>,
    decline_reason: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = DirectoryError;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let slug = TenantSlug::parse(&row.slug).map_err(|e| {
            DirectoryError::Database(format!("tenant {} has invalid slug: {}", row.id, e))
        })?;
        let status = row
            .status
            .parse::<TenantStatus>()
            .map_err(DirectoryError::Database)?;

        Ok(Tenant {
            id: TenantId(row.id),
            slug,
            name: row.name,
            contact_email: row.contact_email,
            status,
            login_restriction: Restriction {
                blocked: row.login_blocked,
                reason: row.login_block_reason,
            },
            site_restriction: Restriction {
                blocked: row.site_blocked,
                reason: row.site_block_reason,
            },
            decline_reason: row.decline_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgTenantDirectory {
    pool: PgPool,
}

impl PgTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, predicate: &str, bind: Binding<'_>) -> DirectoryResult<Option<Tenant>> {
        let sql = format!("SELECT {} FROM tenants WHERE {}", TENANT_COLUMNS, predicate);
        let query = sqlx::query_as::<_, TenantRow>(&sql);
        let row = match bind {
            Binding::Id(id) => query.bind(id).fetch_optional(&self.pool).await?,
            Binding::Text(text) => query.bind(text).fetch_optional(&self.pool).await?,
        };
        row.map(Tenant::try_from).transpose()
    }

    /// Apply a status transition only if the tenant is still `pending`
    async fn transition(
        &self,
        id: TenantId,
        action: &'static str,
        status: TenantStatus,
        decline_reason: Option<&str>,
    ) -> DirectoryResult<Tenant> {
        let sql = format!(
            r#"
            UPDATE tenants
            SET status = $2, decline_reason = $3, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            TENANT_COLUMNS
        );
        let updated: Option<TenantRow> = sqlx::query_as(&sql)
            .bind(id.get())
            .bind(status.as_str())
            .bind(decline_reason)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => Tenant::try_from(row),
            None => match self.find_by_id(id).await? {
                Some(existing) => Err(DirectoryError::InvalidTransition {
                    from: existing.status,
                    action,
                }),
                None => Err(DirectoryError::NotFound(id)),
            },
        }
    }
}

enum Binding<'a> {
    Id(i64),
    Text(&'a str),
}

#[async_trait]
impl TenantDirectory for PgTenantDirectory {
    async fn find_by_slug(&self, slug: &TenantSlug) -> DirectoryResult<Option<Tenant>> {
        self.fetch_one_by("slug = $1", Binding::Text(slug.as_str()))
            .await
    }

    async fn find_by_id(&self, id: TenantId) -> DirectoryResult<Option<Tenant>> {
        self.fetch_one_by("id = $1", Binding::Id(id.get())).await
    }

    async fn list_active(&self) -> DirectoryResult<Vec<Tenant>> {
        let sql = format!(
            "SELECT {} FROM tenants WHERE status = 'active' ORDER BY id",
            TENANT_COLUMNS
        );
        let rows: Vec<TenantRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(Tenant::try_from).collect()
    }

    async fn register(&self, tenant: NewTenant) -> DirectoryResult<Tenant> {
        let sql = format!(
            r#"
            INSERT INTO tenants (slug, name, contact_email, status)
            VALUES ($1, $2, $3, 'pending')
            ON CONFLICT (slug) DO NOTHING
            RETURNING {}
            "#,
            TENANT_COLUMNS
        );
        let row: Option<TenantRow> = sqlx::query_as(&sql)
            .bind(tenant.slug.as_str())
            .bind(&tenant.name)
            .bind(&tenant.contact_email)
            .fetch_optional(&self.pool)
            .await?;

        let row = row.ok_or_else(|| DirectoryError::SlugTaken(tenant.slug.to_string()))?;
        let created = Tenant::try_from(row)?;

        tracing::info!(
            tenant_id = %created.id,
            slug = %created.slug,
            "Tenant registered (pending approval)"
        );
        Ok(created)
    }

    async fn activate(&self, id: TenantId) -> DirectoryResult<Tenant> {
        self.transition(id, "approve", TenantStatus::Active, None)
            .await
    }

    async fn decline(&self, id: TenantId, reason: &str) -> DirectoryResult<Tenant> {
        self.transition(id, "decline", TenantStatus::Declined, Some(reason))
            .await
    }

    async fn set_restrictions(
        &self,
        id: TenantId,
        login: Restriction,
        site: Restriction,
    ) -> DirectoryResult<Tenant> {
        let sql = format!(
            r#"
            UPDATE tenants
            SET login_blocked = $2, login_block_reason = $3,
                site_blocked = $4, site_block_reason = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            TENANT_COLUMNS
        );
        let row: Option<TenantRow> = sqlx::query_as(&sql)
            .bind(id.get())
            .bind(login.blocked)
            .bind(&login.reason)
            .bind(site.blocked)
            .bind(&site.reason)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or(DirectoryError::NotFound(id))
            .and_then(Tenant::try_from)
    }

    async fn remove(&self, id: TenantId) -> DirectoryResult<()> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound(id));
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
