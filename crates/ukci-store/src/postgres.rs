use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, warn};
use ukci_core::{
    slugify, unique_slug, Alert, AlertType, Company, Filing, NewAlert, NewCompany, NewTenant,
    Officer, RegisteredAddress, Severity, SubscriptionTier, Tenant,
};
use uuid::Uuid;

use crate::{
    statuses_match, AlertQuery, CheckCommit, CommitReport, MonitorStore, StoreError, SweepReport,
};

const COMPANY_COLUMNS: &str = r#"
    c.id, c.tenant_id, c.registration_number, c.name, c.status, c.incorporation_date,
    c.address_line_1, c.address_line_2, c.locality, c.region, c.postal_code, c.country,
    c.sic_codes, c.is_monitored, c.last_checked_at, c.risk_score, c.raw_payload,
    c.created_at, c.updated_at
"#;

const ALERT_COLUMNS: &str = r#"
    id, tenant_id, company_id, alert_type, title, description, severity, payload,
    is_read, expires_at, created_at
"#;

const TENANT_COLUMNS: &str = "id, name, slug, subscription_tier, is_active, created_at";

/// Attempts at resolving a slug race before giving up with `Conflict`.
const SLUG_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Database(err.into()))?;
        info!("database migrations applied");
        Ok(())
    }
}

fn decode_label<T>(raw: String) -> sqlx::Result<T>
where
    T: std::str::FromStr<Err = ukci_core::UnknownVariant>,
{
    raw.parse::<T>()
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))
}

fn tenant_from_row(row: &PgRow) -> sqlx::Result<Tenant> {
    Ok(Tenant {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        subscription_tier: decode_label::<SubscriptionTier>(row.try_get("subscription_tier")?)?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn company_from_row(row: &PgRow) -> sqlx::Result<Company> {
    Ok(Company {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        registration_number: row.try_get("registration_number")?,
        name: row.try_get("name")?,
        status: row.try_get("status")?,
        incorporation_date: row.try_get("incorporation_date")?,
        address: RegisteredAddress {
            address_line_1: row.try_get("address_line_1")?,
            address_line_2: row.try_get("address_line_2")?,
            locality: row.try_get("locality")?,
            region: row.try_get("region")?,
            postal_code: row.try_get("postal_code")?,
            country: row.try_get("country")?,
        },
        sic_codes: row.try_get("sic_codes")?,
        is_monitored: row.try_get("is_monitored")?,
        last_checked_at: row.try_get("last_checked_at")?,
        risk_score: row.try_get("risk_score")?,
        raw_payload: row.try_get("raw_payload")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn alert_from_row(row: &PgRow) -> sqlx::Result<Alert> {
    Ok(Alert {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        company_id: row.try_get("company_id")?,
        alert_type: decode_label::<AlertType>(row.try_get("alert_type")?)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        severity: decode_label::<Severity>(row.try_get("severity")?)?,
        payload: row.try_get("payload")?,
        is_read: row.try_get("is_read")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn filing_from_row(row: &PgRow) -> sqlx::Result<Filing> {
    Ok(Filing {
        transaction_id: row.try_get("transaction_id")?,
        category: row.try_get("category")?,
        filing_type: row.try_get("filing_type")?,
        date: row.try_get("filing_date")?,
        description: row.try_get("description")?,
        paper_filed: row.try_get("paper_filed")?,
        raw: row.try_get("raw_payload")?,
    })
}

fn officer_from_row(row: &PgRow) -> sqlx::Result<Officer> {
    Ok(Officer {
        officer_id: row.try_get("officer_id")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        appointed_on: row.try_get("appointed_on")?,
        resigned_on: row.try_get("resigned_on")?,
        nationality: row.try_get("nationality")?,
        country_of_residence: row.try_get("country_of_residence")?,
        occupation: row.try_get("occupation")?,
        raw: row.try_get("raw_payload")?,
    })
}

async fn insert_alert_tx(
    tx: &mut Transaction<'_, Postgres>,
    alert: NewAlert,
    created_at: DateTime<Utc>,
) -> sqlx::Result<Alert> {
    let sql = format!(
        r#"
        INSERT INTO alerts
            (id, tenant_id, company_id, alert_type, title, description, severity, payload,
             is_read, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9, $10)
        RETURNING {ALERT_COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(alert.tenant_id)
        .bind(alert.company_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.title)
        .bind(alert.description)
        .bind(alert.severity.as_str())
        .bind(alert.payload)
        .bind(alert.expires_at)
        .bind(created_at)
        .fetch_one(&mut **tx)
        .await?;
    alert_from_row(&row)
}

#[async_trait]
impl MonitorStore for PgStore {
    async fn create_tenant(&self, tenant: NewTenant) -> Result<Tenant, StoreError> {
        let base = slugify(&tenant.name);
        for attempt in 0..SLUG_ATTEMPTS {
            let rows =
                sqlx::query("SELECT slug FROM tenants WHERE slug = $1 OR slug LIKE $1 || '-%'")
                    .bind(&base)
                    .fetch_all(&self.pool)
                    .await?;
            let taken = rows
                .iter()
                .map(|row| row.try_get::<String, _>("slug"))
                .collect::<sqlx::Result<HashSet<_>>>()?;
            let slug = unique_slug(&base, |s| taken.contains(s));

            let sql = format!(
                "INSERT INTO tenants (id, name, slug, subscription_tier, is_active) \
                 VALUES ($1, $2, $3, $4, TRUE) RETURNING {TENANT_COLUMNS}"
            );
            let inserted = sqlx::query(&sql)
                .bind(Uuid::new_v4())
                .bind(tenant.name.trim())
                .bind(&slug)
                .bind(tenant.subscription_tier.as_str())
                .fetch_one(&self.pool)
                .await;
            match inserted.map_err(StoreError::from) {
                Ok(row) => return Ok(tenant_from_row(&row)?),
                Err(StoreError::Conflict) => {
                    debug!(slug = %slug, attempt, "tenant slug taken concurrently, retrying");
                }
                Err(err) => return Err(err),
            }
        }
        Err(StoreError::Conflict)
    }

    async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, StoreError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(tenant_from_row).transpose()?)
    }

    async fn list_active_tenants(&self) -> Result<Vec<Tenant>, StoreError> {
        let sql = format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE is_active ORDER BY created_at"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(tenant_from_row).collect::<sqlx::Result<_>>()?)
    }

    async fn delete_tenant(&self, tenant_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_company(&self, company: NewCompany) -> Result<Company, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO companies AS c
                (id, tenant_id, registration_number, name, status, incorporation_date,
                 address_line_1, address_line_2, locality, region, postal_code, country,
                 sic_codes, is_monitored, risk_score, raw_payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {COMPANY_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(company.tenant_id)
            .bind(&company.registration_number)
            .bind(&company.name)
            .bind(&company.status)
            .bind(company.incorporation_date)
            .bind(&company.address.address_line_1)
            .bind(&company.address.address_line_2)
            .bind(&company.address.locality)
            .bind(&company.address.region)
            .bind(&company.address.postal_code)
            .bind(&company.address.country)
            .bind(&company.sic_codes)
            .bind(company.is_monitored)
            .bind(company.risk_score)
            .bind(&company.raw_payload)
            .fetch_one(&self.pool)
            .await?;
        Ok(company_from_row(&row)?)
    }

    async fn get_company(
        &self,
        tenant_id: Uuid,
        company_id: Uuid,
    ) -> Result<Option<Company>, StoreError> {
        let sql = format!(
            "SELECT {COMPANY_COLUMNS} FROM companies c WHERE c.id = $1 AND c.tenant_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(company_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(company_from_row).transpose()?)
    }

    async fn get_company_by_id(&self, company_id: Uuid) -> Result<Option<Company>, StoreError> {
        let sql = format!("SELECT {COMPANY_COLUMNS} FROM companies c WHERE c.id = $1");
        let row = sqlx::query(&sql)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(company_from_row).transpose()?)
    }

    async fn find_company(
        &self,
        tenant_id: Uuid,
        registration_number: &str,
    ) -> Result<Option<Company>, StoreError> {
        let sql = format!(
            "SELECT {COMPANY_COLUMNS} FROM companies c \
             WHERE c.tenant_id = $1 AND c.registration_number = $2"
        );
        let row = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(registration_number)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(company_from_row).transpose()?)
    }

    async fn list_companies(
        &self,
        tenant_id: Uuid,
        monitored: Option<bool>,
    ) -> Result<Vec<Company>, StoreError> {
        let sql = format!(
            "SELECT {COMPANY_COLUMNS} FROM companies c \
             WHERE c.tenant_id = $1 AND ($2::BOOLEAN IS NULL OR c.is_monitored = $2) \
             ORDER BY c.name"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(monitored)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(company_from_row).collect::<sqlx::Result<_>>()?)
    }

    async fn set_monitoring(
        &self,
        tenant_id: Uuid,
        company_id: Uuid,
        monitored: bool,
    ) -> Result<Option<Company>, StoreError> {
        let sql = format!(
            "UPDATE companies AS c SET is_monitored = $3, updated_at = now() \
             WHERE c.id = $1 AND c.tenant_id = $2 RETURNING {COMPANY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(company_id)
            .bind(tenant_id)
            .bind(monitored)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(company_from_row).transpose()?)
    }

    async fn delete_company(&self, tenant_id: Uuid, company_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM companies WHERE id = $1 AND tenant_id = $2")
            .bind(company_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn select_due(
        &self,
        cutoff: DateTime<Utc>,
        tenant_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Company>, StoreError> {
        let sql = format!(
            r#"
            SELECT {COMPANY_COLUMNS}
              FROM companies c
              JOIN tenants t ON t.id = c.tenant_id
             WHERE c.is_monitored
               AND t.is_active
               AND (c.last_checked_at IS NULL OR c.last_checked_at < $1)
               AND ($2::UUID IS NULL OR c.tenant_id = $2)
             ORDER BY c.last_checked_at ASC NULLS FIRST, c.created_at ASC
             LIMIT $3
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(cutoff)
            .bind(tenant_id)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(company_from_row).collect::<sqlx::Result<_>>()?)
    }

    async fn filing_ids(&self, company_id: Uuid) -> Result<HashSet<String>, StoreError> {
        let rows = sqlx::query("SELECT transaction_id FROM company_filings WHERE company_id = $1")
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<String, _>("transaction_id"))
            .collect::<sqlx::Result<_>>()?)
    }

    async fn list_filings(&self, company_id: Uuid, limit: i64) -> Result<Vec<Filing>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, category, filing_type, filing_date, description, paper_filed,
                   raw_payload
              FROM company_filings
             WHERE company_id = $1
             ORDER BY filing_date DESC NULLS LAST, created_at DESC
             LIMIT $2
            "#,
        )
        .bind(company_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(filing_from_row).collect::<sqlx::Result<_>>()?)
    }

    async fn list_officers(&self, company_id: Uuid) -> Result<Vec<Officer>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT officer_id, name, role, appointed_on, resigned_on, nationality,
                   country_of_residence, occupation, raw_payload
              FROM company_officers
             WHERE company_id = $1
             ORDER BY appointed_on DESC NULLS LAST, name
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(officer_from_row).collect::<sqlx::Result<_>>()?)
    }

    async fn last_alert_at(
        &self,
        company_id: Uuid,
        alert_type: AlertType,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = sqlx::query(
            "SELECT max(created_at) AS last_at FROM alerts \
             WHERE company_id = $1 AND alert_type = $2",
        )
        .bind(company_id)
        .bind(alert_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("last_at")?)
    }

    async fn commit_check(&self, commit: CheckCommit) -> Result<CommitReport, StoreError> {
        let mut tx = self.pool.begin().await?;
        let at = commit.checked_at;

        let locked = sqlx::query(
            "SELECT status FROM companies WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
        )
        .bind(commit.company_id)
        .bind(commit.tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        let stored_status: Option<String> = locked.try_get("status")?;

        let mut report = CommitReport::default();

        if let Some(status) = commit.status {
            if statuses_match(stored_status.as_deref(), status.previous.as_deref()) {
                insert_alert_tx(&mut tx, status.alert, at).await?;
                report.status_changed = true;
                report.alerts_created += 1;
            } else {
                debug!(company_id = %commit.company_id, "status already moved on, skipping alert");
                report.conflicts += 1;
            }
        }

        for write in commit.filings {
            let filing = write.filing;
            let inserted = sqlx::query(
                r#"
                INSERT INTO company_filings
                    (id, company_id, tenant_id, transaction_id, category, filing_type,
                     filing_date, description, paper_filed, raw_payload, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (company_id, transaction_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(commit.company_id)
            .bind(commit.tenant_id)
            .bind(&filing.transaction_id)
            .bind(&filing.category)
            .bind(&filing.filing_type)
            .bind(filing.date)
            .bind(&filing.description)
            .bind(filing.paper_filed)
            .bind(&filing.raw)
            .bind(at)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                report.conflicts += 1;
                continue;
            }
            report.filings_added += 1;
            if let Some(alert) = write.alert {
                insert_alert_tx(&mut tx, alert, at).await?;
                report.alerts_created += 1;
            }
        }

        for write in commit.officers {
            let officer = write.officer;
            let inserted = sqlx::query(
                r#"
                INSERT INTO company_officers
                    (id, company_id, tenant_id, officer_id, name, role, appointed_on,
                     resigned_on, nationality, country_of_residence, occupation, raw_payload,
                     created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
                ON CONFLICT (company_id, officer_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(commit.company_id)
            .bind(commit.tenant_id)
            .bind(&officer.officer_id)
            .bind(&officer.name)
            .bind(&officer.role)
            .bind(officer.appointed_on)
            .bind(officer.resigned_on)
            .bind(&officer.nationality)
            .bind(&officer.country_of_residence)
            .bind(&officer.occupation)
            .bind(&officer.raw)
            .bind(at)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                report.conflicts += 1;
                continue;
            }
            report.officers_added += 1;
            if let Some(alert) = write.alert {
                insert_alert_tx(&mut tx, alert, at).await?;
                report.alerts_created += 1;
            }
        }

        for write in commit.resignations {
            let updated = sqlx::query(
                r#"
                UPDATE company_officers
                   SET resigned_on = $3, updated_at = $4
                 WHERE company_id = $1 AND officer_id = $2 AND resigned_on IS NULL
                "#,
            )
            .bind(commit.company_id)
            .bind(&write.officer_id)
            .bind(write.resigned_on)
            .bind(at)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                report.conflicts += 1;
                continue;
            }
            insert_alert_tx(&mut tx, write.alert, at).await?;
            report.resignations += 1;
            report.alerts_created += 1;
        }

        if let Some(due) = commit.filing_due {
            let recent: bool = sqlx::query(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM alerts
                     WHERE company_id = $1 AND alert_type = $2 AND created_at >= $3
                ) AS recent
                "#,
            )
            .bind(commit.company_id)
            .bind(AlertType::FilingDue.as_str())
            .bind(due.dedup_since)
            .fetch_one(&mut *tx)
            .await?
            .try_get("recent")?;

            if recent {
                report.conflicts += 1;
            } else {
                insert_alert_tx(&mut tx, due.alert, at).await?;
                report.alerts_created += 1;
            }
        }

        let snapshot = commit.snapshot;
        let raw_payload: JsonValue = snapshot.raw_payload;
        sqlx::query(
            r#"
            UPDATE companies
               SET name = $2, status = $3, incorporation_date = $4,
                   address_line_1 = $5, address_line_2 = $6, locality = $7, region = $8,
                   postal_code = $9, country = $10, sic_codes = $11, risk_score = $12,
                   raw_payload = $13, last_checked_at = $14, updated_at = $14
             WHERE id = $1
            "#,
        )
        .bind(commit.company_id)
        .bind(&snapshot.name)
        .bind(&snapshot.status)
        .bind(snapshot.incorporation_date)
        .bind(&snapshot.address.address_line_1)
        .bind(&snapshot.address.address_line_2)
        .bind(&snapshot.address.locality)
        .bind(&snapshot.address.region)
        .bind(&snapshot.address.postal_code)
        .bind(&snapshot.address.country)
        .bind(&snapshot.sic_codes)
        .bind(snapshot.risk_score)
        .bind(raw_payload)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        if report.conflicts > 0 {
            warn!(
                company_id = %commit.company_id,
                conflicts = report.conflicts,
                "check overlapped with an earlier commit"
            );
        }
        Ok(report)
    }

    async fn insert_alert(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let mut tx = self.pool.begin().await?;
        let alert = insert_alert_tx(&mut tx, alert, Utc::now()).await?;
        tx.commit().await?;
        Ok(alert)
    }

    async fn list_alerts(
        &self,
        tenant_id: Uuid,
        query: &AlertQuery,
    ) -> Result<Vec<Alert>, StoreError> {
        let sql = format!(
            r#"
            SELECT {ALERT_COLUMNS}
              FROM alerts
             WHERE tenant_id = $1
               AND (NOT $2 OR NOT is_read)
               AND ($3::UUID IS NULL OR company_id = $3)
               AND ($4::TEXT IS NULL OR alert_type = $4)
             ORDER BY created_at DESC
             LIMIT $5
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(query.unread_only)
            .bind(query.company_id)
            .bind(query.alert_type.map(|t| t.as_str()))
            .bind(query.limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(alert_from_row).collect::<sqlx::Result<_>>()?)
    }

    async fn mark_alert_read(&self, tenant_id: Uuid, alert_id: Uuid) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE alerts SET is_read = TRUE WHERE id = $1 AND tenant_id = $2")
                .bind(alert_id)
                .bind(tenant_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_unread(&self, tenant_id: Uuid) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT count(*) AS unread FROM alerts WHERE tenant_id = $1 AND NOT is_read",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("unread")?)
    }

    async fn sweep_alerts(
        &self,
        read_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, StoreError> {
        let mut tx = self.pool.begin().await?;
        let read_expired = sqlx::query("DELETE FROM alerts WHERE is_read AND created_at < $1")
            .bind(read_before)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let past_expiry =
            sqlx::query("DELETE FROM alerts WHERE expires_at IS NOT NULL AND expires_at <= $1")
                .bind(now)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        tx.commit().await?;
        Ok(SweepReport {
            read_expired,
            past_expiry,
        })
    }
}
