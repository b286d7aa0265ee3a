use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use ukci_store::{AlertQuery, MonitorStore, StoreError, SweepReport};
use uuid::Uuid;

use crate::config::MonitorPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantDigest {
    pub tenant_id: Uuid,
    pub tenant_name: String,
    pub unread: i64,
    pub latest_titles: Vec<String>,
}

/// Periodic alert housekeeping.
pub struct AlertSweeper {
    store: Arc<dyn MonitorStore>,
    retention: Duration,
}

impl AlertSweeper {
    pub fn new(store: Arc<dyn MonitorStore>, policy: &MonitorPolicy) -> Self {
        Self {
            store,
            retention: policy.alert_retention(),
        }
    }

    /// Removes read alerts past retention and any alert past its own expiry.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let report = self.store.sweep_alerts(now - self.retention, now).await?;
        info!(
            read_expired = report.read_expired,
            past_expiry = report.past_expiry,
            "alert sweep finished"
        );
        Ok(report)
    }

    /// Logs an unread-alert summary per active tenant. Nothing is sent anywhere.
    pub async fn unread_digest(&self) -> Result<Vec<TenantDigest>, StoreError> {
        let query = AlertQuery {
            unread_only: true,
            limit: 5,
            ..Default::default()
        };
        let mut digests = Vec::new();
        for tenant in self.store.list_active_tenants().await? {
            let unread = self.store.count_unread(tenant.id).await?;
            if unread == 0 {
                continue;
            }
            let latest_titles = self
                .store
                .list_alerts(tenant.id, &query)
                .await?
                .into_iter()
                .map(|a| a.title)
                .collect::<Vec<_>>();
            info!(
                tenant_id = %tenant.id,
                tenant = %tenant.name,
                unread,
                latest = ?latest_titles,
                "unread alert digest"
            );
            digests.push(TenantDigest {
                tenant_id: tenant.id,
                tenant_name: tenant.name,
                unread,
                latest_titles,
            });
        }
        Ok(digests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ukci_core::{AlertType, NewAlert, NewTenant, Severity, SubscriptionTier};
    use ukci_store::MemoryStore;

    fn alert(tenant_id: Uuid, title: &str) -> NewAlert {
        NewAlert {
            tenant_id,
            company_id: None,
            alert_type: AlertType::MonitoringStarted,
            title: title.into(),
            description: String::new(),
            severity: Severity::Low,
            payload: json!({}),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn sweep_keeps_unread_and_recent_alerts() {
        let store = Arc::new(MemoryStore::new());
        let tenant = store
            .create_tenant(NewTenant {
                name: "Acme".into(),
                subscription_tier: SubscriptionTier::Free,
            })
            .await
            .expect("tenant");
        let read = store.insert_alert(alert(tenant.id, "read")).await.expect("a");
        store.insert_alert(alert(tenant.id, "unread")).await.expect("b");
        store.mark_alert_read(tenant.id, read.id).await.expect("mark");

        let sweeper = AlertSweeper::new(store.clone(), &MonitorPolicy::default());
        let now = Utc::now();
        assert_eq!(sweeper.sweep(now).await.expect("sweep"), SweepReport::default());

        let report = sweeper.sweep(now + Duration::days(31)).await.expect("sweep");
        assert_eq!(report.read_expired, 1);
        assert_eq!(store.count_unread(tenant.id).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn digest_skips_tenants_without_unread_alerts() {
        let store = Arc::new(MemoryStore::new());
        let busy = store
            .create_tenant(NewTenant {
                name: "Busy".into(),
                subscription_tier: SubscriptionTier::Free,
            })
            .await
            .expect("tenant");
        store
            .create_tenant(NewTenant {
                name: "Quiet".into(),
                subscription_tier: SubscriptionTier::Free,
            })
            .await
            .expect("tenant");
        store.insert_alert(alert(busy.id, "first")).await.expect("a");

        let sweeper = AlertSweeper::new(store, &MonitorPolicy::default());
        let digests = sweeper.unread_digest().await.expect("digest");
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].tenant_name, "Busy");
        assert_eq!(digests[0].latest_titles, vec!["first".to_string()]);
    }
}
