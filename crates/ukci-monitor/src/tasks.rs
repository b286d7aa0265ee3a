use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    /// Owning tenant; `None` for cross-tenant work such as the scheduled due pass.
    pub tenant_id: Option<Uuid>,
    pub kind: String,
    pub state: TaskState,
    pub summary: Option<JsonValue>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-process registry of triggered tasks, polled by the API.
#[derive(Debug)]
pub struct TaskTracker {
    tasks: RwLock<HashMap<Uuid, TaskRecord>>,
    retention: Duration,
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

impl TaskTracker {
    pub fn new(retention: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            retention,
        }
    }

    pub async fn create(&self, kind: &str, tenant_id: Option<Uuid>) -> TaskRecord {
        let now = Utc::now();
        let record = TaskRecord {
            id: Uuid::new_v4(),
            tenant_id,
            kind: kind.to_string(),
            state: TaskState::Pending,
            summary: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let mut tasks = self.tasks.write().await;
        prune(&mut tasks, now - self.retention);
        tasks.insert(record.id, record.clone());
        record
    }

    pub async fn start(&self, id: Uuid) {
        self.update(id, |r| r.state = TaskState::Running).await;
    }

    pub async fn succeed(&self, id: Uuid, summary: JsonValue) {
        self.update(id, |r| {
            r.state = TaskState::Succeeded;
            r.summary = Some(summary);
        })
        .await;
    }

    pub async fn fail(&self, id: Uuid, error: String) {
        self.update(id, |r| {
            r.state = TaskState::Failed;
            r.error = Some(error);
        })
        .await;
    }

    pub async fn get(&self, id: Uuid) -> Option<TaskRecord> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// Only returns tasks the tenant triggered.
    pub async fn get_for_tenant(&self, tenant_id: Uuid, id: Uuid) -> Option<TaskRecord> {
        self.tasks
            .read()
            .await
            .get(&id)
            .filter(|r| r.tenant_id == Some(tenant_id))
            .cloned()
    }

    pub async fn prune_finished(&self, now: DateTime<Utc>) -> usize {
        let mut tasks = self.tasks.write().await;
        prune(&mut tasks, now - self.retention)
    }

    async fn update(&self, id: Uuid, apply: impl FnOnce(&mut TaskRecord)) {
        if let Some(record) = self.tasks.write().await.get_mut(&id) {
            apply(record);
            record.updated_at = Utc::now();
        }
    }
}

fn prune(tasks: &mut HashMap<Uuid, TaskRecord>, before: DateTime<Utc>) -> usize {
    let len = tasks.len();
    tasks.retain(|_, r| !(r.state.is_finished() && r.updated_at < before));
    len - tasks.len()
}
