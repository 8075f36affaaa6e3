use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Last-updated stamp carried by records that move through a workflow.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Audit {
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<Uuid>,
}

impl Audit {
    pub fn stamp(&mut self, actor: Uuid, at: DateTime<Utc>) {
        self.updated_at = Some(at);
        self.updated_by = Some(actor);
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn updated_by(&self) -> Option<Uuid> {
        self.updated_by
    }
}
