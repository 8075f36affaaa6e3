use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{authz::Actor, object::impl_object};

/// Identity is managed elsewhere; this record only carries what the workflow
/// needs: a display name for ledger denormalization and the admin flag for
/// notification fan-out.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: impl Into<String>, is_admin: bool) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            is_admin,
            created_at: Utc::now(),
        }
    }

    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.is_admin)
    }
}

impl_object!(User, "user");
