use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::object::impl_object;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub message: String,
    pub link: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl_object!(Notification, "notification");

impl Notification {
    pub fn new(user_id: Uuid, message: impl Into<String>, link: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            message: message.into(),
            link,
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn mark_read(&self) -> Self {
        Self {
            read: true,
            ..self.clone()
        }
    }
}
