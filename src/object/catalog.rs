use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    object::impl_object,
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Room {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

impl_object!(Room, "room");

/// Definition of a recurring chore. Carries no workflow state; trackers are
/// scheduled from it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskTemplate {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub reward: u64,
    pub room_id: Option<Uuid>,
    pub assigned_user_id: Option<Uuid>,
    pub assigned_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl_object!(TaskTemplate, "task_template");

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub reward: u64,
    pub room_id: Option<Uuid>,
    pub assigned_user_id: Option<Uuid>,
}

/// Partial update. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub reward: Option<u64>,
    pub room_id: Option<Option<Uuid>>,
    pub assigned_user_id: Option<Option<Uuid>>,
}

impl TaskTemplate {
    pub fn create(input: NewTemplate, admin: Uuid) -> Result<Self> {
        let name = required_text(&input.name, "template name")?;
        Ok(Self {
            id: Uuid::now_v7(),
            name,
            description: input.description,
            reward: input.reward,
            room_id: input.room_id,
            assigned_user_id: input.assigned_user_id,
            assigned_by_id: Some(admin),
            created_at: Utc::now(),
        })
    }

    pub fn apply(&mut self, update: TemplateUpdate, admin: Uuid) -> Result<()> {
        if let Some(name) = update.name {
            self.name = required_text(&name, "template name")?;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(reward) = update.reward {
            self.reward = reward;
        }
        if let Some(room_id) = update.room_id {
            self.room_id = room_id;
        }
        if let Some(assignee) = update.assigned_user_id {
            // Reassigning makes the editing admin the approver
            if assignee.is_some() {
                self.assigned_by_id = Some(admin);
            }
            self.assigned_user_id = assignee;
        }
        Ok(())
    }
}

/// Something that can be bought in the chore store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoreItem {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub rules: Option<String>,
    pub cost: u64,
    pub active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

impl_object!(StoreItem, "store_item");

#[derive(Debug, Clone, Deserialize)]
pub struct NewStoreItem {
    pub title: String,
    pub description: Option<String>,
    pub rules: Option<String>,
    pub cost: u64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub sort_order: i32,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreItemUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub rules: Option<Option<String>>,
    pub cost: Option<u64>,
    pub active: Option<bool>,
    pub sort_order: Option<i32>,
}

impl StoreItem {
    pub fn create(input: NewStoreItem) -> Result<Self> {
        Ok(Self {
            id: Uuid::now_v7(),
            title: required_text(&input.title, "title")?,
            description: optional_text(input.description),
            rules: optional_text(input.rules),
            cost: input.cost,
            active: input.active,
            sort_order: input.sort_order,
            created_at: Utc::now(),
        })
    }

    pub fn apply(&mut self, update: StoreItemUpdate) -> Result<()> {
        if let Some(title) = update.title {
            self.title = required_text(&title, "title")?;
        }
        if let Some(description) = update.description {
            self.description = optional_text(description);
        }
        if let Some(rules) = update.rules {
            self.rules = optional_text(rules);
        }
        if let Some(cost) = update.cost {
            self.cost = cost;
        }
        if let Some(active) = update.active {
            self.active = active;
        }
        if let Some(sort_order) = update.sort_order {
            self.sort_order = sort_order;
        }
        Ok(())
    }
}

pub(crate) fn required_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
