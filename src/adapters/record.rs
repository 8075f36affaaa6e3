use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    object::Object,
};

/// Storage form of a domain object: its JSON body plus the columns adapters
/// index on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub id: Uuid,
    pub type_name: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ObjectRecord {
    pub fn to_object<T: Object>(self) -> Result<T> {
        if self.type_name != T::TYPE {
            return Err(Error::Serialize(format!(
                "expected {} record, found {}",
                T::TYPE,
                self.type_name
            )));
        }

        Ok(serde_json::from_value::<T>(self.data)?)
    }

    pub fn from_object<T: Object>(obj: &T, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id: obj.id(),
            type_name: obj.type_name().to_string(),
            data: serde_json::to_value(obj)?,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Equality on one top-level field of the JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: &'static str,
    pub value: FilterValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Flag(bool),
}

impl Filter {
    pub fn text(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: FilterValue::Text(value.into()),
        }
    }

    pub fn uuid(field: &'static str, id: Uuid) -> Self {
        Self::text(field, id.to_string())
    }

    pub fn flag(field: &'static str, value: bool) -> Self {
        Self {
            field,
            value: FilterValue::Flag(value),
        }
    }

    pub fn matches(&self, data: &serde_json::Value) -> bool {
        match (&self.value, data.get(self.field)) {
            (FilterValue::Text(expected), Some(serde_json::Value::String(actual))) => {
                expected == actual
            }
            (FilterValue::Flag(expected), Some(serde_json::Value::Bool(actual))) => {
                expected == actual
            }
            _ => false,
        }
    }

    /// `$.field`, for `json_extract`.
    pub fn json_path(&self) -> String {
        format!("$.{}", self.field)
    }
}
