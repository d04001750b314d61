use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::access::InventoryAccess;
use crate::autosave::{GeneralGroup, VisibilityGroup};
use crate::custom_fields::CustomFieldSet;
use crate::custom_id::CustomIdTemplate;
use crate::proto::common::InventorySummary;
use crate::proto::inventory::GroupVersions;

#[derive(Debug, Clone, FromRow)]
pub struct InventoryModel {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category_id: i32,
    pub category_name: String,
    pub image_url: Option<String>,
    pub is_public: bool,
    pub owner_id: Option<Uuid>,
    pub custom_fields: Json<CustomFieldSet>,
    pub custom_id_elements: Json<CustomIdTemplate>,
    pub general_version: i32,
    pub visibility_version: i32,
    pub custom_fields_version: i32,
    pub custom_id_version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryModel {
    /// Select list for `inventories i JOIN categories c`.
    pub const SELECT: &'static str = "SELECT i.id, i.title, i.description, i.category_id,
            c.name AS category_name, i.image_url, i.is_public, i.owner_id,
            i.custom_fields, i.custom_id_elements,
            i.general_version, i.visibility_version, i.custom_fields_version, i.custom_id_version,
            i.created_at, i.updated_at
         FROM inventories i
         JOIN categories c ON c.id = i.category_id";

    pub fn general(&self) -> GeneralGroup {
        GeneralGroup {
            title: self.title.clone(),
            description: self.description.clone(),
            category_id: self.category_id,
            image_url: self.image_url.clone(),
        }
    }

    pub fn visibility(&self, allowed_user_ids: Vec<Uuid>) -> VisibilityGroup {
        VisibilityGroup::new(self.is_public, allowed_user_ids)
    }

    pub fn access(&self, allowed_user_ids: Vec<Uuid>) -> InventoryAccess {
        InventoryAccess {
            owner_id: self.owner_id,
            is_public: self.is_public,
            allowed_user_ids,
        }
    }

    pub fn versions(&self) -> GroupVersions {
        GroupVersions {
            general: self.general_version,
            visibility: self.visibility_version,
            custom_fields: self.custom_fields_version,
            custom_id: self.custom_id_version,
        }
    }
}

/// Row shape of inventory listings.
#[derive(Debug, Clone, FromRow)]
pub struct InventorySummaryRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub owner_id: Option<Uuid>,
    pub category: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

impl InventorySummaryRow {
    pub const SELECT: &'static str = "SELECT i.id, i.title, i.description, i.image_url, i.owner_id,
            c.name AS category, i.is_public, i.created_at
         FROM inventories i
         JOIN categories c ON c.id = i.category_id";
}

impl From<InventorySummaryRow> for InventorySummary {
    fn from(r: InventorySummaryRow) -> Self {
        InventorySummary {
            id: r.id.to_string(),
            title: r.title,
            description: r.description,
            image_url: r.image_url.unwrap_or_default(),
            owner_id: r.owner_id.map(|id| id.to_string()).unwrap_or_default(),
            category: r.category,
            is_public: r.is_public,
            created_at: r.created_at.to_rfc3339(),
        }
    }
}
