use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::custom_fields::ItemFieldValues;
use crate::proto::common::ItemSummary;

#[derive(Debug, Clone, FromRow)]
pub struct ItemModel {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub inventory_title: String,
    pub owner_id: Option<Uuid>,
    pub custom_id: String,
    #[sqlx(flatten)]
    pub values: ItemFieldValues,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ItemModel {
    pub const SELECT: &'static str = "SELECT it.id, it.inventory_id, inv.title AS inventory_title,
            it.owner_id, it.custom_id,
            it.single_line1, it.single_line2, it.single_line3,
            it.multi_line1, it.multi_line2, it.multi_line3,
            it.numeric_line1, it.numeric_line2, it.numeric_line3,
            it.bool_line1, it.bool_line2, it.bool_line3,
            it.version, it.created_at, it.updated_at
         FROM items it
         JOIN inventories inv ON inv.id = it.inventory_id";
}

#[derive(Debug, Clone, FromRow)]
pub struct ItemSummaryRow {
    pub id: Uuid,
    pub inventory_id: Uuid,
    pub inventory_title: String,
    pub custom_id: String,
    pub owner_id: Option<Uuid>,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
}

impl ItemSummaryRow {
    pub const SELECT: &'static str = "SELECT it.id, it.inventory_id, inv.title AS inventory_title,
            it.custom_id, it.owner_id,
            (SELECT COUNT(*) FROM item_likes l WHERE l.item_id = it.id) AS like_count,
            it.created_at
         FROM items it
         JOIN inventories inv ON inv.id = it.inventory_id";
}

impl From<ItemSummaryRow> for ItemSummary {
    fn from(r: ItemSummaryRow) -> Self {
        ItemSummary {
            id: r.id.to_string(),
            inventory_id: r.inventory_id.to_string(),
            inventory_title: r.inventory_title,
            custom_id: r.custom_id,
            owner_id: r.owner_id.map(|id| id.to_string()).unwrap_or_default(),
            like_count: r.like_count.try_into().unwrap_or(i32::MAX),
            created_at: r.created_at.to_rfc3339(),
        }
    }
}
