use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::access::{can_create_item, can_edit_item, InventoryAccess};
use crate::autosave::{merge_group, AutosaveOutcome, GroupEdit, ItemFieldsGroup};
use crate::custom_fields::{CustomFieldSet, ItemFieldValues};
use crate::custom_id::{sequence, CustomIdTemplate, GenerationContext};
use crate::error::{parse_uuid, AppError, AppResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{ItemModel, ItemSummaryRow};
use crate::proto::common::Empty;
use crate::proto::items::item_service_server::ItemService;
use crate::proto::items::{
    AutosaveItemRequest, AutosaveItemResponse, CreateItemRequest, Item, ItemIdRequest,
    ItemResponse, ListItemsRequest, ListItemsResponse, ToggleLikeResponse, UpdateItemRequest,
};

/// Message returned when a whole-record update was read at an older version.
pub fn version_conflict_message(yours: i32, current: i32) -> String {
    format!(
        "The item was changed by someone else. Your version {}, current version {}.",
        yours, current
    )
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    owner_id: Option<Uuid>,
    is_public: bool,
    custom_fields: Json<CustomFieldSet>,
    custom_id_elements: Json<CustomIdTemplate>,
}

pub struct ItemServiceImpl {
    pool: PgPool,
}

impl ItemServiceImpl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn get_authenticated_user<T>(request: &Request<T>) -> Result<AuthenticatedUser, Status> {
        request
            .extensions()
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| Status::unauthenticated("Authentication required"))
    }

    async fn load_inventory(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<InventoryRow> {
        let sql = format!(
            "SELECT owner_id, is_public, custom_fields, custom_id_elements FROM inventories WHERE id = $1{}",
            if lock { " FOR UPDATE" } else { "" }
        );
        sqlx::query_as::<_, InventoryRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Inventory {} not found", id)))
    }

    async fn load_item(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<ItemModel> {
        let sql = format!(
            "{} WHERE it.id = $1{}",
            ItemModel::SELECT,
            if lock { " FOR UPDATE OF it" } else { "" }
        );
        sqlx::query_as::<_, ItemModel>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))
    }

    async fn to_proto(
        conn: &mut PgConnection,
        item: ItemModel,
        viewer: Option<&AuthenticatedUser>,
    ) -> AppResult<Item> {
        let (like_count, liked_by_me): (i64, bool) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(BOOL_OR(user_id = $2), FALSE) FROM item_likes WHERE item_id = $1",
        )
        .bind(item.id)
        .bind(viewer.map(|u| u.user_id))
        .fetch_one(&mut *conn)
        .await?;

        Ok(Item {
            id: item.id.to_string(),
            inventory_id: item.inventory_id.to_string(),
            inventory_title: item.inventory_title,
            owner_id: item.owner_id.map(|id| id.to_string()).unwrap_or_default(),
            custom_id: item.custom_id,
            values: Some(item.values.into()),
            version: item.version,
            like_count: like_count.try_into().unwrap_or(i32::MAX),
            liked_by_me,
            can_edit: viewer.map(|u| can_edit_item(u, item.owner_id)).unwrap_or(false),
            created_at: item.created_at.to_rfc3339(),
            updated_at: item.updated_at.to_rfc3339(),
        })
    }

    async fn write_values(conn: &mut PgConnection, id: Uuid, values: &ItemFieldValues) -> AppResult<i32> {
        Ok(sqlx::query_scalar(
            "UPDATE items SET
                single_line1 = $2, single_line2 = $3, single_line3 = $4,
                multi_line1 = $5, multi_line2 = $6, multi_line3 = $7,
                numeric_line1 = $8, numeric_line2 = $9, numeric_line3 = $10,
                bool_line1 = $11, bool_line2 = $12, bool_line3 = $13,
                version = version + 1, updated_at = NOW()
             WHERE id = $1
             RETURNING version",
        )
        .bind(id)
        .bind(&values.single_line1)
        .bind(&values.single_line2)
        .bind(&values.single_line3)
        .bind(&values.multi_line1)
        .bind(&values.multi_line2)
        .bind(&values.multi_line3)
        .bind(values.numeric_line1)
        .bind(values.numeric_line2)
        .bind(values.numeric_line3)
        .bind(values.bool_line1)
        .bind(values.bool_line2)
        .bind(values.bool_line3)
        .fetch_one(&mut *conn)
        .await?)
    }

    async fn create(&self, user: &AuthenticatedUser, req: CreateItemRequest) -> AppResult<Item> {
        let inventory_id = parse_uuid(&req.inventory_id, "inventory id")?;
        let values = ItemFieldValues::from(req.values.unwrap_or_default()).normalized();

        let mut tx = self.pool.begin().await?;

        // The row lock serialises sequence allocation per inventory.
        let inventory = Self::load_inventory(&mut tx, inventory_id, true).await?;
        let allowed_user_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM inventory_allowed_users WHERE inventory_id = $1")
                .bind(inventory_id)
                .fetch_all(&mut *tx)
                .await?;
        let access = InventoryAccess {
            owner_id: inventory.owner_id,
            is_public: inventory.is_public,
            allowed_user_ids,
        };
        if !can_create_item(user, &access) {
            return Err(AppError::PermissionDenied(
                "You do not have write access to this inventory".to_string(),
            ));
        }

        values.validate_against(&inventory.custom_fields.0)?;

        let template = inventory.custom_id_elements.0;
        let mut ctx = GenerationContext::now();
        if let Some(pattern) = template.sequence_pattern()? {
            let existing: Vec<String> = sqlx::query_scalar("SELECT custom_id FROM items WHERE inventory_id = $1")
                .bind(inventory_id)
                .fetch_all(&mut *tx)
                .await?;
            ctx = ctx.with_sequence(sequence::next_value(&pattern, existing.iter().map(String::as_str)));
        }
        let custom_id = template.generate(&mut StdRng::from_entropy(), &ctx);

        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO items (
                inventory_id, owner_id, custom_id,
                single_line1, single_line2, single_line3,
                multi_line1, multi_line2, multi_line3,
                numeric_line1, numeric_line2, numeric_line3,
                bool_line1, bool_line2, bool_line3)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             RETURNING id",
        )
        .bind(inventory_id)
        .bind(user.user_id)
        .bind(&custom_id)
        .bind(&values.single_line1)
        .bind(&values.single_line2)
        .bind(&values.single_line3)
        .bind(&values.multi_line1)
        .bind(&values.multi_line2)
        .bind(&values.multi_line3)
        .bind(values.numeric_line1)
        .bind(values.numeric_line2)
        .bind(values.numeric_line3)
        .bind(values.bool_line1)
        .bind(values.bool_line2)
        .bind(values.bool_line3)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::AlreadyExists(_) => AppError::AlreadyExists(format!(
                "An item with ID {} already exists in this inventory",
                custom_id
            )),
            other => other,
        })?;

        let item = Self::load_item(&mut tx, id, false).await?;
        let item = Self::to_proto(&mut tx, item, Some(user)).await?;
        tx.commit().await?;

        tracing::info!("User {} created item {} ({})", user.user_id, id, item.custom_id);
        Ok(item)
    }

    async fn update(&self, user: &AuthenticatedUser, req: UpdateItemRequest) -> AppResult<Item> {
        let id = parse_uuid(&req.id, "item id")?;
        let values = ItemFieldValues::from(req.values.unwrap_or_default()).normalized();

        let mut tx = self.pool.begin().await?;
        let item = Self::load_item(&mut tx, id, true).await?;
        if !can_edit_item(user, item.owner_id) {
            return Err(AppError::PermissionDenied(
                "Only the item owner or an administrator can edit this item".to_string(),
            ));
        }
        if item.version != req.version {
            return Err(AppError::Conflict(version_conflict_message(req.version, item.version)));
        }

        let inventory = Self::load_inventory(&mut tx, item.inventory_id, false).await?;
        values.validate_against(&inventory.custom_fields.0)?;

        Self::write_values(&mut tx, id, &values).await?;
        let item = Self::load_item(&mut tx, id, false).await?;
        let item = Self::to_proto(&mut tx, item, Some(user)).await?;
        tx.commit().await?;
        Ok(item)
    }

    async fn autosave(&self, user: &AuthenticatedUser, req: AutosaveItemRequest) -> AppResult<AutosaveItemResponse> {
        let id = parse_uuid(&req.id, "item id")?;

        let mut tx = self.pool.begin().await?;
        let item = Self::load_item(&mut tx, id, true).await?;
        if !can_edit_item(user, item.owner_id) {
            return Err(AppError::PermissionDenied(
                "Only the item owner or an administrator can edit this item".to_string(),
            ));
        }

        let mut outcome = AutosaveOutcome::default();
        let mut version = item.version;

        if req.changed_groups.iter().any(|g| ItemFieldsGroup::matches_name(g)) {
            let merge = merge_group(
                &ItemFieldsGroup(item.values.clone()),
                item.version,
                GroupEdit {
                    version: req.version,
                    original: req.original.map(|v| ItemFieldsGroup(v.into())),
                    changes: ItemFieldsGroup(ItemFieldValues::from(req.changes.unwrap_or_default()).normalized()),
                },
            );
            if let Some(ItemFieldsGroup(values)) = outcome.record(merge) {
                let inventory = Self::load_inventory(&mut tx, item.inventory_id, false).await?;
                values.validate_against(&inventory.custom_fields.0)?;
                version = Self::write_values(&mut tx, id, &values).await?;
            }
        }

        tx.commit().await?;

        Ok(AutosaveItemResponse {
            ok: outcome.ok(),
            version,
            applied_groups: outcome.applied_names(),
            conflicts: outcome.conflicts_pb(),
        })
    }
}

#[tonic::async_trait]
impl ItemService for ItemServiceImpl {
    async fn create_item(
        &self,
        request: Request<CreateItemRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let item = self.create(&auth_user, request.into_inner()).await?;
        Ok(Response::new(ItemResponse { item: Some(item) }))
    }

    async fn get_item(
        &self,
        request: Request<ItemIdRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let viewer = request.extensions().get::<AuthenticatedUser>().cloned();
        let id = parse_uuid(&request.into_inner().id, "item id")?;

        let mut conn = self.pool.acquire().await.map_err(AppError::from)?;
        let item = Self::load_item(&mut conn, id, false).await?;
        let item = Self::to_proto(&mut conn, item, viewer.as_ref()).await?;
        Ok(Response::new(ItemResponse { item: Some(item) }))
    }

    async fn list_items(
        &self,
        request: Request<ListItemsRequest>,
    ) -> Result<Response<ListItemsResponse>, Status> {
        let req = request.into_inner();
        let inventory_id = if req.inventory_id.trim().is_empty() {
            None
        } else {
            Some(parse_uuid(&req.inventory_id, "inventory id")?)
        };

        let sql = format!(
            "{} WHERE ($1::uuid IS NULL OR it.inventory_id = $1) ORDER BY it.created_at DESC",
            ItemSummaryRow::SELECT
        );
        let rows: Vec<ItemSummaryRow> = sqlx::query_as(&sql)
            .bind(inventory_id)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(Response::new(ListItemsResponse {
            items: rows.into_iter().map(Into::into).collect(),
        }))
    }

    async fn update_item(
        &self,
        request: Request<UpdateItemRequest>,
    ) -> Result<Response<ItemResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let item = self.update(&auth_user, request.into_inner()).await?;
        Ok(Response::new(ItemResponse { item: Some(item) }))
    }

    async fn autosave_item(
        &self,
        request: Request<AutosaveItemRequest>,
    ) -> Result<Response<AutosaveItemResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let response = self.autosave(&auth_user, request.into_inner()).await?;
        Ok(Response::new(response))
    }

    async fn toggle_like(
        &self,
        request: Request<ItemIdRequest>,
    ) -> Result<Response<ToggleLikeResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let id = parse_uuid(&request.into_inner().id, "item id")?;

        let mut tx = self.pool.begin().await.map_err(AppError::from)?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM items WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::from)?;
        if !exists {
            return Err(Status::not_found(format!("Item {} not found", id)));
        }

        let removed = sqlx::query("DELETE FROM item_likes WHERE item_id = $1 AND user_id = $2")
            .bind(id)
            .bind(auth_user.user_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?
            .rows_affected();
        if removed == 0 {
            sqlx::query("INSERT INTO item_likes (item_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(id)
                .bind(auth_user.user_id)
                .execute(&mut *tx)
                .await
                .map_err(AppError::from)?;
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item_likes WHERE item_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(AppError::from)?;
        tx.commit().await.map_err(AppError::from)?;

        Ok(Response::new(ToggleLikeResponse {
            liked: removed == 0,
            count: count.try_into().unwrap_or(i32::MAX),
        }))
    }

    async fn delete_item(
        &self,
        request: Request<ItemIdRequest>,
    ) -> Result<Response<Empty>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let id = parse_uuid(&request.into_inner().id, "item id")?;

        let owner: Option<Option<Uuid>> = sqlx::query_scalar("SELECT owner_id FROM items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        let owner_id = owner.ok_or_else(|| Status::not_found(format!("Item {} not found", id)))?;
        if !can_edit_item(&auth_user, owner_id) {
            return Err(Status::permission_denied(
                "Only the item owner or an administrator can delete this item",
            ));
        }

        sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(Response::new(Empty {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_both_versions() {
        assert_eq!(
            version_conflict_message(3, 5),
            "The item was changed by someone else. Your version 3, current version 5."
        );
    }
}
