use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::access::{can_edit_inventory, InventoryAccess};
use crate::autosave::{merge_group, AutosaveOutcome, GeneralGroup, GroupEdit, VisibilityGroup};
use crate::custom_fields::CustomFieldSet;
use crate::custom_id::{CustomIdTemplate, ElementInput, GenerationContext};
use crate::db::tags::{attach_tag, normalize_tag, tags_for_inventory};
use crate::error::{parse_uuid, parse_uuids, AppError, AppResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{CategoryModel, InventoryModel, InventorySummaryRow, UserModel};
use crate::proto::common::{self as pb, Empty};
use crate::proto::inventory::inventory_service_server::InventoryService;
use crate::proto::inventory::{
    AddTagRequest, AutosaveInventoryRequest, AutosaveInventoryResponse, Category,
    CreateInventoryRequest, CustomIdGroup, Inventory, InventoryIdRequest, InventoryResponse,
    ListCategoriesResponse, ListInventoriesResponse, PreviewCustomIdRequest,
    PreviewCustomIdResponse,
};

impl From<pb::CustomIdElement> for ElementInput {
    fn from(e: pb::CustomIdElement) -> Self {
        ElementInput {
            element_type: e.r#type,
            separator_before: e.separator_before,
            separator_after: e.separator_after,
            fixed_text: e.fixed_text,
            date_time_format: e.date_time_format,
            padding_char: e.padding_char,
            radix: e.radix,
            position: e.position,
            width: e.width,
        }
    }
}

impl From<ElementInput> for pb::CustomIdElement {
    fn from(e: ElementInput) -> Self {
        pb::CustomIdElement {
            r#type: e.element_type,
            separator_before: e.separator_before,
            separator_after: e.separator_after,
            fixed_text: e.fixed_text,
            date_time_format: e.date_time_format,
            padding_char: e.padding_char,
            radix: e.radix,
            position: e.position,
            width: e.width,
        }
    }
}

fn template_from_proto(elements: Vec<pb::CustomIdElement>) -> CustomIdTemplate {
    CustomIdTemplate::from_inputs(elements.into_iter().map(ElementInput::from))
}

fn template_to_proto(template: &CustomIdTemplate) -> Vec<pb::CustomIdElement> {
    template
        .elements
        .iter()
        .map(|e| ElementInput::from_element(e).into())
        .collect()
}

fn general_from_proto(g: crate::proto::inventory::GeneralGroup) -> GeneralGroup {
    GeneralGroup {
        title: g.title.trim().to_string(),
        description: g.description.trim().to_string(),
        category_id: g.category_id,
        image_url: Some(g.image_url.trim().to_string()).filter(|s| !s.is_empty()),
    }
}

fn visibility_from_proto(v: crate::proto::inventory::VisibilityGroup) -> AppResult<VisibilityGroup> {
    let ids = parse_uuids(&v.allowed_user_ids, "user id")?;
    Ok(VisibilityGroup::new(v.is_public, ids))
}

fn custom_id_group(g: Option<CustomIdGroup>) -> CustomIdTemplate {
    template_from_proto(g.map(|g| g.elements).unwrap_or_default())
}

pub struct InventoryServiceImpl {
    pool: PgPool,
}

impl InventoryServiceImpl {
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

    async fn validate_general(conn: &mut PgConnection, general: &GeneralGroup) -> AppResult<()> {
        if general.title.is_empty() {
            return Err(AppError::InvalidInput("Title is required".to_string()));
        }
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM categories WHERE id = $1)")
            .bind(general.category_id)
            .fetch_one(&mut *conn)
            .await?;
        if !exists {
            return Err(AppError::InvalidInput("Select a valid category.".to_string()));
        }
        Ok(())
    }

    async fn load_model(conn: &mut PgConnection, id: Uuid, lock: bool) -> AppResult<InventoryModel> {
        let sql = format!(
            "{} WHERE i.id = $1{}",
            InventoryModel::SELECT,
            if lock { " FOR UPDATE OF i" } else { "" }
        );
        sqlx::query_as::<_, InventoryModel>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Inventory {} not found", id)))
    }

    async fn allowed_users(conn: &mut PgConnection, id: Uuid) -> AppResult<Vec<UserModel>> {
        let sql = format!(
            "SELECT {} FROM users u
             JOIN inventory_allowed_users a ON a.user_id = u.id
             WHERE a.inventory_id = $1
             ORDER BY u.sequential_id",
            UserModel::COLUMNS
                .split(", ")
                .map(|c| format!("u.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(sqlx::query_as(&sql).bind(id).fetch_all(&mut *conn).await?)
    }

    async fn allowed_user_ids(conn: &mut PgConnection, id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(
            sqlx::query_scalar("SELECT user_id FROM inventory_allowed_users WHERE inventory_id = $1")
                .bind(id)
                .fetch_all(&mut *conn)
                .await?,
        )
    }

    /// Replaces the allowed-user list. Public inventories keep none; unknown ids are dropped.
    async fn replace_allowed_users(
        conn: &mut PgConnection,
        id: Uuid,
        visibility: &VisibilityGroup,
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM inventory_allowed_users WHERE inventory_id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        if !visibility.is_public && !visibility.allowed_user_ids().is_empty() {
            sqlx::query(
                "INSERT INTO inventory_allowed_users (inventory_id, user_id)
                 SELECT $1, u.id FROM users u WHERE u.id = ANY($2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(id)
            .bind(visibility.allowed_user_ids())
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn load_inventory(conn: &mut PgConnection, id: Uuid) -> AppResult<Inventory> {
        let model = Self::load_model(conn, id, false).await?;
        let allowed = Self::allowed_users(conn, id).await?;
        let tags = tags_for_inventory(conn, id).await?;
        let item_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE inventory_id = $1")
            .bind(id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(Inventory {
            id: model.id.to_string(),
            title: model.title.clone(),
            description: model.description.clone(),
            category: Some(Category {
                id: model.category_id,
                name: model.category_name.clone(),
            }),
            image_url: model.image_url.clone().unwrap_or_default(),
            is_public: model.is_public,
            allowed_users: allowed.into_iter().map(Into::into).collect(),
            owner_id: model.owner_id.map(|id| id.to_string()).unwrap_or_default(),
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
            custom_fields: Some((&model.custom_fields.0).into()),
            custom_id_elements: template_to_proto(&model.custom_id_elements.0),
            tags,
            versions: Some(model.versions()),
            item_count: item_count.try_into().unwrap_or(i32::MAX),
        })
    }

    async fn create(&self, user: &AuthenticatedUser, req: CreateInventoryRequest) -> AppResult<Inventory> {
        let general = general_from_proto(crate::proto::inventory::GeneralGroup {
            title: req.title,
            description: req.description,
            category_id: req.category_id,
            image_url: req.image_url,
        });
        let visibility = VisibilityGroup::new(
            req.is_public,
            parse_uuids(&req.allowed_user_ids, "user id")?,
        );
        let fields = CustomFieldSet::from(req.custom_fields.unwrap_or_default());
        fields.validate()?;
        let template = template_from_proto(req.custom_id_elements);

        let mut tx = self.pool.begin().await?;
        Self::validate_general(&mut tx, &general).await?;

        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO inventories
                (title, description, category_id, image_url, is_public, owner_id, custom_fields, custom_id_elements)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
        )
        .bind(&general.title)
        .bind(&general.description)
        .bind(general.category_id)
        .bind(&general.image_url)
        .bind(visibility.is_public)
        .bind(user.user_id)
        .bind(Json(&fields))
        .bind(Json(&template))
        .fetch_one(&mut *tx)
        .await?;

        Self::replace_allowed_users(&mut tx, id, &visibility).await?;
        let inventory = Self::load_inventory(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!("User {} created inventory {}", user.user_id, id);
        Ok(inventory)
    }

    async fn autosave(
        &self,
        user: &AuthenticatedUser,
        req: AutosaveInventoryRequest,
    ) -> AppResult<AutosaveInventoryResponse> {
        let id = parse_uuid(&req.id, "inventory id")?;
        let mut tx = self.pool.begin().await?;

        let model = Self::load_model(&mut tx, id, true).await?;
        let allowed_ids = Self::allowed_user_ids(&mut tx, id).await?;
        if !can_edit_inventory(user, &model.access(allowed_ids.clone())) {
            return Err(AppError::PermissionDenied(
                "Only the owner or an administrator can edit this inventory".to_string(),
            ));
        }

        let mut outcome = AutosaveOutcome::default();
        let mut versions = model.versions();

        if let Some(edit) = req.general {
            let merge = merge_group(
                &model.general(),
                model.general_version,
                GroupEdit {
                    version: edit.version,
                    original: edit.original.map(general_from_proto),
                    changes: general_from_proto(edit.changes.unwrap_or_default()),
                },
            );
            if let Some(general) = outcome.record(merge) {
                Self::validate_general(&mut tx, &general).await?;
                versions.general = sqlx::query_scalar(
                    "UPDATE inventories
                     SET title = $2, description = $3, category_id = $4, image_url = $5,
                         general_version = general_version + 1, updated_at = NOW()
                     WHERE id = $1
                     RETURNING general_version",
                )
                .bind(id)
                .bind(&general.title)
                .bind(&general.description)
                .bind(general.category_id)
                .bind(&general.image_url)
                .fetch_one(&mut *tx)
                .await?;
            }
        }

        if let Some(edit) = req.visibility {
            let original = edit.original.map(visibility_from_proto).transpose()?;
            let changes = visibility_from_proto(edit.changes.unwrap_or_default())?;
            let merge = merge_group(
                &model.visibility(allowed_ids),
                model.visibility_version,
                GroupEdit {
                    version: edit.version,
                    original,
                    changes,
                },
            );
            if let Some(visibility) = outcome.record(merge) {
                versions.visibility = sqlx::query_scalar(
                    "UPDATE inventories
                     SET is_public = $2, visibility_version = visibility_version + 1, updated_at = NOW()
                     WHERE id = $1
                     RETURNING visibility_version",
                )
                .bind(id)
                .bind(visibility.is_public)
                .fetch_one(&mut *tx)
                .await?;
                Self::replace_allowed_users(&mut tx, id, &visibility).await?;
            }
        }

        if let Some(edit) = req.custom_fields {
            let merge = merge_group(
                &model.custom_fields.0,
                model.custom_fields_version,
                GroupEdit {
                    version: edit.version,
                    original: edit.original.map(CustomFieldSet::from),
                    changes: CustomFieldSet::from(edit.changes.unwrap_or_default()),
                },
            );
            if let Some(fields) = outcome.record(merge) {
                fields.validate()?;
                versions.custom_fields = sqlx::query_scalar(
                    "UPDATE inventories
                     SET custom_fields = $2, custom_fields_version = custom_fields_version + 1, updated_at = NOW()
                     WHERE id = $1
                     RETURNING custom_fields_version",
                )
                .bind(id)
                .bind(Json(&fields))
                .fetch_one(&mut *tx)
                .await?;
            }
        }

        if let Some(edit) = req.custom_id {
            let merge = merge_group(
                &model.custom_id_elements.0,
                model.custom_id_version,
                GroupEdit {
                    version: edit.version,
                    original: edit.original.map(|g| custom_id_group(Some(g))),
                    changes: custom_id_group(edit.changes),
                },
            );
            if let Some(template) = outcome.record(merge) {
                versions.custom_id = sqlx::query_scalar(
                    "UPDATE inventories
                     SET custom_id_elements = $2, custom_id_version = custom_id_version + 1, updated_at = NOW()
                     WHERE id = $1
                     RETURNING custom_id_version",
                )
                .bind(id)
                .bind(Json(&template))
                .fetch_one(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        if !outcome.ok() {
            tracing::info!(
                "Autosave of inventory {} by {} hit {} conflict(s)",
                id,
                user.user_id,
                outcome.conflicts.len()
            );
        }

        Ok(AutosaveInventoryResponse {
            ok: outcome.ok(),
            versions: Some(versions),
            applied_groups: outcome.applied_names(),
            conflicts: outcome.conflicts_pb(),
        })
    }
}

#[tonic::async_trait]
impl InventoryService for InventoryServiceImpl {
    async fn list_categories(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ListCategoriesResponse>, Status> {
        let categories: Vec<CategoryModel> = sqlx::query_as("SELECT id, name FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(Response::new(ListCategoriesResponse {
            categories: categories.into_iter().map(Into::into).collect(),
        }))
    }

    async fn create_inventory(
        &self,
        request: Request<CreateInventoryRequest>,
    ) -> Result<Response<InventoryResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let inventory = self.create(&auth_user, request.into_inner()).await?;
        Ok(Response::new(InventoryResponse {
            inventory: Some(inventory),
        }))
    }

    async fn get_inventory(
        &self,
        request: Request<InventoryIdRequest>,
    ) -> Result<Response<InventoryResponse>, Status> {
        let id = parse_uuid(&request.into_inner().id, "inventory id")?;
        let mut conn = self.pool.acquire().await.map_err(AppError::from)?;
        let inventory = Self::load_inventory(&mut conn, id).await?;
        Ok(Response::new(InventoryResponse {
            inventory: Some(inventory),
        }))
    }

    async fn list_inventories(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<ListInventoriesResponse>, Status> {
        let sql = format!("{} ORDER BY i.created_at DESC", InventorySummaryRow::SELECT);
        let rows: Vec<InventorySummaryRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(Response::new(ListInventoriesResponse {
            inventories: rows.into_iter().map(Into::into).collect(),
        }))
    }

    async fn delete_inventory(
        &self,
        request: Request<InventoryIdRequest>,
    ) -> Result<Response<Empty>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let id = parse_uuid(&request.into_inner().id, "inventory id")?;

        let owner: Option<Option<Uuid>> = sqlx::query_scalar("SELECT owner_id FROM inventories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        let owner_id = owner.ok_or_else(|| Status::not_found(format!("Inventory {} not found", id)))?;

        let access = InventoryAccess {
            owner_id,
            is_public: false,
            allowed_user_ids: vec![],
        };
        if !can_edit_inventory(&auth_user, &access) {
            return Err(Status::permission_denied(
                "Only the owner or an administrator can delete this inventory",
            ));
        }

        sqlx::query("DELETE FROM inventories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        tracing::info!("User {} deleted inventory {}", auth_user.user_id, id);
        Ok(Response::new(Empty {}))
    }

    async fn autosave_inventory(
        &self,
        request: Request<AutosaveInventoryRequest>,
    ) -> Result<Response<AutosaveInventoryResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let response = self.autosave(&auth_user, request.into_inner()).await?;
        Ok(Response::new(response))
    }

    async fn add_tag(
        &self,
        request: Request<AddTagRequest>,
    ) -> Result<Response<InventoryResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();
        let id = parse_uuid(&req.inventory_id, "inventory id")?;
        let name = normalize_tag(&req.tag).ok_or_else(|| Status::invalid_argument("Tag is required"))?;

        // Any signed-in user may tag; the inventory only has to exist.
        let mut tx = self.pool.begin().await.map_err(AppError::from)?;
        Self::load_model(&mut tx, id, false).await?;

        attach_tag(&mut tx, id, &name).await.map_err(AppError::from)?;
        let inventory = Self::load_inventory(&mut tx, id).await?;
        tx.commit().await.map_err(AppError::from)?;
        tracing::debug!("User {} tagged inventory {} with {}", auth_user.user_id, id, name);

        Ok(Response::new(InventoryResponse {
            inventory: Some(inventory),
        }))
    }

    async fn preview_custom_id(
        &self,
        request: Request<PreviewCustomIdRequest>,
    ) -> Result<Response<PreviewCustomIdResponse>, Status> {
        let req = request.into_inner();
        let template = template_from_proto(req.elements);
        let custom_id = template.generate_seeded(req.seed as u32 as u64, &GenerationContext::now());
        Ok(Response::new(PreviewCustomIdResponse { custom_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_proto_round_trip_keeps_wire_strings() {
        let wire = pb::CustomIdElement {
            r#type: "Digit9".into(),
            separator_before: String::new(),
            separator_after: "-".into(),
            fixed_text: String::new(),
            date_time_format: String::new(),
            padding_char: "0".into(),
            radix: "8".into(),
            position: Some(1),
            width: 0,
        };
        let template = template_from_proto(vec![wire.clone()]);
        assert_eq!(template.elements.len(), 1);
        assert_eq!(template_to_proto(&template), vec![wire]);
    }

    #[test]
    fn unknown_wire_types_are_dropped() {
        let template = template_from_proto(vec![pb::CustomIdElement {
            r#type: "Barcode".into(),
            ..Default::default()
        }]);
        assert!(template.is_empty());
    }

    #[test]
    fn general_group_trims_and_clears_blank_image() {
        let general = general_from_proto(crate::proto::inventory::GeneralGroup {
            title: "  Cameras ".into(),
            description: " Film bodies ".into(),
            category_id: 2,
            image_url: "  ".into(),
        });
        assert_eq!(general.title, "Cameras");
        assert_eq!(general.description, "Film bodies");
        assert_eq!(general.image_url, None);
    }

    #[test]
    fn visibility_rejects_bad_ids() {
        let result = visibility_from_proto(crate::proto::inventory::VisibilityGroup {
            is_public: false,
            allowed_user_ids: vec!["not-a-uuid".into()],
        });
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}
