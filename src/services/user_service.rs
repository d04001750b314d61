use sqlx::PgPool;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::error::{parse_uuid, parse_uuids, AppError, AppResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{InventorySummaryRow, ItemSummaryRow, UserModel};
use crate::proto::common::{Empty, UserSummary};
use crate::proto::users::user_service_server::UserService;
use crate::proto::users::{
    ChangePasswordRequest, InventoryIdsRequest, InventoryIdsResponse, ListUsersResponse,
    SetAdminRequest, UpdateProfileRequest, UserDetailsResponse, UserIdRequest, UserIdsRequest,
    UserIdsResponse, UserResponse,
};
use crate::services::auth_service::{hash_password, verify_password};

pub struct UserServiceImpl {
    pool: PgPool,
}

impl UserServiceImpl {
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

    fn require_admin(user: &AuthenticatedUser) -> AppResult<()> {
        if user.is_admin {
            Ok(())
        } else {
            Err(AppError::PermissionDenied("Administrator access required".to_string()))
        }
    }

    async fn find_user(&self, id: Uuid) -> AppResult<UserModel> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", UserModel::COLUMNS);
        sqlx::query_as::<_, UserModel>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn user_details(&self, caller: &AuthenticatedUser, id: Uuid) -> AppResult<UserDetailsResponse> {
        let user = self.find_user(id).await?;

        let created_sql = format!(
            "{} WHERE i.owner_id = $1 ORDER BY i.created_at DESC",
            InventorySummaryRow::SELECT
        );
        let created: Vec<InventorySummaryRow> = sqlx::query_as(&created_sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        let allowed_sql = format!(
            "{} JOIN inventory_allowed_users a ON a.inventory_id = i.id
             WHERE a.user_id = $1 ORDER BY i.created_at DESC",
            InventorySummaryRow::SELECT
        );
        let allowed: Vec<InventorySummaryRow> = sqlx::query_as(&allowed_sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        let liked_sql = format!(
            "{} JOIN item_likes mine ON mine.item_id = it.id
             WHERE mine.user_id = $1 ORDER BY mine.created_at DESC",
            ItemSummaryRow::SELECT
        );
        let liked: Vec<ItemSummaryRow> = sqlx::query_as(&liked_sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        let is_self = caller.user_id == id;
        Ok(UserDetailsResponse {
            user: Some(user.into()),
            created_inventories: created.into_iter().map(Into::into).collect(),
            allowed_inventories: allowed.into_iter().map(Into::into).collect(),
            liked_items: liked.into_iter().map(Into::into).collect(),
            is_self,
            can_edit: is_self || caller.is_admin,
        })
    }

    async fn remove_users(&self, ids: &[Uuid]) -> AppResult<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE inventories SET owner_id = NULL, updated_at = NOW() WHERE owner_id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;

        let deleted: Vec<Uuid> = sqlx::query_scalar("DELETE FROM users WHERE id = ANY($1) RETURNING id")
            .bind(ids)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted)
    }
}

#[tonic::async_trait]
impl UserService for UserServiceImpl {
    async fn list_users(
        &self,
        request: Request<Empty>,
    ) -> Result<Response<ListUsersResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;

        let sql = format!("SELECT {} FROM users ORDER BY sequential_id", UserModel::COLUMNS);
        let users: Vec<UserModel> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(Response::new(ListUsersResponse {
            users: users.into_iter().map(UserSummary::from).collect(),
            caller_is_admin: auth_user.is_admin,
        }))
    }

    async fn get_user(
        &self,
        request: Request<UserIdRequest>,
    ) -> Result<Response<UserDetailsResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();

        let id = if req.user_id.trim().is_empty() {
            auth_user.user_id
        } else {
            parse_uuid(&req.user_id, "user id")?
        };

        Ok(Response::new(self.user_details(&auth_user, id).await?))
    }

    async fn update_profile(
        &self,
        request: Request<UpdateProfileRequest>,
    ) -> Result<Response<UserResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();

        let first_name = req.first_name.trim();
        if first_name.is_empty() {
            return Err(Status::invalid_argument("First name is required"));
        }
        let last_name = Some(req.last_name.trim()).filter(|s| !s.is_empty());

        sqlx::query("UPDATE users SET first_name = $2, last_name = $3, updated_at = NOW() WHERE id = $1")
            .bind(auth_user.user_id)
            .bind(first_name)
            .bind(last_name)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        let user = self.find_user(auth_user.user_id).await?;
        Ok(Response::new(UserResponse {
            user: Some(user.into()),
        }))
    }

    async fn change_password(
        &self,
        request: Request<ChangePasswordRequest>,
    ) -> Result<Response<Empty>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();

        if req.new_password.is_empty() {
            return Err(Status::invalid_argument("New password is required"));
        }
        if req.new_password != req.confirm_password {
            return Err(Status::invalid_argument("The new password and confirmation do not match"));
        }

        let current_hash: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
            .bind(auth_user.user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| Status::not_found("User not found"))?;

        if !verify_password(&req.current_password, &current_hash)? {
            return Err(Status::invalid_argument("Current password is incorrect"));
        }

        let new_hash = hash_password(&req.new_password)?;
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(auth_user.user_id)
            .bind(&new_hash)
            .execute(&self.pool)
            .await
            .map_err(AppError::from)?;

        tracing::info!("User {} changed password", auth_user.user_id);
        Ok(Response::new(Empty {}))
    }

    async fn delete_users(
        &self,
        request: Request<UserIdsRequest>,
    ) -> Result<Response<UserIdsResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        Self::require_admin(&auth_user)?;
        let ids = parse_uuids(&request.into_inner().ids, "user id")?;
        if ids.is_empty() {
            return Ok(Response::new(UserIdsResponse { ids: vec![] }));
        }

        let deleted = self.remove_users(&ids).await?;
        tracing::info!("Admin {} deleted {} user(s)", auth_user.user_id, deleted.len());

        Ok(Response::new(UserIdsResponse {
            ids: deleted.iter().map(Uuid::to_string).collect(),
        }))
    }

    async fn set_admin(
        &self,
        request: Request<SetAdminRequest>,
    ) -> Result<Response<UserIdsResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        Self::require_admin(&auth_user)?;
        let req = request.into_inner();
        let ids = parse_uuids(&req.ids, "user id")?;

        let updated: Vec<Uuid> = sqlx::query_scalar(
            "UPDATE users SET is_admin = $2, updated_at = NOW() WHERE id = ANY($1) RETURNING id",
        )
        .bind(&ids)
        .bind(req.is_admin)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        tracing::info!(
            "Admin {} set is_admin={} on {} user(s)",
            auth_user.user_id,
            req.is_admin,
            updated.len()
        );
        Ok(Response::new(UserIdsResponse {
            ids: updated.iter().map(Uuid::to_string).collect(),
        }))
    }

    async fn delete_own_inventories(
        &self,
        request: Request<InventoryIdsRequest>,
    ) -> Result<Response<InventoryIdsResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let ids = parse_uuids(&request.into_inner().ids, "inventory id")?;

        let deleted: Vec<Uuid> = sqlx::query_scalar(
            "DELETE FROM inventories WHERE id = ANY($1) AND owner_id = $2 RETURNING id",
        )
        .bind(&ids)
        .bind(auth_user.user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(Response::new(InventoryIdsResponse {
            ids: deleted.iter().map(Uuid::to_string).collect(),
        }))
    }
}
