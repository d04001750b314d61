use sqlx::PgPool;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::error::{parse_uuid, AppError, AppResult};
use crate::middleware::AuthenticatedUser;
use crate::models::PostModel;
use crate::proto::discussion::discussion_service_server::DiscussionService;
use crate::proto::discussion::{
    CreatePostRequest, ListPostsRequest, ListPostsResponse, PostResponse,
};

pub const MAX_POSTS_PER_PAGE: i64 = 200;
pub const MAX_POST_LEN: usize = 4000;

const POST_SELECT: &str = "SELECT p.id, p.guid, p.inventory_id, p.user_id,
        u.first_name, u.last_name, u.email, p.content_markdown, p.created_at
     FROM discussion_posts p
     JOIN users u ON u.id = p.user_id";

/// Trims post content and enforces the length limit.
pub fn clean_content(raw: &str) -> AppResult<String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(AppError::InvalidInput("Post content is required".to_string()));
    }
    if content.chars().count() > MAX_POST_LEN {
        return Err(AppError::InvalidInput(format!(
            "Post content is limited to {} characters",
            MAX_POST_LEN
        )));
    }
    Ok(content.to_string())
}

pub struct DiscussionServiceImpl {
    pool: PgPool,
}

impl DiscussionServiceImpl {
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

    async fn ensure_inventory(&self, id: Uuid) -> AppResult<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM inventories WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Inventory {} not found", id)))
        }
    }
}

#[tonic::async_trait]
impl DiscussionService for DiscussionServiceImpl {
    async fn list_posts(
        &self,
        request: Request<ListPostsRequest>,
    ) -> Result<Response<ListPostsResponse>, Status> {
        let req = request.into_inner();
        let inventory_id = parse_uuid(&req.inventory_id, "inventory id")?;

        let sql = format!(
            "{} WHERE p.inventory_id = $1 AND p.id > $2 ORDER BY p.id LIMIT $3",
            POST_SELECT
        );
        let posts: Vec<PostModel> = sqlx::query_as(&sql)
            .bind(inventory_id)
            .bind(req.after_id.max(0))
            .bind(MAX_POSTS_PER_PAGE)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::from)?;

        Ok(Response::new(ListPostsResponse {
            posts: posts.into_iter().map(Into::into).collect(),
        }))
    }

    async fn create_post(
        &self,
        request: Request<CreatePostRequest>,
    ) -> Result<Response<PostResponse>, Status> {
        let auth_user = Self::get_authenticated_user(&request)?;
        let req = request.into_inner();
        let inventory_id = parse_uuid(&req.inventory_id, "inventory id")?;
        let content = clean_content(&req.content)?;

        self.ensure_inventory(inventory_id).await?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO discussion_posts (inventory_id, user_id, content_markdown)
             VALUES ($1, $2, $3)
             RETURNING id",
        )
        .bind(inventory_id)
        .bind(auth_user.user_id)
        .bind(&content)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        let sql = format!("{} WHERE p.id = $1", POST_SELECT);
        let post: PostModel = sqlx::query_as(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::from)?;

        tracing::debug!("User {} posted {} on inventory {}", auth_user.user_id, id, inventory_id);
        Ok(Response::new(PostResponse {
            post: Some(post.into()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_is_trimmed() {
        assert_eq!(clean_content("  hello **world**\n").unwrap(), "hello **world**");
    }

    #[test]
    fn blank_and_oversized_content_rejected() {
        assert!(clean_content(" \n ").is_err());
        assert!(clean_content(&"a".repeat(MAX_POST_LEN)).is_ok());
        assert!(clean_content(&"a".repeat(MAX_POST_LEN + 1)).is_err());
    }
}
