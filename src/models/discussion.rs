use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::proto::discussion::{Post, PostAuthor};

/// A discussion post joined with its author.
#[derive(Debug, Clone, FromRow)]
pub struct PostModel {
    pub id: i64,
    pub guid: Uuid,
    pub inventory_id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: String,
    pub content_markdown: String,
    pub created_at: DateTime<Utc>,
}

impl From<PostModel> for Post {
    fn from(p: PostModel) -> Self {
        Post {
            id: p.id,
            guid: p.guid.to_string(),
            inventory_id: p.inventory_id.to_string(),
            author: Some(PostAuthor {
                id: p.user_id.to_string(),
                first_name: p.first_name,
                last_name: p.last_name.unwrap_or_default(),
                email: p.email,
            }),
            content_markdown: p.content_markdown,
            created_at: p.created_at.to_rfc3339(),
        }
    }
}
