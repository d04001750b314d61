use sqlx::{FromRow, PgPool};
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::error::AppError;
use crate::proto::search::search_service_server::SearchService;
use crate::proto::search::{
    InventoryHit, SearchInventoriesResponse, SearchRequest, SearchTagsResponse,
    SearchUsersResponse, TagHit, UserHit,
};

const USER_SIMILARITY: f32 = 0.15;
const INVENTORY_SIMILARITY: f32 = 0.05;
const DEFAULT_USER_LIMIT: i64 = 5;
const DEFAULT_INVENTORY_LIMIT: i64 = 3;
const DEFAULT_TAG_LIMIT: i64 = 5;
const MAX_MATCHED_TAGS: i64 = 5;
const MAX_LIMIT: i64 = 50;

fn effective_limit(requested: i32, default: i64) -> i64 {
    if requested <= 0 {
        default
    } else {
        i64::from(requested).min(MAX_LIMIT)
    }
}

/// Escapes LIKE wildcards so the query is matched literally as a prefix.
fn like_prefix(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 1);
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// A trimmed, lowercased query and its escaped `ILIKE` prefix pattern.
#[derive(Debug, PartialEq, Eq)]
struct SearchTerm {
    text: String,
    prefix: String,
}

impl SearchTerm {
    /// `None` for a blank query.
    fn parse(raw: &str) -> Option<Self> {
        let text = raw.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        let prefix = like_prefix(&text);
        Some(Self { text, prefix })
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    first_name: String,
    last_name: Option<String>,
}

#[derive(FromRow)]
struct InventoryRow {
    id: Uuid,
    title: String,
    description: String,
    image_url: Option<String>,
    owner_id: Option<Uuid>,
    matched_tags: Vec<String>,
}

pub struct SearchServiceImpl {
    pool: PgPool,
}

impl SearchServiceImpl {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[tonic::async_trait]
impl SearchService for SearchServiceImpl {
    async fn search_users(
        &self,
        request: Request<SearchRequest>,
    ) -> Result<Response<SearchUsersResponse>, Status> {
        let req = request.into_inner();
        let Some(term) = SearchTerm::parse(&req.query) else {
            return Ok(Response::new(SearchUsersResponse { users: vec![] }));
        };

        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, first_name, last_name
             FROM users
             WHERE search_vector @@ plainto_tsquery('simple', $1)
                OR similarity(first_name, $1) > $2
                OR similarity(COALESCE(last_name, ''), $1) > $2
             ORDER BY ts_rank(search_vector, plainto_tsquery('simple', $1))
                    + similarity(first_name, $1)
                    + similarity(COALESCE(last_name, ''), $1) DESC,
                      sequential_id
             LIMIT $3",
        )
        .bind(&term.text)
        .bind(USER_SIMILARITY)
        .bind(effective_limit(req.limit, DEFAULT_USER_LIMIT))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(Response::new(SearchUsersResponse {
            users: rows
                .into_iter()
                .map(|r| UserHit {
                    id: r.id.to_string(),
                    first_name: r.first_name,
                    last_name: r.last_name.unwrap_or_default(),
                })
                .collect(),
        }))
    }

    async fn search_inventories(
        &self,
        request: Request<SearchRequest>,
    ) -> Result<Response<SearchInventoriesResponse>, Status> {
        let req = request.into_inner();
        let Some(term) = SearchTerm::parse(&req.query) else {
            return Ok(Response::new(SearchInventoriesResponse { inventories: vec![] }));
        };

        let rows: Vec<InventoryRow> = sqlx::query_as(
            "SELECT i.id, i.title, i.description, i.image_url, i.owner_id,
                    ARRAY(
                        SELECT t.name FROM inventory_tags it
                        JOIN tags t ON t.id = it.tag_id
                        WHERE it.inventory_id = i.id
                          AND (similarity(t.name, $1) > $2 OR t.name ILIKE $5)
                        ORDER BY t.name
                        LIMIT $4
                    ) AS matched_tags
             FROM inventories i
             WHERE i.is_public
               AND (
                    i.search_vector @@ plainto_tsquery('simple', $1)
                    OR similarity(i.title, $1) > $2
                    OR similarity(i.description, $1) > $2
                    OR EXISTS (
                        SELECT 1 FROM inventory_tags it
                        JOIN tags t ON t.id = it.tag_id
                        WHERE it.inventory_id = i.id
                          AND (similarity(t.name, $1) > $2 OR t.name ILIKE $5)
                    )
               )
             ORDER BY ts_rank(i.search_vector, plainto_tsquery('simple', $1))
                    + similarity(i.title, $1)
                    + similarity(i.description, $1) DESC,
                      i.created_at DESC
             LIMIT $3",
        )
        .bind(&term.text)
        .bind(INVENTORY_SIMILARITY)
        .bind(effective_limit(req.limit, DEFAULT_INVENTORY_LIMIT))
        .bind(MAX_MATCHED_TAGS)
        .bind(&term.prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(Response::new(SearchInventoriesResponse {
            inventories: rows
                .into_iter()
                .map(|r| InventoryHit {
                    id: r.id.to_string(),
                    title: r.title,
                    description: r.description,
                    image_url: r.image_url.unwrap_or_default(),
                    owner_id: r.owner_id.map(|id| id.to_string()).unwrap_or_default(),
                    matched_tags: r.matched_tags,
                })
                .collect(),
        }))
    }

    async fn search_tags(
        &self,
        request: Request<SearchRequest>,
    ) -> Result<Response<SearchTagsResponse>, Status> {
        let req = request.into_inner();
        let Some(term) = SearchTerm::parse(&req.query) else {
            return Ok(Response::new(SearchTagsResponse { tags: vec![] }));
        };

        let rows: Vec<(i32, String)> = sqlx::query_as(
            "SELECT id, name FROM tags WHERE name ILIKE $1 ORDER BY name LIMIT $2",
        )
        .bind(&term.prefix)
        .bind(effective_limit(req.limit, DEFAULT_TAG_LIMIT))
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(Response::new(SearchTagsResponse {
            tags: rows
                .into_iter()
                .map(|(id, name)| TagHit { id, name })
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_default_and_cap() {
        assert_eq!(effective_limit(0, 3), 3);
        assert_eq!(effective_limit(-1, 5), 5);
        assert_eq!(effective_limit(10, 5), 10);
        assert_eq!(effective_limit(1000, 5), MAX_LIMIT);
    }

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("cam"), "cam%");
        assert_eq!(like_prefix("50%_off"), "50\\%\\_off%");
    }

    #[test]
    fn search_term_carries_text_and_tag_prefix() {
        assert_eq!(SearchTerm::parse("   "), None);
        let term = SearchTerm::parse("  Cam_Era ").unwrap();
        assert_eq!(term.text, "cam_era");
        assert_eq!(term.prefix, "cam\\_era%");
    }
}
