use sqlx::PgConnection;
use uuid::Uuid;

pub const MAX_TAG_LEN: usize = 64;

/// Trimmed, lowercased, capped at 64 characters. `None` for blank input.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let name: String = raw.trim().to_lowercase().chars().take(MAX_TAG_LEN).collect();
    let name = name.trim_end().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Links the tag `name` to the inventory, creating the tag when it does not exist yet.
/// Returns the tag id. Linking twice is a no-op.
pub async fn attach_tag(
    conn: &mut PgConnection,
    inventory_id: Uuid,
    name: &str,
) -> Result<i32, sqlx::Error> {
    let (tag_id,): (i32,) = sqlx::query_as(
        "INSERT INTO tags (name) VALUES ($1)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id",
    )
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        "INSERT INTO inventory_tags (inventory_id, tag_id) VALUES ($1, $2)
         ON CONFLICT DO NOTHING",
    )
    .bind(inventory_id)
    .bind(tag_id)
    .execute(&mut *conn)
    .await?;

    Ok(tag_id)
}

pub async fn tags_for_inventory(
    conn: &mut PgConnection,
    inventory_id: Uuid,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT t.name FROM tags t
         JOIN inventory_tags it ON it.tag_id = t.id
         WHERE it.inventory_id = $1
         ORDER BY t.name",
    )
    .bind(inventory_id)
    .fetch_all(&mut *conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_tag("  Vintage Cameras ").as_deref(), Some("vintage cameras"));
        assert_eq!(normalize_tag("   "), None);
    }

    #[test]
    fn caps_length() {
        let long = "x".repeat(100);
        assert_eq!(normalize_tag(&long).map(|t| t.len()), Some(MAX_TAG_LEN));
    }
}
