use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::proto::inventory::Category;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CategoryModel {
    pub id: i32,
    pub name: String,
}

impl From<CategoryModel> for Category {
    fn from(c: CategoryModel) -> Self {
        Category {
            id: c.id,
            name: c.name,
        }
    }
}
