pub mod auth_service;
pub mod discussion_service;
pub mod health_service;
pub mod inventory_service;
pub mod item_service;
pub mod search_service;
pub mod user_service;

pub use auth_service::AuthServiceImpl;
pub use discussion_service::DiscussionServiceImpl;
pub use health_service::HealthServiceImpl;
pub use inventory_service::InventoryServiceImpl;
pub use item_service::ItemServiceImpl;
pub use search_service::SearchServiceImpl;
pub use user_service::UserServiceImpl;
