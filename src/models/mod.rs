pub mod category;
pub mod discussion;
pub mod inventory;
pub mod item;
pub mod user;

pub use category::*;
pub use discussion::*;
pub use inventory::*;
pub use item::*;
pub use user::*;
