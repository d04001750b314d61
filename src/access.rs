//! Who may do what with inventories and items.

use uuid::Uuid;

use crate::middleware::auth::AuthenticatedUser;

/// Access-relevant facts about one inventory.
#[derive(Debug, Clone)]
pub struct InventoryAccess {
    pub owner_id: Option<Uuid>,
    pub is_public: bool,
    pub allowed_user_ids: Vec<Uuid>,
}

pub fn can_edit_inventory(user: &AuthenticatedUser, inventory: &InventoryAccess) -> bool {
    user.is_admin || inventory.owner_id == Some(user.user_id)
}

pub fn can_create_item(user: &AuthenticatedUser, inventory: &InventoryAccess) -> bool {
    can_edit_inventory(user, inventory)
        || inventory.is_public
        || inventory.allowed_user_ids.contains(&user.user_id)
}

pub fn can_edit_item(user: &AuthenticatedUser, item_owner_id: Option<Uuid>) -> bool {
    user.is_admin || item_owner_id == Some(user.user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_admin: bool) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            email: "someone@example.com".into(),
            is_admin,
        }
    }

    fn private_inventory(owner: Option<Uuid>) -> InventoryAccess {
        InventoryAccess {
            owner_id: owner,
            is_public: false,
            allowed_user_ids: vec![],
        }
    }

    #[test]
    fn owner_and_admin_edit_inventory() {
        let owner = user(false);
        let admin = user(true);
        let stranger = user(false);
        let inventory = private_inventory(Some(owner.user_id));

        assert!(can_edit_inventory(&owner, &inventory));
        assert!(can_edit_inventory(&admin, &inventory));
        assert!(!can_edit_inventory(&stranger, &inventory));
    }

    #[test]
    fn orphaned_inventory_is_admin_only() {
        let inventory = private_inventory(None);
        assert!(!can_edit_inventory(&user(false), &inventory));
        assert!(can_edit_inventory(&user(true), &inventory));
    }

    #[test]
    fn item_creation_rules() {
        let stranger = user(false);
        let invited = user(false);

        let mut inventory = private_inventory(Some(Uuid::new_v4()));
        inventory.allowed_user_ids.push(invited.user_id);
        assert!(!can_create_item(&stranger, &inventory));
        assert!(can_create_item(&invited, &inventory));

        inventory.is_public = true;
        assert!(can_create_item(&stranger, &inventory));
    }

    #[test]
    fn item_edit_is_owner_or_admin() {
        let owner = user(false);
        assert!(can_edit_item(&owner, Some(owner.user_id)));
        assert!(!can_edit_item(&user(false), Some(owner.user_id)));
        assert!(can_edit_item(&user(true), None));
    }
}
