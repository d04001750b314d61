//! Group-scoped optimistic concurrency for inventory and item autosave.
//!
//! Every group is versioned on its own. An edit read at the current version
//! applies directly; an edit read at an older version applies only when the
//! snapshot the client started from still equals what the server holds.

use uuid::Uuid;

use crate::custom_fields::{CustomFieldSet, ItemFieldValues};
use crate::custom_id::CustomIdTemplate;
use crate::proto::common as pb;

/// A versioned edit region.
pub trait FieldGroup: Clone {
    /// Group name reported to clients.
    const NAME: &'static str;

    /// Human-readable conflict message.
    const CONFLICT_MESSAGE: &'static str;

    /// Names of the fields that differ between `self` and `other`.
    fn diff(&self, other: &Self) -> Vec<&'static str>;
}

/// What a client sends for one group.
#[derive(Debug, Clone)]
pub struct GroupEdit<T> {
    /// Version the client read the group at.
    pub version: i32,
    /// Value the client believes the server holds. Required when `version` is stale.
    pub original: Option<T>,
    pub changes: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub group: &'static str,
    pub message: String,
    pub fields: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum Merge<T> {
    Apply(T),
    Conflict(Conflict),
}

/// Decides whether `edit` may overwrite `current`.
pub fn merge_group<T: FieldGroup>(current: &T, current_version: i32, edit: GroupEdit<T>) -> Merge<T> {
    if edit.version == current_version {
        return Merge::Apply(edit.changes);
    }

    match edit.original {
        Some(original) => {
            let fields = original.diff(current);
            if fields.is_empty() {
                Merge::Apply(edit.changes)
            } else {
                Merge::Conflict(Conflict {
                    group: T::NAME,
                    message: T::CONFLICT_MESSAGE.to_string(),
                    fields,
                })
            }
        }
        None => Merge::Conflict(Conflict {
            group: T::NAME,
            message: format!(
                "{} Your version {}, current version {}.",
                T::CONFLICT_MESSAGE,
                edit.version,
                current_version
            ),
            fields: Vec::new(),
        }),
    }
}

/// Collects per-group results of one autosave request.
#[derive(Debug, Default)]
pub struct AutosaveOutcome {
    pub applied: Vec<&'static str>,
    pub conflicts: Vec<Conflict>,
}

impl AutosaveOutcome {
    /// Records the result and hands back the value to write, if any.
    pub fn record<T: FieldGroup>(&mut self, merge: Merge<T>) -> Option<T> {
        match merge {
            Merge::Apply(value) => {
                self.applied.push(T::NAME);
                Some(value)
            }
            Merge::Conflict(conflict) => {
                self.conflicts.push(conflict);
                None
            }
        }
    }

    pub fn ok(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn applied_names(&self) -> Vec<String> {
        self.applied.iter().map(|s| s.to_string()).collect()
    }

    pub fn conflicts_pb(&self) -> Vec<pb::GroupConflict> {
        self.conflicts.iter().cloned().map(Into::into).collect()
    }
}

impl From<Conflict> for pb::GroupConflict {
    fn from(c: Conflict) -> Self {
        Self {
            group: c.group.to_string(),
            message: c.message,
            fields: c.fields.into_iter().map(String::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralGroup {
    pub title: String,
    pub description: String,
    pub category_id: i32,
    pub image_url: Option<String>,
}

impl FieldGroup for GeneralGroup {
    const NAME: &'static str = "general";
    const CONFLICT_MESSAGE: &'static str = "General info was modified by someone else.";

    fn diff(&self, other: &Self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title != other.title {
            fields.push("title");
        }
        if self.description != other.description {
            fields.push("description");
        }
        if self.category_id != other.category_id {
            fields.push("category_id");
        }
        if self.image_url.as_deref().unwrap_or("") != other.image_url.as_deref().unwrap_or("") {
            fields.push("image_url");
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityGroup {
    pub is_public: bool,
    allowed_user_ids: Vec<Uuid>,
}

impl VisibilityGroup {
    pub fn new(is_public: bool, mut allowed_user_ids: Vec<Uuid>) -> Self {
        allowed_user_ids.sort();
        allowed_user_ids.dedup();
        Self {
            is_public,
            allowed_user_ids,
        }
    }

    pub fn allowed_user_ids(&self) -> &[Uuid] {
        &self.allowed_user_ids
    }
}

impl FieldGroup for VisibilityGroup {
    const NAME: &'static str = "visibility";
    const CONFLICT_MESSAGE: &'static str = "Access settings were modified by someone else.";

    fn diff(&self, other: &Self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.is_public != other.is_public {
            fields.push("is_public");
        }
        if self.allowed_user_ids != other.allowed_user_ids {
            fields.push("allowed_user_ids");
        }
        fields
    }
}

impl FieldGroup for CustomFieldSet {
    const NAME: &'static str = "customFields";
    const CONFLICT_MESSAGE: &'static str = "Custom fields were modified by someone else.";

    fn diff(&self, other: &Self) -> Vec<&'static str> {
        CustomFieldSet::diff(self, other)
    }
}

impl FieldGroup for CustomIdTemplate {
    const NAME: &'static str = "customId";
    const CONFLICT_MESSAGE: &'static str = "Custom ID format was modified by someone else.";

    fn diff(&self, other: &Self) -> Vec<&'static str> {
        if self.elements == other.elements {
            Vec::new()
        } else {
            vec!["elements"]
        }
    }
}

/// The item editor's single group: the item's custom-field values.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFieldsGroup(pub ItemFieldValues);

impl ItemFieldsGroup {
    pub fn matches_name(name: &str) -> bool {
        name.eq_ignore_ascii_case(Self::NAME)
    }
}

impl FieldGroup for ItemFieldsGroup {
    const NAME: &'static str = "customFields";
    const CONFLICT_MESSAGE: &'static str = "Custom fields were modified by someone else.";

    fn diff(&self, other: &Self) -> Vec<&'static str> {
        self.0.diff(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_id::{Element, ElementKind};

    fn general(title: &str) -> GeneralGroup {
        GeneralGroup {
            title: title.into(),
            description: "Office laptops".into(),
            category_id: 1,
            image_url: None,
        }
    }

    #[test]
    fn same_version_applies() {
        let edit = GroupEdit {
            version: 3,
            original: None,
            changes: general("New"),
        };
        match merge_group(&general("Old"), 3, edit) {
            Merge::Apply(g) => assert_eq!(g.title, "New"),
            Merge::Conflict(c) => panic!("unexpected conflict {:?}", c),
        }
    }

    #[test]
    fn stale_version_with_matching_snapshot_applies() {
        let edit = GroupEdit {
            version: 1,
            original: Some(general("Old")),
            changes: general("New"),
        };
        assert!(matches!(merge_group(&general("Old"), 4, edit), Merge::Apply(_)));
    }

    #[test]
    fn stale_version_with_changed_snapshot_conflicts() {
        let edit = GroupEdit {
            version: 1,
            original: Some(general("Old")),
            changes: general("Mine"),
        };
        match merge_group(&general("Theirs"), 2, edit) {
            Merge::Conflict(c) => {
                assert_eq!(c.group, "general");
                assert_eq!(c.fields, vec!["title"]);
            }
            Merge::Apply(_) => panic!("expected conflict"),
        }
    }

    #[test]
    fn stale_version_without_snapshot_conflicts() {
        let edit = GroupEdit {
            version: 1,
            original: None,
            changes: general("Mine"),
        };
        match merge_group(&general("Old"), 2, edit) {
            Merge::Conflict(c) => assert!(c.message.ends_with("Your version 1, current version 2.")),
            Merge::Apply(_) => panic!("expected conflict"),
        }
    }

    #[test]
    fn groups_merge_independently() {
        let mut outcome = AutosaveOutcome::default();

        let current_general = general("Theirs");
        let general_edit = GroupEdit {
            version: 1,
            original: Some(general("Old")),
            changes: general("Mine"),
        };
        let applied_general = outcome.record(merge_group(&current_general, 2, general_edit));

        let current_visibility = VisibilityGroup::new(false, vec![]);
        let visibility_edit = GroupEdit {
            version: 5,
            original: Some(current_visibility.clone()),
            changes: VisibilityGroup::new(true, vec![]),
        };
        let applied_visibility = outcome.record(merge_group(&current_visibility, 5, visibility_edit));

        assert!(applied_general.is_none());
        assert_eq!(applied_visibility.map(|v| v.is_public), Some(true));
        assert_eq!(outcome.applied, vec!["visibility"]);
        assert_eq!(outcome.conflicts.len(), 1);
        assert!(!outcome.ok());
    }

    #[test]
    fn visibility_compares_user_sets_not_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let left = VisibilityGroup::new(false, vec![a, b]);
        let right = VisibilityGroup::new(false, vec![b, a, b]);
        assert!(left.diff(&right).is_empty());
        assert_eq!(right.allowed_user_ids().len(), 2);
    }

    #[test]
    fn stale_field_set_with_blank_slots_applies() {
        use crate::custom_fields::{CustomFieldDef, CustomFieldSlot};

        let qty = CustomFieldDef {
            title: "Qty".into(),
            description: "Units".into(),
            position: None,
            is_used: true,
        };
        let mut server = CustomFieldSet::default();
        server.defs.insert(CustomFieldSlot::NumericLine3, qty.clone());

        let mut original = CustomFieldSet::default();
        for slot in CustomFieldSlot::ALL {
            original.defs.insert(slot, CustomFieldDef::default());
        }
        original.defs.insert(CustomFieldSlot::NumericLine3, qty);

        let edit = GroupEdit {
            version: 1,
            original: Some(original.clone()),
            changes: original,
        };
        match merge_group(&server, 3, edit) {
            Merge::Apply(set) => assert_eq!(set.defs.len(), 12),
            Merge::Conflict(c) => panic!("unexpected conflict {:?}", c),
        }
    }

    #[test]
    fn template_group_reports_elements() {
        let old = CustomIdTemplate::new(vec![Element::new(ElementKind::Guid)]);
        let new = CustomIdTemplate::new(vec![Element::new(ElementKind::FixedText { text: "A".into() })]);
        assert_eq!(FieldGroup::diff(&old, &new), vec!["elements"]);
        assert!(FieldGroup::diff(&old, &old.clone()).is_empty());
    }

    #[test]
    fn item_fields_treat_missing_text_as_empty() {
        let server = ItemFieldsGroup(ItemFieldValues {
            single_line1: Some(String::new()),
            ..Default::default()
        });
        let edit = GroupEdit {
            version: 1,
            original: Some(ItemFieldsGroup(ItemFieldValues::default())),
            changes: ItemFieldsGroup(ItemFieldValues {
                single_line1: Some("x".into()),
                ..Default::default()
            }),
        };
        assert!(matches!(merge_group(&server, 2, edit), Merge::Apply(_)));
        assert!(ItemFieldsGroup::matches_name("CUSTOMFIELDS"));
    }

    #[test]
    fn item_fields_conflict_message() {
        let server = ItemFieldsGroup(ItemFieldValues {
            numeric_line1: Some(2.0),
            ..Default::default()
        });
        let edit = GroupEdit {
            version: 1,
            original: Some(ItemFieldsGroup(ItemFieldValues::default())),
            changes: ItemFieldsGroup(ItemFieldValues::default()),
        };
        match merge_group(&server, 2, edit) {
            Merge::Conflict(c) => {
                assert_eq!(c.message, "Custom fields were modified by someone else.");
                assert_eq!(c.fields, vec!["numeric_line1"]);
            }
            Merge::Apply(_) => panic!("expected conflict"),
        }
    }
}
