//! The twelve fixed custom-field slots of an inventory and the values items store in them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

use crate::proto::common as pb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomFieldSlot {
    SingleLine1,
    SingleLine2,
    SingleLine3,
    MultiLine1,
    MultiLine2,
    MultiLine3,
    NumericLine1,
    NumericLine2,
    NumericLine3,
    BoolLine1,
    BoolLine2,
    BoolLine3,
}

impl CustomFieldSlot {
    pub const ALL: [CustomFieldSlot; 12] = [
        CustomFieldSlot::SingleLine1,
        CustomFieldSlot::SingleLine2,
        CustomFieldSlot::SingleLine3,
        CustomFieldSlot::MultiLine1,
        CustomFieldSlot::MultiLine2,
        CustomFieldSlot::MultiLine3,
        CustomFieldSlot::NumericLine1,
        CustomFieldSlot::NumericLine2,
        CustomFieldSlot::NumericLine3,
        CustomFieldSlot::BoolLine1,
        CustomFieldSlot::BoolLine2,
        CustomFieldSlot::BoolLine3,
    ];

    /// Column and wire key of the slot.
    pub fn key(self) -> &'static str {
        use CustomFieldSlot::*;
        match self {
            SingleLine1 => "single_line1",
            SingleLine2 => "single_line2",
            SingleLine3 => "single_line3",
            MultiLine1 => "multi_line1",
            MultiLine2 => "multi_line2",
            MultiLine3 => "multi_line3",
            NumericLine1 => "numeric_line1",
            NumericLine2 => "numeric_line2",
            NumericLine3 => "numeric_line3",
            BoolLine1 => "bool_line1",
            BoolLine2 => "bool_line2",
            BoolLine3 => "bool_line3",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDef {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
    #[serde(default)]
    pub is_used: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{0}: title is required")]
    MissingTitle(&'static str),

    #[error("{0}: description is required")]
    MissingDescription(&'static str),

    #[error("Enable and fill at least one custom field.")]
    NoneEnabled,

    #[error("{0}: value is required")]
    MissingValue(&'static str),
}

/// Joins validation errors into one message for the caller.
pub fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Field definitions of an inventory, keyed by slot. Stored as JSONB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomFieldSet {
    pub defs: BTreeMap<CustomFieldSlot, CustomFieldDef>,
}

impl CustomFieldSet {
    pub fn get(&self, slot: CustomFieldSlot) -> Option<&CustomFieldDef> {
        self.defs.get(&slot)
    }

    pub fn is_used(&self, slot: CustomFieldSlot) -> bool {
        self.get(slot).map(|d| d.is_used).unwrap_or(false)
    }

    pub fn used_slots(&self) -> impl Iterator<Item = CustomFieldSlot> + '_ {
        CustomFieldSlot::ALL
            .into_iter()
            .filter(move |slot| self.is_used(*slot))
    }

    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut complete = 0;

        for slot in self.used_slots() {
            let Some(def) = self.get(slot) else { continue };
            let mut ok = true;
            if def.title.trim().is_empty() {
                errors.push(FieldError::MissingTitle(slot.key()));
                ok = false;
            }
            if def.description.trim().is_empty() {
                errors.push(FieldError::MissingDescription(slot.key()));
                ok = false;
            }
            if ok {
                complete += 1;
            }
        }

        if complete == 0 {
            errors.push(FieldError::NoneEnabled);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Slots whose definitions differ between the two sets. A missing slot
    /// equals an unused blank definition.
    pub fn diff(&self, other: &CustomFieldSet) -> Vec<&'static str> {
        CustomFieldSlot::ALL
            .into_iter()
            .filter(|slot| {
                let ours = self.get(*slot).cloned().unwrap_or_default();
                let theirs = other.get(*slot).cloned().unwrap_or_default();
                ours != theirs
            })
            .map(CustomFieldSlot::key)
            .collect()
    }
}

/// A single slot value as stored on an item.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Numeric(Option<f64>),
    Bool(Option<bool>),
}

/// Values of the twelve slots on one item. Maps 1:1 onto the item's columns.
#[derive(Debug, Clone, Default, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ItemFieldValues {
    pub single_line1: Option<String>,
    pub single_line2: Option<String>,
    pub single_line3: Option<String>,
    pub multi_line1: Option<String>,
    pub multi_line2: Option<String>,
    pub multi_line3: Option<String>,
    pub numeric_line1: Option<f64>,
    pub numeric_line2: Option<f64>,
    pub numeric_line3: Option<f64>,
    pub bool_line1: Option<bool>,
    pub bool_line2: Option<bool>,
    pub bool_line3: Option<bool>,
}

impl ItemFieldValues {
    /// Value of `slot`; missing text reads as the empty string.
    pub fn value(&self, slot: CustomFieldSlot) -> FieldValue<'_> {
        use CustomFieldSlot::*;
        match slot {
            SingleLine1 => FieldValue::Text(text(&self.single_line1)),
            SingleLine2 => FieldValue::Text(text(&self.single_line2)),
            SingleLine3 => FieldValue::Text(text(&self.single_line3)),
            MultiLine1 => FieldValue::Text(text(&self.multi_line1)),
            MultiLine2 => FieldValue::Text(text(&self.multi_line2)),
            MultiLine3 => FieldValue::Text(text(&self.multi_line3)),
            NumericLine1 => FieldValue::Numeric(self.numeric_line1),
            NumericLine2 => FieldValue::Numeric(self.numeric_line2),
            NumericLine3 => FieldValue::Numeric(self.numeric_line3),
            BoolLine1 => FieldValue::Bool(self.bool_line1),
            BoolLine2 => FieldValue::Bool(self.bool_line2),
            BoolLine3 => FieldValue::Bool(self.bool_line3),
        }
    }

    /// Slots whose values differ, treating missing text as empty.
    pub fn diff(&self, other: &ItemFieldValues) -> Vec<&'static str> {
        CustomFieldSlot::ALL
            .into_iter()
            .filter(|slot| self.value(*slot) != other.value(*slot))
            .map(CustomFieldSlot::key)
            .collect()
    }

    /// Every used text slot must be non-blank and every used numeric slot set.
    pub fn validate_against(&self, set: &CustomFieldSet) -> Result<(), Vec<FieldError>> {
        let errors: Vec<FieldError> = set
            .used_slots()
            .filter(|slot| match self.value(*slot) {
                FieldValue::Text(t) => t.trim().is_empty(),
                FieldValue::Numeric(n) => n.is_none(),
                FieldValue::Bool(_) => false,
            })
            .map(|slot| FieldError::MissingValue(slot.key()))
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Trims text values and turns blank text into `None`.
    pub fn normalized(mut self) -> Self {
        for v in [
            &mut self.single_line1,
            &mut self.single_line2,
            &mut self.single_line3,
            &mut self.multi_line1,
            &mut self.multi_line2,
            &mut self.multi_line3,
        ] {
            *v = v
                .take()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
        }
        self
    }
}

fn text(v: &Option<String>) -> &str {
    v.as_deref().unwrap_or("")
}

impl From<pb::CustomFieldDef> for CustomFieldDef {
    fn from(d: pb::CustomFieldDef) -> Self {
        Self {
            title: d.title.trim().to_string(),
            description: d.description.trim().to_string(),
            position: d.position,
            is_used: d.is_used,
        }
    }
}

impl From<&CustomFieldDef> for pb::CustomFieldDef {
    fn from(d: &CustomFieldDef) -> Self {
        Self {
            title: d.title.clone(),
            description: d.description.clone(),
            position: d.position,
            is_used: d.is_used,
        }
    }
}

impl From<pb::CustomFieldSet> for CustomFieldSet {
    fn from(s: pb::CustomFieldSet) -> Self {
        let slots = [
            (CustomFieldSlot::SingleLine1, s.single_line1),
            (CustomFieldSlot::SingleLine2, s.single_line2),
            (CustomFieldSlot::SingleLine3, s.single_line3),
            (CustomFieldSlot::MultiLine1, s.multi_line1),
            (CustomFieldSlot::MultiLine2, s.multi_line2),
            (CustomFieldSlot::MultiLine3, s.multi_line3),
            (CustomFieldSlot::NumericLine1, s.numeric_line1),
            (CustomFieldSlot::NumericLine2, s.numeric_line2),
            (CustomFieldSlot::NumericLine3, s.numeric_line3),
            (CustomFieldSlot::BoolLine1, s.bool_line1),
            (CustomFieldSlot::BoolLine2, s.bool_line2),
            (CustomFieldSlot::BoolLine3, s.bool_line3),
        ];
        Self {
            defs: slots
                .into_iter()
                .filter_map(|(slot, def)| def.map(|d| (slot, CustomFieldDef::from(d))))
                .collect(),
        }
    }
}

impl From<&CustomFieldSet> for pb::CustomFieldSet {
    fn from(s: &CustomFieldSet) -> Self {
        let def = |slot| s.get(slot).map(pb::CustomFieldDef::from);
        Self {
            single_line1: def(CustomFieldSlot::SingleLine1),
            single_line2: def(CustomFieldSlot::SingleLine2),
            single_line3: def(CustomFieldSlot::SingleLine3),
            multi_line1: def(CustomFieldSlot::MultiLine1),
            multi_line2: def(CustomFieldSlot::MultiLine2),
            multi_line3: def(CustomFieldSlot::MultiLine3),
            numeric_line1: def(CustomFieldSlot::NumericLine1),
            numeric_line2: def(CustomFieldSlot::NumericLine2),
            numeric_line3: def(CustomFieldSlot::NumericLine3),
            bool_line1: def(CustomFieldSlot::BoolLine1),
            bool_line2: def(CustomFieldSlot::BoolLine2),
            bool_line3: def(CustomFieldSlot::BoolLine3),
        }
    }
}

impl From<pb::CustomFieldValues> for ItemFieldValues {
    fn from(v: pb::CustomFieldValues) -> Self {
        Self {
            single_line1: v.single_line1,
            single_line2: v.single_line2,
            single_line3: v.single_line3,
            multi_line1: v.multi_line1,
            multi_line2: v.multi_line2,
            multi_line3: v.multi_line3,
            numeric_line1: v.numeric_line1,
            numeric_line2: v.numeric_line2,
            numeric_line3: v.numeric_line3,
            bool_line1: v.bool_line1,
            bool_line2: v.bool_line2,
            bool_line3: v.bool_line3,
        }
    }
}

impl From<ItemFieldValues> for pb::CustomFieldValues {
    fn from(v: ItemFieldValues) -> Self {
        Self {
            single_line1: v.single_line1,
            single_line2: v.single_line2,
            single_line3: v.single_line3,
            multi_line1: v.multi_line1,
            multi_line2: v.multi_line2,
            multi_line3: v.multi_line3,
            numeric_line1: v.numeric_line1,
            numeric_line2: v.numeric_line2,
            numeric_line3: v.numeric_line3,
            bool_line1: v.bool_line1,
            bool_line2: v.bool_line2,
            bool_line3: v.bool_line3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(title: &str, description: &str, is_used: bool) -> CustomFieldDef {
        CustomFieldDef {
            title: title.into(),
            description: description.into(),
            position: None,
            is_used,
        }
    }

    #[test]
    fn empty_set_requires_one_field() {
        let errors = CustomFieldSet::default().validate().unwrap_err();
        assert_eq!(errors, vec![FieldError::NoneEnabled]);
        assert_eq!(describe(&errors), "Enable and fill at least one custom field.");
    }

    #[test]
    fn used_slot_needs_title_and_description() {
        let mut set = CustomFieldSet::default();
        set.defs.insert(CustomFieldSlot::SingleLine1, def("Model", "  ", true));
        set.defs.insert(CustomFieldSlot::NumericLine2, def("Price", "In USD", true));
        let errors = set.validate().unwrap_err();
        assert_eq!(errors, vec![FieldError::MissingDescription("single_line1")]);
    }

    #[test]
    fn unused_slots_are_not_checked() {
        let mut set = CustomFieldSet::default();
        set.defs.insert(CustomFieldSlot::SingleLine1, def("", "", false));
        set.defs.insert(CustomFieldSlot::BoolLine1, def("Working", "Powers on", true));
        assert!(set.validate().is_ok());
        assert_eq!(set.used_slots().collect::<Vec<_>>(), vec![CustomFieldSlot::BoolLine1]);
    }

    #[test]
    fn values_validate_against_used_slots() {
        let mut set = CustomFieldSet::default();
        set.defs.insert(CustomFieldSlot::SingleLine2, def("Serial", "On the back", true));
        set.defs.insert(CustomFieldSlot::NumericLine1, def("Weight", "kg", true));
        set.defs.insert(CustomFieldSlot::BoolLine3, def("Boxed", "Original box", true));

        let values = ItemFieldValues {
            single_line2: Some("   ".into()),
            ..Default::default()
        };
        let errors = values.validate_against(&set).unwrap_err();
        assert_eq!(
            errors,
            vec![
                FieldError::MissingValue("single_line2"),
                FieldError::MissingValue("numeric_line1"),
            ]
        );

        let values = ItemFieldValues {
            single_line2: Some("SN-1".into()),
            numeric_line1: Some(0.0),
            ..Default::default()
        };
        assert!(values.validate_against(&set).is_ok());
    }

    #[test]
    fn missing_slot_equals_blank_definition() {
        let mut server = CustomFieldSet::default();
        server.defs.insert(CustomFieldSlot::NumericLine3, def("Qty", "Units", true));
        let mut client = server.clone();
        client.defs.insert(CustomFieldSlot::SingleLine1, CustomFieldDef::default());
        assert!(server.diff(&client).is_empty());

        client.defs.insert(CustomFieldSlot::SingleLine1, def("Model", "", false));
        assert_eq!(server.diff(&client), vec!["single_line1"]);
    }

    #[test]
    fn diff_treats_missing_text_as_empty() {
        let a = ItemFieldValues {
            single_line1: None,
            numeric_line1: Some(1.5),
            ..Default::default()
        };
        let b = ItemFieldValues {
            single_line1: Some(String::new()),
            numeric_line1: Some(2.0),
            bool_line2: Some(false),
            ..Default::default()
        };
        assert_eq!(a.diff(&b), vec!["numeric_line1", "bool_line2"]);
    }

    #[test]
    fn normalized_trims_and_clears_blank_text() {
        let values = ItemFieldValues {
            single_line1: Some("  x ".into()),
            multi_line1: Some("   ".into()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(values.single_line1.as_deref(), Some("x"));
        assert_eq!(values.multi_line1, None);
    }

    #[test]
    fn set_json_uses_slot_keys() {
        let mut set = CustomFieldSet::default();
        set.defs.insert(CustomFieldSlot::MultiLine3, def("Notes", "Free text", true));
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["multi_line3"]["title"], "Notes");
        assert_eq!(serde_json::from_value::<CustomFieldSet>(json).unwrap(), set);
    }

    #[test]
    fn proto_set_keeps_only_present_slots() {
        let set: CustomFieldSet = pb::CustomFieldSet {
            numeric_line3: Some(pb::CustomFieldDef {
                title: " Qty ".into(),
                description: "Units".into(),
                position: Some(2),
                is_used: true,
            }),
            ..Default::default()
        }
        .into();
        assert_eq!(set.defs.len(), 1);
        assert_eq!(set.get(CustomFieldSlot::NumericLine3).unwrap().title, "Qty");
    }
}
