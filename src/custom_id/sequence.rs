//! Per-inventory sequence numbers for templates with a `Sequential` element.

use regex::Regex;

use super::element::{Element, ElementKind};
use super::CustomIdError;

/// Builds the pattern that extracts the sequential segment from identifiers
/// generated by `ordered` elements. Returns `None` when the template has no
/// sequential element.
pub fn pattern(ordered: &[&Element]) -> Result<Option<Regex>, CustomIdError> {
    if !ordered.iter().any(|e| e.kind.is_sequential()) {
        return Ok(None);
    }

    let mut sb = String::from("^");
    let mut captured = false;
    for element in ordered {
        if let Some(sep) = element.separator_before {
            sb.push_str(&regex::escape(&sep.to_string()));
        }
        match &element.kind {
            ElementKind::Sequential { padding_char, width } if !captured => {
                sb.push_str(&counter_capture(*padding_char, *width));
                captured = true;
            }
            kind => sb.push_str(&kind.regex_fragment()),
        }
        if let Some(sep) = element.separator_after {
            sb.push_str(&regex::escape(&sep.to_string()));
        }
    }
    sb.push('$');

    Regex::new(&sb)
        .map(Some)
        .map_err(|e| CustomIdError::Pattern(e.to_string()))
}

/// Capture group for the counter. A zero-padded counter is at least `width`
/// digits; other padding characters are skipped before the digits.
fn counter_capture(padding_char: Option<char>, width: u8) -> String {
    match padding_char {
        Some(pad) if width > 0 && pad.is_ascii_digit() => format!("([0-9]{{{},}})", width),
        Some(pad) if width > 0 => format!("{}*([0-9]+)", regex::escape(&pad.to_string())),
        _ => "([0-9]+)".to_string(),
    }
}

/// Next counter value: one past the largest sequential segment found in
/// `existing`, or 1 when nothing matches. Order of `existing` is irrelevant.
pub fn next_value<'a, I>(pattern: &Regex, existing: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    let max = existing
        .into_iter()
        .filter(|id| !id.is_empty())
        .filter_map(|id| pattern.captures(id))
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    max.saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_id::element::{NumericFormat, Radix};
    use crate::custom_id::{CustomIdTemplate, GenerationContext};
    use chrono::{TimeZone, Utc};

    fn template() -> Vec<Element> {
        vec![
            Element::new(ElementKind::FixedText { text: "SF".into() }).with_separators(None, Some('-')),
            Element::new(ElementKind::DateTime {
                format: "yyyy".into(),
            })
            .with_separators(None, Some('-')),
            Element::new(ElementKind::Sequential {
                padding_char: Some('0'),
                width: 6,
            }),
        ]
    }

    #[test]
    fn no_pattern_without_sequential_element() {
        let elements = [Element::new(ElementKind::Guid)];
        let ordered: Vec<&Element> = elements.iter().collect();
        assert!(pattern(&ordered).unwrap().is_none());
    }

    #[test]
    fn extracts_and_increments_maximum() {
        let elements = template();
        let ordered: Vec<&Element> = elements.iter().collect();
        let re = pattern(&ordered).unwrap().unwrap();

        let existing = ["SF-2024-000481", "SF-2023-000017", "SF-2024-000002", "garbage", ""];
        assert_eq!(next_value(&re, existing.iter().copied()), 482);
    }

    #[test]
    fn result_does_not_depend_on_scan_order() {
        let elements = template();
        let ordered: Vec<&Element> = elements.iter().collect();
        let re = pattern(&ordered).unwrap().unwrap();

        let mut existing = vec!["SF-2024-000009", "SF-2024-000120", "SF-2024-000033"];
        let forward = next_value(&re, existing.iter().copied());
        existing.reverse();
        let backward = next_value(&re, existing.iter().copied());
        assert_eq!(forward, 121);
        assert_eq!(forward, backward);
    }

    #[test]
    fn starts_at_one() {
        let elements = template();
        let ordered: Vec<&Element> = elements.iter().collect();
        let re = pattern(&ordered).unwrap().unwrap();
        assert_eq!(next_value(&re, std::iter::empty()), 1);
    }

    #[test]
    fn fixed_text_must_match_literally() {
        let elements = vec![
            Element::new(ElementKind::FixedText { text: "A.B".into() }),
            Element::new(ElementKind::Sequential {
                padding_char: None,
                width: 0,
            })
            .with_separators(Some('-'), None),
        ];
        let ordered: Vec<&Element> = elements.iter().collect();
        let re = pattern(&ordered).unwrap().unwrap();
        assert_eq!(next_value(&re, ["A.B-7", "AXB-99"].iter().copied()), 8);
    }

    #[test]
    fn random_segments_match_their_width() {
        let elements = vec![
            Element::new(ElementKind::Bit20(NumericFormat {
                radix: Radix::Hexadecimal,
                padding_char: Some('0'),
            }))
            .with_separators(None, Some('_')),
            Element::new(ElementKind::Sequential {
                padding_char: None,
                width: 0,
            }),
        ];
        let ordered: Vec<&Element> = elements.iter().collect();
        let re = pattern(&ordered).unwrap().unwrap();
        assert_eq!(next_value(&re, ["0a1f3_4", "ffff0_12"].iter().copied()), 13);
    }

    fn next_after_first(template: &CustomIdTemplate, seed: u64) -> (String, u64) {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let ctx = GenerationContext { now, sequence: None }.with_sequence(1);
        let first = template.generate_seeded(seed, &ctx);
        let re = template.sequence_pattern().unwrap().unwrap();
        let next = next_value(&re, std::iter::once(first.as_str()));
        (first, next)
    }

    #[test]
    fn counter_followed_by_padded_digits() {
        let template = CustomIdTemplate::new(vec![
            Element::new(ElementKind::Sequential {
                padding_char: None,
                width: 0,
            }),
            Element::new(ElementKind::Digit6(NumericFormat {
                radix: Radix::Decimal,
                padding_char: Some('0'),
            })),
        ]);
        for seed in 0..20 {
            let (first, next) = next_after_first(&template, seed);
            assert_eq!(next, 2, "first id {}", first);
        }
    }

    #[test]
    fn counter_after_unseparated_date() {
        let template = CustomIdTemplate::new(vec![
            Element::new(ElementKind::FixedText { text: "INV".into() }),
            Element::new(ElementKind::DateTime {
                format: "yyyy".into(),
            }),
            Element::new(ElementKind::Sequential {
                padding_char: None,
                width: 0,
            }),
        ]);
        let (first, next) = next_after_first(&template, 0);
        assert_eq!(first, "INV20241");
        assert_eq!(next, 2);
    }

    #[test]
    fn padded_counter_next_to_hex_segment() {
        let template = CustomIdTemplate::new(vec![
            Element::new(ElementKind::Bit20(NumericFormat {
                radix: Radix::Hexadecimal,
                padding_char: Some('0'),
            })),
            Element::new(ElementKind::Sequential {
                padding_char: Some('0'),
                width: 3,
            }),
        ]);
        let re = template.sequence_pattern().unwrap().unwrap();
        assert_eq!(next_value(&re, ["0a1f3041", "99999120"].iter().copied()), 121);
    }
}
