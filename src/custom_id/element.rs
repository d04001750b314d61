//! Typed elements of a custom-ID template.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::date_format;
use super::GenerationContext;

/// Radix used to render random numeric elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Radix {
    Binary,
    Octal,
    #[default]
    Decimal,
    Hexadecimal,
}

impl Radix {
    pub fn base(self) -> u64 {
        match self {
            Radix::Binary => 2,
            Radix::Octal => 8,
            Radix::Decimal => 10,
            Radix::Hexadecimal => 16,
        }
    }

    /// Parses the wire form (`"2"`, `"8"`, `"10"`, `"16"`). Anything else is decimal.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "2" => Radix::Binary,
            "8" => Radix::Octal,
            "16" => Radix::Hexadecimal,
            _ => Radix::Decimal,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Radix::Binary => "2",
            Radix::Octal => "8",
            Radix::Decimal => "10",
            Radix::Hexadecimal => "16",
        }
    }

    /// Regex character class of the digits this radix renders.
    pub fn digit_class(self) -> &'static str {
        match self {
            Radix::Binary => "[01]",
            Radix::Octal => "[0-7]",
            Radix::Decimal => "[0-9]",
            Radix::Hexadecimal => "[0-9a-f]",
        }
    }

    /// Renders `value` in this radix, lowercase digits.
    pub fn render(self, value: u64) -> String {
        match self {
            Radix::Binary => format!("{:b}", value),
            Radix::Octal => format!("{:o}", value),
            Radix::Decimal => value.to_string(),
            Radix::Hexadecimal => format!("{:x}", value),
        }
    }
}

/// Radix and optional left-padding character of a random numeric element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NumericFormat {
    #[serde(default)]
    pub radix: Radix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_char: Option<char>,
}

/// What an element generates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ElementKind {
    FixedText {
        text: String,
    },
    Guid,
    Bit20(NumericFormat),
    Bit32(NumericFormat),
    Digit6(NumericFormat),
    Digit9(NumericFormat),
    DateTime {
        format: String,
    },
    /// Per-inventory counter; `width` > 0 left-pads with `padding_char`.
    Sequential {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        padding_char: Option<char>,
        #[serde(default)]
        width: u8,
    },
}

pub const DEFAULT_DATE_TIME_FORMAT: &str = "yyyy";

impl ElementKind {
    /// Wire name of the element type.
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::FixedText { .. } => "FixedText",
            ElementKind::Guid => "Guid",
            ElementKind::Bit20(_) => "Bit20",
            ElementKind::Bit32(_) => "Bit32",
            ElementKind::Digit6(_) => "Digit6",
            ElementKind::Digit9(_) => "Digit9",
            ElementKind::DateTime { .. } => "DateTime",
            ElementKind::Sequential { .. } => "Sequential",
        }
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, ElementKind::Sequential { .. })
    }

    /// Padded width of a random numeric element for its radix, per element kind.
    pub fn padded_width(&self) -> Option<usize> {
        match self {
            ElementKind::Bit20(f) => Some(match f.radix {
                Radix::Binary => 20,
                Radix::Octal => 7,
                Radix::Decimal => 7,
                Radix::Hexadecimal => 5,
            }),
            ElementKind::Bit32(f) => Some(match f.radix {
                Radix::Binary => 32,
                Radix::Octal => 11,
                Radix::Decimal => 10,
                Radix::Hexadecimal => 8,
            }),
            ElementKind::Digit6(_) => Some(6),
            ElementKind::Digit9(_) => Some(9),
            _ => None,
        }
    }

    /// Exclusive upper bound of the random value drawn by a numeric element.
    fn value_bound(&self) -> Option<u64> {
        match self {
            ElementKind::Bit20(_) => Some(1 << 20),
            ElementKind::Bit32(_) => Some(1 << 32),
            ElementKind::Digit6(f) => Some(f.radix.base().pow(6)),
            ElementKind::Digit9(f) => Some(f.radix.base().pow(9)),
            _ => None,
        }
    }

    fn numeric_format(&self) -> Option<NumericFormat> {
        match self {
            ElementKind::Bit20(f)
            | ElementKind::Bit32(f)
            | ElementKind::Digit6(f)
            | ElementKind::Digit9(f) => Some(*f),
            _ => None,
        }
    }

    /// Regex fragment matching what this element generates. Sequential
    /// elements match as a plain digit run; callers capture the counter.
    pub fn regex_fragment(&self) -> String {
        match self {
            ElementKind::FixedText { text } => regex::escape(text),
            ElementKind::Guid => {
                "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}".to_string()
            }
            ElementKind::DateTime { format } => date_format::regex_fragment(format),
            ElementKind::Sequential { .. } => "[0-9]+".to_string(),
            _ => match (self.numeric_format(), self.padded_width()) {
                (Some(format), Some(width)) => match format.padding_char {
                    Some(pad) if pad.is_ascii_digit() => {
                        format!("{}{{{}}}", format.radix.digit_class(), width)
                    }
                    Some(pad) => format!(
                        "{}*{}+",
                        regex::escape(&pad.to_string()),
                        format.radix.digit_class()
                    ),
                    None => format!("{}{{1,{}}}", format.radix.digit_class(), width),
                },
                _ => ".*?".to_string(),
            },
        }
    }

    /// Generates the text of this element. Random kinds draw from `rng`,
    /// so a seeded source reproduces the same output.
    pub fn generate<R: Rng>(&self, rng: &mut R, ctx: &GenerationContext) -> String {
        match self {
            ElementKind::FixedText { text } => text.clone(),
            ElementKind::Guid => {
                let mut bytes = [0u8; 16];
                rng.fill(&mut bytes);
                uuid::Builder::from_random_bytes(bytes)
                    .into_uuid()
                    .to_string()
            }
            ElementKind::DateTime { format } => date_format::render(format, &ctx.now),
            ElementKind::Sequential { padding_char, width } => {
                let text = ctx.sequence.unwrap_or(1).to_string();
                match padding_char {
                    Some(pad) if *width > 0 => pad_left(text, *width as usize, *pad),
                    _ => text,
                }
            }
            _ => {
                let (Some(bound), Some(format)) = (self.value_bound(), self.numeric_format()) else {
                    return String::new();
                };
                let value = rng.gen_range(0..bound);
                let text = format.radix.render(value);
                match (format.padding_char, self.padded_width()) {
                    (Some(pad), Some(width)) => pad_left(text, width, pad),
                    _ => text,
                }
            }
        }
    }
}

fn pad_left(text: String, width: usize, pad: char) -> String {
    let len = text.chars().count();
    if len >= width {
        return text;
    }
    let mut out: String = std::iter::repeat(pad).take(width - len).collect();
    out.push_str(&text);
    out
}

/// One positioned, separator-wrapped unit of a custom-ID template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    #[serde(flatten)]
    pub kind: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator_before: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator_after: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i16>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            separator_before: None,
            separator_after: None,
            position: None,
        }
    }

    pub fn with_separators(mut self, before: Option<char>, after: Option<char>) -> Self {
        self.separator_before = before;
        self.separator_after = after;
        self
    }

    pub fn at(mut self, position: i16) -> Self {
        self.position = Some(position);
        self
    }
}

/// Loosely-typed element descriptor as it arrives from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementInput {
    pub element_type: String,
    pub separator_before: String,
    pub separator_after: String,
    pub fixed_text: String,
    pub date_time_format: String,
    pub padding_char: String,
    pub radix: String,
    pub position: Option<i32>,
    pub width: i32,
}

/// First character of `s`, or `None` for an empty string.
pub fn parse_char(s: &str) -> Option<char> {
    s.chars().next()
}

impl ElementInput {
    /// Builds a typed element. Unknown types yield `None` and are dropped by callers.
    pub fn into_element(self) -> Option<Element> {
        let numeric = NumericFormat {
            radix: Radix::parse(&self.radix),
            padding_char: parse_char(&self.padding_char),
        };
        let kind = match self.element_type.as_str() {
            "FixedText" => ElementKind::FixedText {
                text: self.fixed_text,
            },
            "Guid" => ElementKind::Guid,
            "Bit20" => ElementKind::Bit20(numeric),
            "Bit32" => ElementKind::Bit32(numeric),
            "Digit6" => ElementKind::Digit6(numeric),
            "Digit9" => ElementKind::Digit9(numeric),
            "DateTime" => ElementKind::DateTime {
                format: if self.date_time_format.trim().is_empty() {
                    DEFAULT_DATE_TIME_FORMAT.to_string()
                } else {
                    self.date_time_format
                },
            },
            "Sequential" => ElementKind::Sequential {
                padding_char: numeric.padding_char,
                width: self.width.clamp(0, u8::MAX as i32) as u8,
            },
            _ => return None,
        };
        Some(Element {
            kind,
            separator_before: parse_char(&self.separator_before),
            separator_after: parse_char(&self.separator_after),
            position: self
                .position
                .map(|p| p.clamp(i16::MIN as i32, i16::MAX as i32) as i16),
        })
    }

    pub fn from_element(element: &Element) -> Self {
        let mut input = ElementInput {
            element_type: element.kind.type_name().to_string(),
            separator_before: element.separator_before.map(String::from).unwrap_or_default(),
            separator_after: element.separator_after.map(String::from).unwrap_or_default(),
            position: element.position.map(i32::from),
            ..Default::default()
        };
        match &element.kind {
            ElementKind::FixedText { text } => input.fixed_text = text.clone(),
            ElementKind::DateTime { format } => input.date_time_format = format.clone(),
            ElementKind::Sequential { padding_char, width } => {
                input.padding_char = padding_char.map(String::from).unwrap_or_default();
                input.width = i32::from(*width);
            }
            ElementKind::Guid => {}
            ElementKind::Bit20(f)
            | ElementKind::Bit32(f)
            | ElementKind::Digit6(f)
            | ElementKind::Digit9(f) => {
                input.padding_char = f.padding_char.map(String::from).unwrap_or_default();
                input.radix = f.radix.as_wire().to_string();
            }
        }
        input
    }
}
