//! Date fields carrying a machine-readable `value` attribute.

use chrono::NaiveDate;

use crate::tree::{NodeId, XmlTree};

use super::fields::InfoNode;

/// A `date` element: the optional parsed `value` attribute plus the display
/// text shown to readers. Only the attribute is normalized on store; display
/// text survives as written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateValue {
    pub value: Option<NaiveDate>,
    pub display: Option<String>,
}

impl DateValue {
    /// Both the attribute and the display text from one timestamp.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            value: Some(date),
            display: Some(date.format("%Y-%m-%d").to_string()),
        }
    }
}

impl InfoNode for DateValue {
    fn load(tree: &XmlTree, element: NodeId) -> Self {
        let value = tree.attr(element, "value").and_then(parse_date_value);
        let text = tree.inner_text(element);
        let display = if text.is_empty() {
            value.map(|date| date.format("%Y-%m-%d").to_string())
        } else {
            Some(text)
        };
        Self { value, display }
    }

    fn store(&self, tree: &mut XmlTree, parent: NodeId, tag: &str) {
        if self.is_empty() {
            return;
        }
        let element = tree.new_element(tag);
        if let Some(value) = self.value {
            tree.set_attr(element, "value", &value.format("%Y-%m-%d").to_string());
        }
        if let Some(display) = self.display.as_deref()
            && !display.is_empty()
        {
            tree.set_element_text(element, display);
        }
        tree.append(parent, element);
    }

    fn is_empty(&self) -> bool {
        self.value.is_none() && self.display.as_deref().is_none_or(str::is_empty)
    }
}

/// Parse a `yyyy-MM-dd` date, tolerating a leading sign and a trailing zone
/// designator.
pub(crate) fn parse_date_value(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    let date_part = rest.get(..10)?;
    let zone = &rest[10..];
    if !zone.is_empty() && !is_zone_designator(zone) {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Parse a four-digit year with the same sign and zone tolerance.
pub(crate) fn parse_year(text: &str) -> Option<i32> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix(['+', '-']).unwrap_or(trimmed);
    let year_part = rest.get(..4)?;
    let zone = &rest[4..];
    if !year_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !zone.is_empty() && !is_zone_designator(zone) {
        return None;
    }
    year_part.parse().ok()
}

fn is_zone_designator(zone: &str) -> bool {
    let bytes = zone.as_bytes();
    bytes.len() == 6
        && (bytes[0] == b'+' || bytes[0] == b'-')
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
        && bytes[3] == b':'
        && bytes[4].is_ascii_digit()
        && bytes[5].is_ascii_digit()
}
