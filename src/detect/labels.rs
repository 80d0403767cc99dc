//! Display names for raw detector labels.

/// Shown for objects whose detector reported no usable label.
pub const UNKNOWN_LABEL: &str = "Ismeretlen";

const LABEL_TABLE: &[(&str, &str)] = &[
    ("Fashion good", "Divatcikk"),
    ("Food", "Étel"),
    ("Home good", "Háztartási cikk"),
    ("Place", "Hely"),
    ("Plant", "Növény"),
];

/// Remap a raw label through the fixed table.
///
/// Labels missing from the table pass through unchanged; a missing or blank
/// label becomes `UNKNOWN_LABEL`.
pub fn display_label(raw: Option<&str>) -> String {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return UNKNOWN_LABEL.to_string();
    };
    LABEL_TABLE
        .iter()
        .find(|(from, _)| *from == raw)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| raw.to_string())
}
