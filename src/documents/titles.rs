use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date};

/// Display names for the document types the generator offers.
const DOCUMENT_TITLES: &[(&str, &str)] = &[
    ("nda", "Non-Disclosure Agreement"),
    ("rent", "Rent Agreement"),
    ("partnership", "Partnership Agreement"),
    ("employment", "Employment Contract"),
    ("lease", "Lease Agreement"),
    ("service", "Service Agreement"),
    ("custom", "Custom Document"),
];

pub(crate) fn is_valid_document_type(slug: &str) -> bool {
    lazy_static! {
        static ref SLUG_RE: Regex = Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").unwrap();
    }
    SLUG_RE.is_match(slug)
}

/// Trimmed, lowercased slug; `None` when blank.
pub(crate) fn normalize_document_type(raw: &str) -> Option<String> {
    let slug = raw.trim().to_lowercase();
    (!slug.is_empty()).then_some(slug)
}

pub fn display_name(document_type: &str) -> Option<&'static str> {
    DOCUMENT_TITLES
        .iter()
        .find(|(slug, _)| *slug == document_type)
        .map(|(_, name)| *name)
}

pub fn generation_title(document_type: &str, party_name: Option<&str>) -> String {
    let name = match display_name(document_type) {
        Some(name) => name,
        None if document_type.is_empty() => "Document",
        None => document_type,
    };
    let party = party_name
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or("New Document");
    format!("{name} - {party}")
}

pub fn scan_title(date: Date) -> String {
    let fmt = format_description!("[year]-[month]-[day]");
    let day = date
        .format(&fmt)
        .unwrap_or_else(|_| date.to_string());
    format!("Scanned Document - {day}")
}
