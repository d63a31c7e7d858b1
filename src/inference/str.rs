//! Recognition of strings whose content has a narrower shape than "string".

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::attributes::{DateTimeAttributes, TypeAttributes, UriAttributes};
use crate::ir::PrimitiveKind;

static INTEGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?(0|[1-9][0-9]*)$").unwrap());

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").unwrap()
});

static URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Za-z][A-Za-z0-9+.\-]*://|mailto:|tel:|urn:)[^\s]+$").unwrap());

/// `hh:mm:ss[.fff]` followed by an optional `Z` or `±hh:mm` offset.
static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}:\d{2}:\d{2}(?:\.\d+)?)(Z|z|[+\-]\d{2}:\d{2})?$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StringFormat {
    Date,
    Time,
    DateTime,
    Uuid,
    Uri,
    IntegerString,
    BoolString,
}

impl StringFormat {
    pub const ALL: [StringFormat; 7] = [
        StringFormat::Date,
        StringFormat::Time,
        StringFormat::DateTime,
        StringFormat::Uuid,
        StringFormat::Uri,
        StringFormat::IntegerString,
        StringFormat::BoolString,
    ];

    pub fn primitive(self) -> PrimitiveKind {
        match self {
            StringFormat::Date => PrimitiveKind::Date,
            StringFormat::Time => PrimitiveKind::Time,
            StringFormat::DateTime => PrimitiveKind::DateTime,
            StringFormat::Uuid => PrimitiveKind::Uuid,
            StringFormat::Uri => PrimitiveKind::Uri,
            StringFormat::IntegerString => PrimitiveKind::IntegerString,
            StringFormat::BoolString => PrimitiveKind::BoolString,
        }
    }

    /// The key stored in the value store's string table.
    pub fn name(self) -> &'static str {
        self.primitive().name()
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Map a JSON Schema `format` keyword onto a recognized format.
    pub fn from_schema_format(format: &str) -> Option<Self> {
        match format {
            "date" => Some(StringFormat::Date),
            "time" => Some(StringFormat::Time),
            "date-time" => Some(StringFormat::DateTime),
            "uuid" => Some(StringFormat::Uuid),
            "uri" => Some(StringFormat::Uri),
            "integer" => Some(StringFormat::IntegerString),
            "boolean" => Some(StringFormat::BoolString),
            _ => None,
        }
    }

    /// Formats whose samples carry attributes worth keeping.
    ///
    /// Values in these formats are stored with their raw text; the others only
    /// record which format they were.
    pub fn has_attribute_producer(self) -> bool {
        matches!(self, StringFormat::Time | StringFormat::DateTime | StringFormat::Uri)
    }

    /// Attributes contributed by one sampled string of this format.
    pub fn produce_attributes(self, raw: &str) -> TypeAttributes {
        match self {
            StringFormat::Uri => TypeAttributes {
                uri: Some(uri_attributes(raw)),
                ..TypeAttributes::default()
            },
            StringFormat::DateTime | StringFormat::Time => TypeAttributes {
                date_time: Some(DateTimeAttributes { always_offset: has_offset(self, raw) }),
                ..TypeAttributes::default()
            },
            _ => TypeAttributes::default(),
        }
    }
}

/// Infer the narrowest recognized format for `s`, if any.
pub fn recognize(s: &str) -> Option<StringFormat> {
    if s == "true" || s == "false" {
        return Some(StringFormat::BoolString);
    }
    if INTEGER_RE.is_match(s) && s.parse::<i64>().is_ok() {
        return Some(StringFormat::IntegerString);
    }
    if UUID_RE.is_match(s) {
        return Some(StringFormat::Uuid);
    }
    if is_date_time(s) {
        return Some(StringFormat::DateTime);
    }
    if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
        return Some(StringFormat::Date);
    }
    if is_time(s) {
        return Some(StringFormat::Time);
    }
    if looks_like_uri(s) {
        return Some(StringFormat::Uri);
    }
    None
}

fn is_date_time(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

fn is_time(s: &str) -> bool {
    TIME_RE
        .captures(s)
        .and_then(|c| c.get(1))
        .is_some_and(|t| NaiveTime::parse_from_str(t.as_str(), "%H:%M:%S%.f").is_ok())
}

fn has_offset(format: StringFormat, raw: &str) -> bool {
    match format {
        StringFormat::DateTime => DateTime::parse_from_rfc3339(raw).is_ok(),
        StringFormat::Time => TIME_RE.captures(raw).is_some_and(|c| c.get(2).is_some()),
        _ => false,
    }
}

pub fn looks_like_uri(s: &str) -> bool {
    URI_RE.is_match(s) && url::Url::parse(s).is_ok()
}

fn uri_attributes(raw: &str) -> UriAttributes {
    let mut attrs = UriAttributes::default();
    let Ok(url) = url::Url::parse(raw) else {
        return attrs;
    };
    attrs.schemes.insert(url.scheme().to_ascii_lowercase());
    let last = url.path_segments().and_then(|segs| segs.last()).unwrap_or("");
    if let Some((stem, ext)) = last.rsplit_once('.') {
        if !stem.is_empty() && !ext.is_empty() {
            attrs.extensions.insert(format!(".{}", ext.to_ascii_lowercase()));
        }
    }
    attrs
}
