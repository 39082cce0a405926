//! Annotation tags attached to a field through the third header row
//!
//! Tags are free-form strings, conventionally `Key:Value`. The keys below are
//! the ones the compiler understands; anything else is carried through for
//! downstream generators.

use serde::Serialize;

pub const DEFAULT: &str = "Default";
pub const LIST_SEPARATOR: &str = "ListSeparator";
pub const MAP_SEPARATOR: &str = "MapSeparator";
pub const DATE_FORMAT: &str = "DateFormat";
pub const CHECK_REPEAT: &str = "CheckRepeat";
pub const CHECK_LINK: &str = "CheckLink";

static NO_TAGS: Tags = Tags(Vec::new());

/// Ordered, de-duplicated list of annotation tags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tags(Vec<String>);

impl Tags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Tags::default();
        for tag in tags {
            out.push(tag.into());
        }
        out
    }

    /// Parse the semicolon-separated header cell
    pub fn parse(text: &str) -> Self {
        Self::new(text.split(';').map(str::trim).filter(|t| !t.is_empty()))
    }

    /// Shared empty tag set
    pub fn none() -> &'static Tags {
        &NO_TAGS
    }

    fn push(&mut self, tag: String) {
        if !self.0.contains(&tag) {
            self.0.push(tag);
        }
    }

    /// Add every tag of `other` not already present
    pub fn union(&mut self, other: &Tags) {
        for tag in &other.0 {
            self.push(tag.clone());
        }
    }

    /// Payload of the first `Key:payload` tag
    pub fn value(&self, key: &str) -> Option<&str> {
        self.0.iter().find_map(|tag| payload(tag, key))
    }

    /// Payloads of every `Key:payload` tag, in order
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter().filter_map(move |tag| payload(tag, key))
    }

    /// Whether a bare flag tag (no payload) is present
    pub fn has(&self, flag: &str) -> bool {
        self.0.iter().any(|t| t == flag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Every `CheckLink:` target declared on the field
    pub fn links(&self) -> impl Iterator<Item = Result<LinkSpec, String>> + '_ {
        self.values(CHECK_LINK)
            .map(|payload| LinkSpec::parse(payload).ok_or_else(|| payload.to_string()))
    }
}

fn payload<'t>(tag: &'t str, key: &str) -> Option<&'t str> {
    tag.strip_prefix(key)?.strip_prefix(':')
}

/// Target of a `CheckLink:<table>_<field>[_<ignore,...>]` tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub table: String,
    pub field: String,
    /// Values accepted without a matching target row
    pub ignores: Vec<String>,
}

impl LinkSpec {
    pub fn parse(payload: &str) -> Option<Self> {
        let mut parts = payload.trim().splitn(3, '_');
        let table = parts.next().filter(|s| !s.is_empty())?;
        let field = parts.next().filter(|s| !s.is_empty())?;
        let ignores = parts
            .next()
            .map(|rest| rest.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();
        Some(Self {
            table: table.to_string(),
            field: field.to_string(),
            ignores,
        })
    }

    pub fn is_ignored(&self, value: &str) -> bool {
        self.ignores.iter().any(|i| i == value)
    }
}
