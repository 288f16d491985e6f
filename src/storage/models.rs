use chrono::{ DateTime, TimeZone, Utc };
use time::OffsetDateTime;

/// One entry of a path listing, relative to the container root.
#[derive(Debug, Clone, PartialEq)]
pub struct PathItem {
    pub name: String,
    pub is_directory: bool,
    pub content_length: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl PathItem {
    /// Last path segment, e.g. `a.csv` for `raw/2024/a.csv`.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Directory holding this entry, relative to the container. Empty at the root.
    pub fn parent(&self) -> &str {
        self.name.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
    }
}

pub(crate) fn to_chrono(value: OffsetDateTime) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(value.unix_timestamp(), value.nanosecond()).single()
}

/// Splits `raw/2024/a.csv` into `("raw/2024", "a.csv")`.
pub(crate) fn split_parent(path: &str) -> (&str, &str) {
    let path = path.trim_matches('/');
    path.rsplit_once('/').unwrap_or(("", path))
}
