//! Session directory data model: sessions, their public summaries, and query filters.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::directory::JOIN_CODE_KEY;
use crate::server::types::{AllocationId, PlayerId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// Parameters of a session to advertise.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSession {
    #[serde(default)]
    pub name: Option<String>,
    pub capacity: u32,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Relay allocation backing the advertised join code. Set by the service
    /// after the host's claim on the code has been checked, never by clients.
    #[serde(skip)]
    pub allocation: Option<AllocationId>,
}

/// An advertised, joinable session. Owned by the directory.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub capacity: u32,
    pub visibility: Visibility,
    pub host: PlayerId,
    pub metadata: BTreeMap<String, String>,
    pub allocation: Option<AllocationId>,
    /// Connected peers, host included.
    pub members: BTreeSet<PlayerId>,
    /// Wall-clock creation time, milliseconds since the Unix epoch.
    pub created_at_ms: u64,
    /// Monotonic creation order, used to sort newest first.
    pub created_seq: u64,
    pub last_heartbeat: Instant,
    /// Client timestamp of the last accepted heartbeat.
    pub last_heartbeat_stamp: Option<u64>,
    /// Set when the session's relay allocation is known to be gone.
    pub stale: bool,
}

impl Session {
    pub fn occupancy(&self) -> u32 {
        self.members.len() as u32
    }

    pub fn available_slots(&self) -> u32 {
        self.capacity.saturating_sub(self.occupancy())
    }

    /// True once the host has been silent for strictly longer than `timeout`.
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat) > timeout
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            name: self.name.clone(),
            capacity: self.capacity,
            occupancy: self.occupancy(),
            available_slots: self.available_slots(),
            visibility: self.visibility,
            host: self.host.clone(),
            metadata: self.metadata.clone(),
            allocation_id: self.allocation,
            created_at_ms: self.created_at_ms,
        }
    }
}

/// Read-only view of a session, as returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: String,
    pub capacity: u32,
    pub occupancy: u32,
    pub available_slots: u32,
    pub visibility: Visibility,
    pub host: PlayerId,
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_id: Option<AllocationId>,
    pub created_at_ms: u64,
}

impl SessionSummary {
    pub fn join_code(&self) -> Option<&str> {
        self.metadata.get(JOIN_CODE_KEY).map(String::as_str)
    }
}

/// Field a filter applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FilterField {
    Capacity,
    AvailableSlots,
    Visibility,
    Name,
    /// Custom metadata entry, written `meta.<key>`.
    Metadata(String),
}

impl FromStr for FilterField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "capacity" | "max_players" => Ok(FilterField::Capacity),
            "available_slots" => Ok(FilterField::AvailableSlots),
            "visibility" => Ok(FilterField::Visibility),
            "name" => Ok(FilterField::Name),
            other => match other.strip_prefix("meta.") {
                Some(key) if !key.is_empty() => Ok(FilterField::Metadata(key.to_string())),
                _ => Err(format!("unknown filter field '{other}'")),
            },
        }
    }
}

impl TryFrom<String> for FilterField {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FilterField> for String {
    fn from(field: FilterField) -> Self {
        field.to_string()
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterField::Capacity => f.write_str("capacity"),
            FilterField::AvailableSlots => f.write_str("available_slots"),
            FilterField::Visibility => f.write_str("visibility"),
            FilterField::Name => f.write_str("name"),
            FilterField::Metadata(key) => write!(f, "meta.{key}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Ge,
    Le,
    Eq,
    Contains,
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ge" | ">=" => Ok(FilterOp::Ge),
            "le" | "<=" => Ok(FilterOp::Le),
            "eq" | "=" => Ok(FilterOp::Eq),
            "contains" => Ok(FilterOp::Contains),
            other => Err(format!("unknown filter operator '{other}'")),
        }
    }
}

/// One `(field, operator, value)` triple. A query matches when all of its filters match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    pub field: FilterField,
    pub op: FilterOp,
    pub value: String,
}

impl SessionFilter {
    pub fn new(field: FilterField, op: FilterOp, value: impl Into<String>) -> Self {
        Self {
            field,
            op,
            value: value.into(),
        }
    }

    /// Parse the `field:op:value` form used in query strings.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut parts = raw.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(field), Some(op), Some(value)) => Ok(Self {
                field: field.parse()?,
                op: op.parse()?,
                value: value.to_string(),
            }),
            _ => Err(format!("filter '{raw}' is not of the form field:op:value")),
        }
    }

    pub fn matches(&self, session: &SessionSummary) -> bool {
        match &self.field {
            FilterField::Capacity => self.compare_number(session.capacity),
            FilterField::AvailableSlots => self.compare_number(session.available_slots),
            FilterField::Visibility => self.compare_text(session.visibility.as_str()),
            FilterField::Name => self.compare_text(&session.name),
            FilterField::Metadata(key) => match session.metadata.get(key) {
                Some(value) => self.compare_text(value),
                None => false,
            },
        }
    }

    fn compare_number(&self, actual: u32) -> bool {
        match self.value.trim().parse::<i64>() {
            Ok(expected) => self.accept(i64::from(actual).cmp(&expected)),
            Err(_) => self.op == FilterOp::Contains && actual.to_string().contains(&self.value),
        }
    }

    fn compare_text(&self, actual: &str) -> bool {
        if self.op == FilterOp::Contains {
            return actual.contains(self.value.as_str());
        }
        // Numeric metadata compares as numbers.
        let ordering = match (actual.trim().parse::<i64>(), self.value.trim().parse::<i64>()) {
            (Ok(a), Ok(b)) => a.cmp(&b),
            _ => actual.cmp(self.value.as_str()),
        };
        self.accept(ordering)
    }

    fn accept(&self, ordering: Ordering) -> bool {
        match self.op {
            FilterOp::Ge => ordering != Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
            FilterOp::Eq | FilterOp::Contains => ordering == Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn summary(capacity: u32, occupancy: u32) -> SessionSummary {
        let mut metadata = BTreeMap::new();
        metadata.insert("mode".to_string(), "free-for-all".to_string());
        metadata.insert("level".to_string(), "9".to_string());
        SessionSummary {
            id: Uuid::new_v4(),
            name: "Friday night".to_string(),
            capacity,
            occupancy,
            available_slots: capacity - occupancy,
            visibility: Visibility::Public,
            host: "host".to_string(),
            metadata,
            allocation_id: None,
            created_at_ms: 0,
        }
    }

    #[test]
    fn parses_query_string_filters() {
        let filter = SessionFilter::parse("capacity:ge:10").unwrap();
        assert_eq!(filter.field, FilterField::Capacity);
        assert_eq!(filter.op, FilterOp::Ge);
        assert_eq!(filter.value, "10");

        let filter = SessionFilter::parse("meta.mode:contains:free:all").unwrap();
        assert_eq!(filter.field, FilterField::Metadata("mode".into()));
        assert_eq!(filter.value, "free:all");

        assert!(SessionFilter::parse("capacity:ge").is_err());
        assert!(SessionFilter::parse("colour:eq:red").is_err());
        assert!(SessionFilter::parse("capacity:gt:3").is_err());
    }

    #[test]
    fn numeric_fields_compare_as_numbers() {
        let s = summary(20, 3);
        assert!(SessionFilter::new(FilterField::Capacity, FilterOp::Ge, "10").matches(&s));
        assert!(SessionFilter::new(FilterField::Capacity, FilterOp::Ge, "20").matches(&s));
        assert!(!SessionFilter::new(FilterField::Capacity, FilterOp::Ge, "21").matches(&s));
        assert!(SessionFilter::new(FilterField::AvailableSlots, FilterOp::Le, "17").matches(&s));
        assert!(SessionFilter::new(FilterField::Capacity, FilterOp::Eq, "20").matches(&s));
    }

    #[test]
    fn metadata_and_text_filters() {
        let s = summary(4, 1);
        assert!(SessionFilter::new(FilterField::Metadata("mode".into()), FilterOp::Contains, "all").matches(&s));
        assert!(!SessionFilter::new(FilterField::Metadata("missing".into()), FilterOp::Eq, "x").matches(&s));
        // "9" >= "10" is false numerically even though it is true lexically.
        assert!(!SessionFilter::new(FilterField::Metadata("level".into()), FilterOp::Ge, "10").matches(&s));
        assert!(SessionFilter::new(FilterField::Visibility, FilterOp::Eq, "public").matches(&s));
        assert!(SessionFilter::new(FilterField::Name, FilterOp::Contains, "Friday").matches(&s));
    }

    #[test]
    fn filter_deserializes_from_json() {
        let json = r#"{"field":"meta.region","op":"eq","value":"eu"}"#;
        let filter: SessionFilter = serde_json::from_str(json).unwrap();
        assert_eq!(filter.field, FilterField::Metadata("region".into()));
        assert_eq!(serde_json::to_string(&filter).unwrap(), json);
    }
}
