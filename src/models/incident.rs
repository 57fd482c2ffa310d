use crate::error::{AppError, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use strum::EnumString;
use uuid::Uuid;

/// Fields the repository owns; caller input never overrides them
const RESERVED_FIELDS: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// Represents an incident record as stored and returned on the wire
///
/// Known fields are typed when they carry the expected JSON type. A known
/// field holding anything else is kept verbatim in `extra` under its own
/// name, so no payload is rejected for its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Incident {
    /// Opaque identifier, also the record's store key
    pub id: String,

    /// Caller phone number
    pub phone_number: Option<String>,

    /// Caller name as given on the call
    pub caller_name: Option<String>,

    /// Free-form location description
    pub location: Option<String>,

    /// Incident classification (fire, medical, ...)
    pub incident_type: Option<String>,

    /// Severity label
    pub severity: Option<String>,

    /// Operator handling the call
    pub operator_id: Option<String>,

    /// Caller/operator exchange, in insertion order
    pub transcript: Vec<TranscriptMessage>,

    /// Lifecycle status
    pub status: Option<IncidentStatus>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,

    /// Any other caller-supplied fields, kept verbatim
    pub extra: Map<String, Value>,
}

impl Incident {
    /// Build a new record from a caller payload, stamping id and timestamps
    pub fn from_payload(payload: NewIncident, now: DateTime<Utc>) -> Result<Self> {
        let mut fields = payload.0;
        let id = generate_incident_id(now);

        fields.insert("id".to_string(), Value::String(id));
        fields.insert("createdAt".to_string(), Value::String(timestamp::format(&now)));
        fields.insert("updatedAt".to_string(), Value::String(timestamp::format(&now)));

        Self::from_fields(fields)
    }

    /// Append a transcript message and refresh `updated_at`
    ///
    /// A stored `transcript` that is a list of non-object entries grows in
    /// place. One that is not a list at all cannot be appended to.
    pub fn append_message(&mut self, message: TranscriptMessage, now: DateTime<Utc>) -> Result<()> {
        match self.extra.get_mut("transcript") {
            None => self.transcript.push(message),
            Some(Value::Array(entries)) => entries.push(Value::from(message)),
            Some(_) => {
                return Err(AppError::Internal(format!(
                    "Transcript of incident {} is not a list",
                    self.id
                )))
            }
        }

        self.touch(now);
        Ok(())
    }

    /// Shallow-merge a patch onto this record
    ///
    /// Same-named fields are replaced wholesale, unspecified fields are kept.
    /// `id` and `createdAt` in the patch are ignored.
    pub fn merged_with(&self, patch: &IncidentPatch, now: DateTime<Utc>) -> Result<Self> {
        let mut fields = self.to_fields();

        for (key, value) in patch.fields() {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            fields.insert(key.clone(), value.clone());
        }

        let mut merged = Self::from_fields(fields)?;
        merged.touch(now);
        Ok(merged)
    }

    /// Check whether the status is literally `completed`
    pub fn is_completed(&self) -> bool {
        matches!(self.status, Some(IncidentStatus::Completed))
    }

    /// Check whether the record carries the given status string
    pub fn has_status(&self, status: &str) -> bool {
        self.status.as_ref().is_some_and(|s| s.as_str() == status)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        // updatedAt never moves backwards, even if the clock does
        self.updated_at = now.max(self.updated_at);
    }

    /// Convert to the JSON object stored in the key-value store
    pub fn to_fields(&self) -> Map<String, Value> {
        Map::from(self.clone())
    }

    /// Rebuild a record from its JSON object form
    ///
    /// Only the repository-owned fields are required: a string `id` and
    /// RFC 3339 `createdAt`/`updatedAt`.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self> {
        Self::try_from(fields)
            .map_err(|e| AppError::Validation(format!("Invalid incident fields: {}", e)))
    }
}

impl TryFrom<Map<String, Value>> for Incident {
    type Error = String;

    fn try_from(mut fields: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            _ => return Err("missing string field 'id'".to_string()),
        };
        let created_at = take_timestamp(&mut fields, "createdAt")?;
        let updated_at = take_timestamp(&mut fields, "updatedAt")?;

        Ok(Self {
            id,
            phone_number: take_string(&mut fields, "phoneNumber"),
            caller_name: take_string(&mut fields, "callerName"),
            location: take_string(&mut fields, "location"),
            incident_type: take_string(&mut fields, "incidentType"),
            severity: take_string(&mut fields, "severity"),
            operator_id: take_string(&mut fields, "operatorId"),
            transcript: take_transcript(&mut fields),
            status: take_string(&mut fields, "status").map(IncidentStatus::from),
            created_at,
            updated_at,
            extra: fields,
        })
    }
}

impl From<Incident> for Map<String, Value> {
    fn from(incident: Incident) -> Self {
        let mut fields = Map::new();

        fields.insert("id".to_string(), Value::String(incident.id));
        put_string(&mut fields, "phoneNumber", incident.phone_number);
        put_string(&mut fields, "callerName", incident.caller_name);
        put_string(&mut fields, "location", incident.location);
        put_string(&mut fields, "incidentType", incident.incident_type);
        put_string(&mut fields, "severity", incident.severity);
        put_string(&mut fields, "operatorId", incident.operator_id);
        fields.insert(
            "transcript".to_string(),
            Value::Array(incident.transcript.into_iter().map(Value::from).collect()),
        );
        put_string(&mut fields, "status", incident.status.map(String::from));
        fields.insert(
            "createdAt".to_string(),
            Value::String(timestamp::format(&incident.created_at)),
        );
        fields.insert(
            "updatedAt".to_string(),
            Value::String(timestamp::format(&incident.updated_at)),
        );

        // A verbatim value in `extra` wins over the typed default it displaced
        for (key, value) in incident.extra {
            if !RESERVED_FIELDS.contains(&key.as_str()) {
                fields.insert(key, value);
            }
        }

        fields
    }
}

/// Take a string field out of `fields`; any other JSON type is left in place
fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(value)) => Some(value),
        Some(Value::Null) | None => None,
        Some(other) => {
            fields.insert(key.to_string(), other);
            None
        }
    }
}

fn put_string(fields: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        fields.insert(key.to_string(), Value::String(value));
    }
}

fn take_timestamp(
    fields: &mut Map<String, Value>,
    key: &str,
) -> std::result::Result<DateTime<Utc>, String> {
    match fields.remove(key) {
        Some(Value::String(raw)) => timestamp::parse(&raw).map_err(|e| format!("{}: {}", key, e)),
        _ => Err(format!("missing string field '{}'", key)),
    }
}

/// A list of objects becomes typed messages; anything else stays verbatim
fn take_transcript(fields: &mut Map<String, Value>) -> Vec<TranscriptMessage> {
    match fields.remove("transcript") {
        Some(Value::Array(entries)) if entries.iter().all(Value::is_object) => entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(map) => Some(TranscriptMessage::from(map)),
                _ => None,
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            fields.insert("transcript".to_string(), other);
            Vec::new()
        }
    }
}

/// Incident lifecycle status
///
/// Any string other than the known ones is passed through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(from = "String", into = "String")]
pub enum IncidentStatus {
    Active,
    Completed,
    #[strum(default)]
    Other(String),
}

impl IncidentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            IncidentStatus::Active => "active",
            IncidentStatus::Completed => "completed",
            IncidentStatus::Other(s) => s,
        }
    }
}

impl From<String> for IncidentStatus {
    fn from(s: String) -> Self {
        IncidentStatus::from_str(&s).unwrap_or(IncidentStatus::Other(s))
    }
}

impl From<IncidentStatus> for String {
    fn from(status: IncidentStatus) -> Self {
        match status {
            IncidentStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an incident transcript
///
/// Any JSON object is accepted; `sender`, `message` and `timestamp` are typed
/// when they are strings and kept verbatim in `extra` otherwise.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct TranscriptMessage {
    pub sender: Option<String>,
    pub message: Option<String>,
    pub timestamp: Option<String>,
    pub extra: Map<String, Value>,
}

impl TranscriptMessage {
    pub fn new(
        sender: impl Into<String>,
        message: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            sender: Some(sender.into()),
            message: Some(message.into()),
            timestamp: Some(timestamp.into()),
            extra: Map::new(),
        }
    }
}

impl From<Map<String, Value>> for TranscriptMessage {
    fn from(mut fields: Map<String, Value>) -> Self {
        Self {
            sender: take_string(&mut fields, "sender"),
            message: take_string(&mut fields, "message"),
            timestamp: take_string(&mut fields, "timestamp"),
            extra: fields,
        }
    }
}

impl From<TranscriptMessage> for Map<String, Value> {
    fn from(message: TranscriptMessage) -> Self {
        let mut fields = Map::new();
        put_string(&mut fields, "sender", message.sender);
        put_string(&mut fields, "message", message.message);
        put_string(&mut fields, "timestamp", message.timestamp);
        fields.extend(message.extra);
        fields
    }
}

impl From<TranscriptMessage> for Value {
    fn from(message: TranscriptMessage) -> Self {
        Value::Object(Map::from(message))
    }
}

/// Caller payload for creating an incident: an arbitrary JSON object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewIncident(pub Map<String, Value>);

impl NewIncident {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

/// Partial update for an incident: an arbitrary JSON object merged shallowly
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentPatch(pub Map<String, Value>);

impl IncidentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// A patch that only moves the incident to `completed`
    pub fn complete() -> Self {
        Self::new().with("status", IncidentStatus::Completed.as_str())
    }

    /// Set a field, builder style
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// True iff the patch sets `status` to exactly the string `completed`
    pub fn completes(&self) -> bool {
        self.0.get("status").and_then(Value::as_str) == Some(IncidentStatus::Completed.as_str())
    }
}

/// Current time at the precision the wire format carries
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Generate an id of the form `incident_<unix-millis>_<9 base36 chars>`
///
/// Collisions are possible under very high creation rates and are not detected.
pub fn generate_incident_id(now: DateTime<Utc>) -> String {
    const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    let mut random = Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(9);
    for _ in 0..9 {
        suffix.push(ALPHABET[(random % 36) as usize] as char);
        random /= 36;
    }

    format!("incident_{}_{}", now.timestamp_millis(), suffix)
}

/// ISO-8601 timestamps with millisecond precision (`2026-10-15T10:00:00.000Z`)
pub mod timestamp {
    use chrono::{DateTime, ParseError, SecondsFormat, Utc};

    pub fn format(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
    }
}
