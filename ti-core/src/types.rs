use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const SPEC_VERSION: &str = "2.1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelObject {
  pub id: String,
  pub spec_version: String,
  pub created: String,
  pub modified: String,
  #[serde(flatten)]
  pub body: ObjectBody,
}

impl IntelObject {
  pub fn object_type(&self) -> &'static str {
    self.body.type_name()
  }

  pub fn updated_at(&self) -> Option<DateTime<Utc>> {
    parse_timestamp(&self.modified).or_else(|| parse_timestamp(&self.created))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ObjectBody {
  Indicator {
    name: String,
    description: String,
    pattern: String,
    pattern_type: String,
    valid_from: String,
    labels: Vec<String>,
    indicator_types: Vec<String>,
    confidence: u8,
  },
  Malware {
    name: String,
    description: String,
    is_family: bool,
    malware_types: Vec<String>,
  },
  AttackPattern {
    name: String,
    description: String,
    external_references: Vec<ExternalReference>,
  },
  ThreatActor {
    name: String,
    description: String,
    threat_actor_types: Vec<String>,
    aliases: Vec<String>,
  },
  Vulnerability {
    name: String,
    description: String,
    external_references: Vec<ExternalReference>,
  },
  Relationship {
    relationship_type: String,
    source_ref: String,
    target_ref: String,
  },
}

impl ObjectBody {
  pub fn type_name(&self) -> &'static str {
    match self {
      ObjectBody::Indicator { .. } => "indicator",
      ObjectBody::Malware { .. } => "malware",
      ObjectBody::AttackPattern { .. } => "attack-pattern",
      ObjectBody::ThreatActor { .. } => "threat-actor",
      ObjectBody::Vulnerability { .. } => "vulnerability",
      ObjectBody::Relationship { .. } => "relationship",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalReference {
  pub source_name: String,
  pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
  #[serde(rename = "type")]
  pub kind: String,
  pub id: String,
  pub generated_at: String,
  pub count: usize,
  pub stixobjects: Vec<IntelObject>,
}

impl Bundle {
  pub fn new(id: String, generated_at: DateTime<Utc>, stixobjects: Vec<IntelObject>) -> Self {
    Self {
      kind: "bundle".to_string(),
      id,
      generated_at: format_timestamp(generated_at),
      count: stixobjects.len(),
      stixobjects,
    }
  }
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw.trim())
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

pub fn now_rfc3339() -> String {
  format_timestamp(Utc::now())
}

pub fn http_date(ts: DateTime<Utc>) -> String {
  ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
