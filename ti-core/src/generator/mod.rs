use crate::error::{FeedError, Result};
use crate::types::{format_timestamp, Bundle, ExternalReference, IntelObject, ObjectBody, SPEC_VERSION};
use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

pub mod catalog;

use catalog::{
  DOMAIN_WORDS, INDICATOR_LABELS, MALWARE_FAMILIES, MALWARE_TYPES, SOFTWARE, TECHNIQUES,
  THREAT_ACTORS, THREAT_ACTOR_TYPES, TLDS, URL_PATHS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
  Indicator,
  Malware,
  AttackPattern,
  ThreatActor,
  Vulnerability,
  Relationship,
}

impl Kind {
  fn prefix(self) -> &'static str {
    match self {
      Kind::Indicator => "indicator",
      Kind::Malware => "malware",
      Kind::AttackPattern => "attack-pattern",
      Kind::ThreatActor => "threat-actor",
      Kind::Vulnerability => "vulnerability",
      Kind::Relationship => "relationship",
    }
  }
}

// Indicators dominate, matching a feed that is mostly observables.
const KIND_WEIGHTS: &[(Kind, u32)] = &[
  (Kind::Indicator, 50),
  (Kind::Malware, 12),
  (Kind::AttackPattern, 12),
  (Kind::ThreatActor, 8),
  (Kind::Vulnerability, 8),
  (Kind::Relationship, 10),
];

pub fn validate_bounds(min_count: i64, max_count: i64) -> Result<(usize, usize)> {
  if min_count < 0 || max_count < 0 {
    return Err(FeedError::Config(format!(
      "count bounds must be non-negative (min_count={min_count}, max_count={max_count})"
    )));
  }
  if min_count > max_count {
    return Err(FeedError::Config(format!(
      "min_count ({min_count}) must not exceed max_count ({max_count})"
    )));
  }
  Ok((min_count as usize, max_count as usize))
}

pub fn generate(min_count: i64, max_count: i64) -> Result<Bundle> {
  generate_with(&mut rand::thread_rng(), min_count, max_count, Utc::now())
}

pub fn generate_with<R: Rng + ?Sized>(
  rng: &mut R,
  min_count: i64,
  max_count: i64,
  now: DateTime<Utc>,
) -> Result<Bundle> {
  let (min, max) = validate_bounds(min_count, max_count)?;
  let count = rng.gen_range(min..=max);

  let weights = WeightedIndex::new(KIND_WEIGHTS.iter().map(|(_, w)| *w))
    .map_err(|e| FeedError::Config(format!("object type weights: {e}")))?;

  let stamp = format_timestamp(now);
  let mut ids: HashSet<String> = HashSet::with_capacity(count);
  // Non-relationship objects generated so far, as (id, type) for relationship targets.
  let mut domain: Vec<(String, Kind)> = Vec::new();
  let mut objects = Vec::with_capacity(count);

  for _ in 0..count {
    let mut kind = KIND_WEIGHTS[weights.sample(rng)].0;
    if kind == Kind::Relationship && domain.len() < 2 {
      kind = Kind::Indicator;
    }

    let id = fresh_id(rng, kind.prefix(), &mut ids);
    let body = match kind {
      Kind::Indicator => indicator(rng, &stamp),
      Kind::Malware => malware(rng),
      Kind::AttackPattern => attack_pattern(rng),
      Kind::ThreatActor => threat_actor(rng),
      Kind::Vulnerability => vulnerability(rng, now),
      Kind::Relationship => relationship(rng, &domain),
    };

    if kind != Kind::Relationship {
      domain.push((id.clone(), kind));
    }
    objects.push(IntelObject {
      id,
      spec_version: SPEC_VERSION.to_string(),
      created: stamp.clone(),
      modified: stamp.clone(),
      body,
    });
  }

  let bundle_id = format!("bundle--{}", random_uuid(rng));
  Ok(Bundle::new(bundle_id, now, objects))
}

fn random_uuid<R: Rng + ?Sized>(rng: &mut R) -> uuid::Uuid {
  uuid::Builder::from_random_bytes(rng.gen()).into_uuid()
}

fn fresh_id<R: Rng + ?Sized>(rng: &mut R, prefix: &str, seen: &mut HashSet<String>) -> String {
  loop {
    let id = format!("{prefix}--{}", random_uuid(rng));
    if seen.insert(id.clone()) {
      return id;
    }
  }
}

fn pick<R: Rng + ?Sized>(rng: &mut R, items: &[&'static str]) -> &'static str {
  items.choose(rng).copied().unwrap_or_default()
}

fn indicator<R: Rng + ?Sized>(rng: &mut R, stamp: &str) -> ObjectBody {
  let (name, pattern) = match rng.gen_range(0..4) {
    0 => {
      let ip = format!(
        "{}.{}.{}.{}",
        rng.gen_range(1..=223),
        rng.gen_range(0..=255),
        rng.gen_range(0..=255),
        rng.gen_range(1..=254)
      );
      (
        format!("Malicious IP {ip}"),
        format!("[ipv4-addr:value = '{ip}']"),
      )
    }
    1 => {
      let domain = random_domain(rng);
      (
        format!("Malicious domain {domain}"),
        format!("[domain-name:value = '{domain}']"),
      )
    }
    2 => {
      let url = format!("https://{}/{}", random_domain(rng), pick(rng, URL_PATHS));
      (format!("Malicious URL {url}"), format!("[url:value = '{url}']"))
    }
    _ => {
      let hash = random_hex(rng, 32);
      (
        format!("Malicious file {}", &hash[..12]),
        format!("[file:hashes.'SHA-256' = '{hash}']"),
      )
    }
  };

  let mut labels = vec![pick(rng, INDICATOR_LABELS).to_string()];
  let extra = pick(rng, INDICATOR_LABELS).to_string();
  if !labels.contains(&extra) {
    labels.push(extra);
  }

  ObjectBody::Indicator {
    description: format!("Synthetic indicator observed with {}", pick(rng, MALWARE_FAMILIES)),
    name,
    pattern,
    pattern_type: "stix".to_string(),
    valid_from: stamp.to_string(),
    indicator_types: vec![labels[0].clone()],
    labels,
    confidence: rng.gen_range(30..=100),
  }
}

fn malware<R: Rng + ?Sized>(rng: &mut R) -> ObjectBody {
  let family = pick(rng, MALWARE_FAMILIES);
  let kind = pick(rng, MALWARE_TYPES);
  ObjectBody::Malware {
    name: format!("{family} v{}.{}", rng.gen_range(1..=5), rng.gen_range(0..=9)),
    description: format!("Synthetic {kind} sample attributed to the {family} family"),
    is_family: rng.gen_bool(0.3),
    malware_types: vec![kind.to_string()],
  }
}

fn attack_pattern<R: Rng + ?Sized>(rng: &mut R) -> ObjectBody {
  let technique = TECHNIQUES[rng.gen_range(0..TECHNIQUES.len())];
  ObjectBody::AttackPattern {
    name: technique.name.to_string(),
    description: format!("Synthetic use of {} ({})", technique.name, technique.id),
    external_references: vec![ExternalReference {
      source_name: "mitre-attack".to_string(),
      external_id: technique.id.to_string(),
    }],
  }
}

fn threat_actor<R: Rng + ?Sized>(rng: &mut R) -> ObjectBody {
  let name = pick(rng, THREAT_ACTORS);
  ObjectBody::ThreatActor {
    name: name.to_string(),
    description: format!("Synthetic threat actor profile for {name}"),
    threat_actor_types: vec![pick(rng, THREAT_ACTOR_TYPES).to_string()],
    aliases: vec![format!("TA-{:04}", rng.gen_range(1..10_000))],
  }
}

fn vulnerability<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> ObjectBody {
  let cve = format!(
    "CVE-{}-{}",
    now.format("%Y"),
    rng.gen_range(1_000..100_000)
  );
  ObjectBody::Vulnerability {
    description: format!("Synthetic remote code execution flaw in a {}", pick(rng, SOFTWARE)),
    name: cve.clone(),
    external_references: vec![ExternalReference {
      source_name: "cve".to_string(),
      external_id: cve,
    }],
  }
}

// `domain` holds at least two entries.
fn relationship<R: Rng + ?Sized>(rng: &mut R, domain: &[(String, Kind)]) -> ObjectBody {
  let source = rng.gen_range(0..domain.len());
  let mut target = rng.gen_range(0..domain.len() - 1);
  if target >= source {
    target += 1;
  }
  let (source_ref, source_kind) = &domain[source];
  let (target_ref, target_kind) = &domain[target];

  let relationship_type = match (source_kind, target_kind) {
    (Kind::Indicator, _) => "indicates",
    (Kind::Malware, Kind::Vulnerability) => "exploits",
    (Kind::Malware, Kind::AttackPattern)
    | (Kind::ThreatActor, Kind::Malware)
    | (Kind::ThreatActor, Kind::AttackPattern) => "uses",
    (Kind::ThreatActor, Kind::Vulnerability) => "targets",
    _ => "related-to",
  };

  ObjectBody::Relationship {
    relationship_type: relationship_type.to_string(),
    source_ref: source_ref.clone(),
    target_ref: target_ref.clone(),
  }
}

fn random_domain<R: Rng + ?Sized>(rng: &mut R) -> String {
  format!(
    "{}-{}{}.{}",
    pick(rng, DOMAIN_WORDS),
    pick(rng, DOMAIN_WORDS),
    rng.gen_range(10..1000),
    pick(rng, TLDS)
  )
}

fn random_hex<R: Rng + ?Sized>(rng: &mut R, bytes: usize) -> String {
  (0..bytes).map(|_| format!("{:02x}", rng.gen::<u8>())).collect()
}
