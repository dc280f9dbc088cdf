use crate::config::{Config, FeedConfig};
use crate::cursor::{self, Page};
use crate::error::{FeedError, Result};
use crate::reaper::{self, ReapReport};
use crate::scheduler;
use crate::snapshot_store::{self, MAX_MERGED_OBJECTS};
use crate::types::{http_date, now_rfc3339, IntelObject};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

pub const DEFAULT_COLLECTION_PAGE_SIZE: usize = 100;
pub const TAXII_MEDIA_TYPE: &str = "application/taxii+json";
pub const STIX_MEDIA_TYPE: &str = "application/stix+json;version=2.1";

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
  pub status: String,
  pub message: String,
  pub filename: String,
  pub indicators_count: usize,
  pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeletionResponse {
  pub status: String,
  pub deleted_files: Vec<String>,
  pub total_deleted: usize,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub failed_files: Vec<String>,
  pub threshold_hours: u64,
  pub timestamp: String,
}

#[derive(Debug, Clone, Default)]
pub struct IndicatorQuery {
  pub since: Option<String>,
  pub limit: Option<i64>,
  pub page_size: Option<i64>,
  pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndicatorPage {
  pub count: usize,
  pub total: usize,
  pub more: bool,
  pub next: Option<String>,
  pub sourcesystem: String,
  pub stixobjects: Vec<IntelObject>,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionQuery {
  pub collection_id: String,
  pub since: Option<String>,
  pub types: Option<String>,
  pub page_size: Option<i64>,
  pub next: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaxiiQuery {
  pub collection_id: String,
  pub added_after: Option<String>,
  pub types: Option<String>,
  pub limit: Option<i64>,
  pub next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValidators {
  pub etag: String,
  pub last_modified: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionPage {
  pub objects: Vec<IntelObject>,
  pub sourcesystem: String,
  pub total: usize,
  pub more: bool,
  pub next: Option<String>,
  #[serde(skip)]
  pub validators: CacheValidators,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaxiiEnvelope {
  pub objects: Vec<IntelObject>,
  pub sourcesystem: String,
  pub more: bool,
  pub next: Option<String>,
  #[serde(skip)]
  pub validators: CacheValidators,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
  pub id: String,
  pub title: String,
  pub description: String,
  pub can_read: bool,
  pub can_write: bool,
  pub media_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Collections {
  pub collections: Vec<CollectionInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Discovery {
  pub title: String,
  pub description: String,
  pub default: String,
  pub api_roots: Vec<String>,
}

pub struct FeedService {
  data_dir: PathBuf,
  min_count: i64,
  max_count: i64,
  feed: FeedConfig,
}

impl FeedService {
  pub fn new(cfg: &Config, data_dir: PathBuf) -> Self {
    Self {
      data_dir,
      min_count: cfg.generator.min_count,
      max_count: cfg.generator.max_count,
      feed: cfg.feed.clone(),
    }
  }

  pub fn trigger_generation(&self) -> Result<GenerationResponse> {
    let outcome = scheduler::run_cycle(&self.data_dir, self.min_count, self.max_count)?;
    Ok(GenerationResponse {
      status: "successful".to_string(),
      message: "TI indicators generated successfully".to_string(),
      filename: outcome.file_name,
      indicators_count: outcome.count,
      timestamp: outcome.timestamp,
    })
  }

  pub fn delete_old_snapshots(&self, hours: Option<u64>) -> Result<DeletionResponse> {
    let threshold_hours = hours.unwrap_or(reaper::DEFAULT_MAX_AGE_HOURS);
    let report = reaper::reap(&self.data_dir, threshold_hours)?;
    Ok(deletion_response(report, threshold_hours))
  }

  pub fn list_indicators(&self, q: &IndicatorQuery) -> Result<IndicatorPage> {
    let items = snapshot_store::load_indicators(&self.data_dir, q.since.as_deref(), MAX_MERGED_OBJECTS)?
      .stixobjects;
    let page_size = match q.page_size.or(q.limit) {
      Some(n) => clamp_page_size(n),
      None => items.len(),
    };
    let page = cursor::paginate(&items, cursor::decode(q.next.as_deref()), page_size);
    Ok(IndicatorPage {
      count: page.items.len(),
      total: page.total,
      more: page.more,
      next: page.next,
      sourcesystem: self.feed.source_system.clone(),
      stixobjects: page.items,
    })
  }

  pub fn collections(&self) -> Collections {
    Collections {
      collections: vec![CollectionInfo {
        id: self.feed.collection_id.clone(),
        title: self.feed.collection_title.clone(),
        description: "Synthetic STIX 2.1 content generated by this service.".to_string(),
        can_read: true,
        can_write: false,
        media_types: vec![STIX_MEDIA_TYPE.to_string()],
      }],
    }
  }

  pub fn collection_objects(&self, q: &CollectionQuery) -> Result<CollectionPage> {
    self.ensure_collection(&q.collection_id)?;
    let types = parse_types_param(q.types.as_deref());
    let (page, validators) = self.filtered_page(q.since.as_deref(), types, q.page_size, q.next.as_deref())?;
    Ok(CollectionPage {
      objects: page.items,
      sourcesystem: self.feed.source_system.clone(),
      total: page.total,
      more: page.more,
      next: page.next,
      validators,
    })
  }

  pub fn taxii_objects(&self, q: &TaxiiQuery) -> Result<TaxiiEnvelope> {
    self.ensure_collection(&q.collection_id)?;
    let types = if self.feed.taxii_indicators_only {
      Some(vec!["indicator".to_string()])
    } else {
      parse_types_param(q.types.as_deref())
    };
    let (page, validators) = self.filtered_page(q.added_after.as_deref(), types, q.limit, q.next.as_deref())?;
    Ok(TaxiiEnvelope {
      objects: page.items,
      sourcesystem: self.feed.source_system.clone(),
      more: page.more,
      next: page.next,
      validators,
    })
  }

  pub fn discovery(&self, base_url: &str) -> Discovery {
    let api_root = format!(
      "{}{}",
      base_url.trim_end_matches('/'),
      self.feed.taxii_api_root_path
    );
    Discovery {
      title: "Mock TAXII Server".to_string(),
      description: "Discovery document for the mock TAXII 2.1 API".to_string(),
      default: api_root.clone(),
      api_roots: vec![api_root],
    }
  }

  fn ensure_collection(&self, collection_id: &str) -> Result<()> {
    if collection_id != self.feed.collection_id {
      return Err(FeedError::NotFound(format!("collection {collection_id}")));
    }
    Ok(())
  }

  fn filtered_page(
    &self,
    since: Option<&str>,
    types: Option<Vec<String>>,
    page_size: Option<i64>,
    next: Option<&str>,
  ) -> Result<(Page<IntelObject>, CacheValidators)> {
    let items = snapshot_store::load(&self.data_dir, since, MAX_MERGED_OBJECTS, types.as_deref())?
      .stixobjects;
    let validators = cache_validators(&items, types.as_deref());
    let page_size = page_size
      .map(clamp_page_size)
      .unwrap_or(DEFAULT_COLLECTION_PAGE_SIZE);
    let page = cursor::paginate(&items, cursor::decode(next), page_size);
    Ok((page, validators))
  }
}

fn deletion_response(report: ReapReport, threshold_hours: u64) -> DeletionResponse {
  DeletionResponse {
    status: "successful".to_string(),
    total_deleted: report.deleted_count(),
    deleted_files: report.deleted,
    failed_files: report.failed.into_iter().map(|(name, _)| name).collect(),
    threshold_hours,
    timestamp: now_rfc3339(),
  }
}

pub fn parse_types_param(raw: Option<&str>) -> Option<Vec<String>> {
  let parts: Vec<String> = raw?
    .split(',')
    .map(str::trim)
    .filter(|t| !t.is_empty())
    .map(str::to_string)
    .collect();
  (!parts.is_empty()).then_some(parts)
}

fn clamp_page_size(n: i64) -> usize {
  usize::try_from(n).unwrap_or(0)
}

pub fn cache_validators(items: &[IntelObject], types: Option<&[String]>) -> CacheValidators {
  let mut hasher = Sha256::new();
  for obj in items {
    hasher.update(obj.id.as_bytes());
    hasher.update(b"|");
    hasher.update(obj.modified.as_bytes());
    hasher.update(b"\n");
  }
  let filter = types.map(|t| t.join(",")).unwrap_or_else(|| "all".to_string());
  hasher.update(format!("types={filter};total={}", items.len()).as_bytes());
  let digest = format!("{:x}", hasher.finalize());

  let last_modified = items.iter().filter_map(IntelObject::updated_at).max().map(http_date);
  CacheValidators {
    etag: format!("W/\"{}\"", &digest[..16]),
    last_modified,
  }
}
