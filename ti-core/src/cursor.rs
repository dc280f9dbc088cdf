use crate::error::{FeedError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;

const TOKEN_PREFIX: &str = "off:";

pub fn encode(offset: usize) -> String {
  URL_SAFE_NO_PAD.encode(format!("{TOKEN_PREFIX}{offset}"))
}

// Absent, empty or malformed tokens all map to offset 0.
pub fn decode(token: Option<&str>) -> usize {
  let Some(raw) = token else {
    return 0;
  };
  if raw.trim().is_empty() {
    return 0;
  }
  match try_decode(raw) {
    Ok(offset) => offset,
    Err(e) => {
      tracing::debug!(error = %e, "ignoring pagination token");
      0
    }
  }
}

pub fn try_decode(token: &str) -> Result<usize> {
  let bytes = URL_SAFE_NO_PAD
    .decode(token.trim().as_bytes())
    .map_err(|e| FeedError::Cursor(format!("not base64url: {e}")))?;
  let text = std::str::from_utf8(&bytes).map_err(|_| FeedError::Cursor("not UTF-8".to_string()))?;
  let digits = text
    .strip_prefix(TOKEN_PREFIX)
    .ok_or_else(|| FeedError::Cursor("missing offset prefix".to_string()))?;
  if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return Err(FeedError::Cursor("offset is not a decimal integer".to_string()));
  }
  digits
    .parse::<usize>()
    .map_err(|e| FeedError::Cursor(format!("offset out of range: {e}")))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: usize,
  pub more: bool,
  pub next: Option<String>,
}

// A zero page size yields an empty, final page.
pub fn paginate<T: Clone>(items: &[T], offset: usize, page_size: usize) -> Page<T> {
  let total = items.len();
  if page_size == 0 {
    return Page {
      items: Vec::new(),
      total,
      more: false,
      next: None,
    };
  }

  let start = offset.min(total);
  let end = start.saturating_add(page_size).min(total);
  let more = end < total;
  Page {
    items: items[start..end].to_vec(),
    total,
    more,
    next: more.then(|| encode(end)),
  }
}
