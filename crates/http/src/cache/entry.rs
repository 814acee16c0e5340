//! Stored cache entries and their freshness model.

use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::protocol::ResponseHeader;

/// A cached response snapshot with its freshness metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    head: ResponseHeader,
    body: Bytes,
    /// Request header values selected by the response's Vary header.
    vary: Vec<(String, String)>,
    stored_at: Instant,
    freshness_lifetime: Option<Duration>,
    etag: Option<String>,
    last_modified: Option<String>,
    /// One in-flight revalidation holds replace rights; concurrent stale
    /// lookups serve the cached copy meanwhile.
    revalidating: bool,
}

/// Fraction of the Last-Modified age used for heuristic freshness.
const HEURISTIC_FRACTION: u32 = 10;

impl CacheEntry {
    pub fn new(head: ResponseHeader, body: Bytes, vary: Vec<(String, String)>) -> Self {
        let freshness_lifetime = freshness_lifetime(&head);
        let etag = head.header().get_header("ETag");
        let last_modified = head.header().get_header("Last-Modified");
        Self {
            head,
            body,
            vary,
            stored_at: Instant::now(),
            freshness_lifetime,
            etag,
            last_modified,
            revalidating: false,
        }
    }

    pub fn head(&self) -> &ResponseHeader {
        &self.head
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn vary(&self) -> &[(String, String)] {
        &self.vary
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    pub fn has_validator(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some()
    }

    /// Approximate byte footprint for the size budget.
    pub fn size(&self) -> usize {
        self.body.len() + 256
    }

    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    pub fn freshness_lifetime(&self) -> Option<Duration> {
        self.freshness_lifetime
    }

    /// Whether the entry is fresh, with `min_fresh` demanding the remaining
    /// lifetime and `max_stale` tolerating expiry.
    pub fn is_fresh_for(&self, min_fresh: Option<u64>, max_stale: Option<Option<u64>>, max_age: Option<u64>) -> bool {
        let Some(lifetime) = self.freshness_lifetime else {
            return false;
        };
        let age = self.age();

        if let Some(cap) = max_age {
            if age.as_secs() > cap {
                return false;
            }
        }

        let required_margin = Duration::from_secs(min_fresh.unwrap_or(0));
        if age + required_margin <= lifetime {
            return true;
        }

        // stale, but the client may tolerate it
        match max_stale {
            Some(None) => true,
            Some(Some(slack)) => age <= lifetime + Duration::from_secs(slack),
            None => false,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_for(None, None, None)
    }

    pub fn is_revalidating(&self) -> bool {
        self.revalidating
    }

    pub fn set_revalidating(&mut self, revalidating: bool) {
        self.revalidating = revalidating;
    }

    /// A 304 answer renews the entry from now.
    pub fn refresh(&mut self) {
        self.stored_at = Instant::now();
        self.revalidating = false;
    }
}

/// Computes the freshness lifetime: `max-age` wins, then `Expires` relative
/// to the response `Date` (or receipt time), then the Last-Modified
/// heuristic.
fn freshness_lifetime(head: &ResponseHeader) -> Option<Duration> {
    if let Some(max_age) = max_age_directive(head) {
        return Some(Duration::from_secs(max_age));
    }

    let reference = header_date(head, "Date").unwrap_or_else(Utc::now);

    if let Some(expires) = header_date(head, "Expires") {
        let lifetime = (expires - reference).num_seconds().max(0) as u64;
        return Some(Duration::from_secs(lifetime));
    }

    if let Some(last_modified) = header_date(head, "Last-Modified") {
        let since = (reference - last_modified).num_seconds().max(0) as u64;
        return Some(Duration::from_secs(since / HEURISTIC_FRACTION as u64));
    }

    None
}

fn max_age_directive(head: &ResponseHeader) -> Option<u64> {
    let cache_control = head.header().get_header("Cache-Control")?;
    for directive in cache_control.split(',') {
        let directive = directive.trim();
        if let Some(value) = directive.strip_prefix("max-age=") {
            return value.trim().parse().ok();
        }
    }
    None
}

pub(crate) fn header_date(head: &ResponseHeader, name: &str) -> Option<DateTime<Utc>> {
    let value = head.header().get_header(name)?;
    DateTime::parse_from_rfc2822(&value).ok().map(|dt| dt.with_timezone(&Utc))
}
