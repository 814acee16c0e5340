//! Response cache with freshness, revalidation and LRU eviction.
//!
//! The cache stores GET responses keyed by method, URL and the request
//! header values selected by the response's Vary header. Lookups honor the
//! request cache directives; stale entries with validators produce a
//! conditional request, and a 304 answer refreshes the stored entry instead
//! of replacing it.

mod entry;
pub use entry::CacheEntry;

mod stats;
pub use stats::CacheStatistics;

use std::collections::HashMap;

use bytes::Bytes;
use http::{Method, StatusCode};
use tracing::{debug, trace};

use crate::config::HttpOptions;
use crate::protocol::{RequestHeader, ResponseHeader};

/// Outcome of a cache lookup.
#[derive(Debug)]
pub enum Lookup {
    /// Serve the cached response.
    Hit(CachedResponse),
    /// Forward this conditional request; the entry holds replace rights.
    Revalidate(RequestHeader),
    /// Nothing usable cached; forward the original request.
    Miss,
    /// Request directives forbid cache use; forward without recording.
    Bypass,
    /// `only-if-cached` could not be satisfied; answer 504.
    Unsatisfiable,
}

/// A cloned response served from the cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub head: ResponseHeader,
    pub body: Bytes,
}

/// Cache directives of a request, parsed from Cache-Control.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestDirectives {
    pub no_cache: bool,
    pub no_store: bool,
    pub only_if_cached: bool,
    pub max_age: Option<u64>,
    pub min_fresh: Option<u64>,
    /// `Some(None)` is a bare `max-stale`, `Some(Some(n))` is `max-stale=n`.
    pub max_stale: Option<Option<u64>>,
}

impl RequestDirectives {
    pub fn parse(header: &RequestHeader) -> Self {
        let mut directives = Self::default();
        let Some(value) = header.header().get_header("Cache-Control") else {
            return directives;
        };
        for directive in value.split(',') {
            let directive = directive.trim();
            if directive.eq_ignore_ascii_case("no-cache") {
                directives.no_cache = true;
            } else if directive.eq_ignore_ascii_case("no-store") {
                directives.no_store = true;
            } else if directive.eq_ignore_ascii_case("only-if-cached") {
                directives.only_if_cached = true;
            } else if directive.eq_ignore_ascii_case("max-stale") {
                directives.max_stale = Some(None);
            } else if let Some(n) = directive.strip_prefix("max-age=") {
                directives.max_age = n.trim().parse().ok();
            } else if let Some(n) = directive.strip_prefix("min-fresh=") {
                directives.min_fresh = n.trim().parse().ok();
            } else if let Some(n) = directive.strip_prefix("max-stale=") {
                directives.max_stale = Some(n.trim().parse().ok());
            }
        }
        directives
    }
}

/// Whether a request is a candidate for cache handling at all.
pub fn is_cacheable_request(header: &RequestHeader, shared: bool) -> bool {
    if header.method() != Method::GET {
        return false;
    }
    if shared && header.header().contains("Authorization") {
        return false;
    }
    !RequestDirectives::parse(header).no_store
}

/// Statuses heuristically cacheable without an explicit freshness signal.
fn heuristically_cacheable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 203 | 204 | 300 | 301 | 404 | 405 | 410 | 414 | 501)
}

/// Whether a response may be stored.
pub fn is_cacheable_response(head: &ResponseHeader, shared: bool) -> bool {
    if !heuristically_cacheable(head.status()) {
        return false;
    }

    let cache_control = head.header().get_header("Cache-Control").unwrap_or_default();
    for directive in cache_control.split(',') {
        let directive = directive.trim();
        if directive.eq_ignore_ascii_case("no-store") {
            return false;
        }
        if shared && directive.eq_ignore_ascii_case("private") {
            return false;
        }
    }

    // a freshness signal is required: max-age, Expires, or a heuristic
    // lifetime derived from Last-Modified
    cache_control.split(',').any(|d| d.trim().starts_with("max-age="))
        || head.header().contains("Expires")
        || head.header().contains("Last-Modified")
}

type Key = (Method, String);

/// In-memory response cache with a byte-size budget and LRU eviction.
pub struct HttpCache {
    entries: HashMap<Key, CacheEntry>,
    /// Keys in least-recently-used order, front evicted first.
    lru: Vec<Key>,
    capacity: usize,
    used: usize,
    shared: bool,
    stats: CacheStatistics,
}

impl HttpCache {
    pub fn new(options: &HttpOptions) -> Self {
        Self {
            entries: HashMap::new(),
            lru: Vec::new(),
            capacity: options.cache_capacity,
            used: 0,
            shared: options.shared_cache,
            stats: CacheStatistics::new(),
        }
    }

    pub fn stats(&self) -> &CacheStatistics {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a response for the request, honoring its cache directives.
    pub fn lookup(&mut self, header: &RequestHeader) -> Lookup {
        if !is_cacheable_request(header, self.shared) {
            return Lookup::Bypass;
        }
        let directives = RequestDirectives::parse(header);
        if directives.no_store || directives.no_cache {
            return if directives.only_if_cached { Lookup::Unsatisfiable } else { Lookup::Bypass };
        }

        let key = self.key_for(header);
        let Some(entry) = self.entries.get_mut(&key) else {
            return self.miss(header, &directives);
        };

        if !vary_matches(entry.vary(), header) {
            return self.miss(header, &directives);
        }

        if entry.is_fresh_for(directives.min_fresh, directives.max_stale, directives.max_age) {
            let response = CachedResponse { head: entry.head().clone(), body: entry.body().clone() };
            self.touch(&key);
            self.stats.record_hit();
            trace!(url = %header.uri(), "cache hit");
            return Lookup::Hit(response);
        }

        // stale: exactly one caller revalidates, others are served the
        // cached copy while the revalidation is in flight
        if entry.is_revalidating() {
            let response = CachedResponse { head: entry.head().clone(), body: entry.body().clone() };
            self.stats.record_hit();
            return Lookup::Hit(response);
        }

        if entry.has_validator() {
            let conditional = conditional_request(header, entry);
            entry.set_revalidating(true);
            self.stats.record_miss();
            debug!(url = %header.uri(), "stale entry, revalidating");
            return Lookup::Revalidate(conditional);
        }

        self.miss(header, &directives)
    }

    fn miss(&mut self, header: &RequestHeader, directives: &RequestDirectives) -> Lookup {
        if directives.only_if_cached {
            return Lookup::Unsatisfiable;
        }
        self.stats.record_miss();
        trace!(url = %header.uri(), "cache miss");
        Lookup::Miss
    }

    /// Stores a response if both sides allow it.
    pub fn store(&mut self, request: &RequestHeader, head: ResponseHeader, body: Bytes) {
        if !is_cacheable_request(request, self.shared) || !is_cacheable_response(&head, self.shared) {
            return;
        }

        let vary = vary_capture(&head, request);
        let entry = CacheEntry::new(head, body, vary);
        let key = self.key_for(request);

        if let Some(old) = self.entries.remove(&key) {
            self.used -= old.size();
            self.lru.retain(|k| k != &key);
        }

        self.used += entry.size();
        debug!(url = %request.uri(), size = entry.size(), "stored cache entry");
        self.entries.insert(key.clone(), entry);
        self.lru.push(key);
        self.evict_over_budget();
    }

    /// Applies the result of a revalidation round trip. A 304 refreshes the
    /// stored entry and serves its body; any other response replaces it.
    pub fn revalidated(
        &mut self,
        request: &RequestHeader,
        head: ResponseHeader,
        body: Bytes,
    ) -> CachedResponse {
        let key = self.key_for(request);
        if head.status() == StatusCode::NOT_MODIFIED {
            if let Some(entry) = self.entries.get_mut(&key) {
                entry.refresh();
                debug!(url = %request.uri(), "revalidation confirmed cached entry");
                return CachedResponse { head: entry.head().clone(), body: entry.body().clone() };
            }
        }
        self.store(request, head.clone(), body.clone());
        CachedResponse { head, body }
    }

    /// Clears the revalidation claim without refreshing, for when the
    /// conditional round trip failed and the miss was forwarded instead.
    pub fn revalidation_failed(&mut self, request: &RequestHeader) {
        let key = self.key_for(request);
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.set_revalidating(false);
        }
    }

    /// Invalidates the URL of a non-safe request.
    pub fn invalidate(&mut self, request: &RequestHeader) {
        if matches!(request.method(), &Method::GET | &Method::HEAD | &Method::OPTIONS | &Method::TRACE) {
            return;
        }
        let key = (Method::GET, request.uri().to_string());
        if let Some(entry) = self.entries.remove(&key) {
            self.used -= entry.size();
            self.lru.retain(|k| k != &key);
            debug!(url = %request.uri(), "invalidated cache entry");
        }
    }

    fn key_for(&self, header: &RequestHeader) -> Key {
        (header.method().clone(), header.uri().to_string())
    }

    fn touch(&mut self, key: &Key) {
        if let Some(pos) = self.lru.iter().position(|k| k == key) {
            let key = self.lru.remove(pos);
            self.lru.push(key);
        }
    }

    fn evict_over_budget(&mut self) {
        while self.used > self.capacity && !self.lru.is_empty() {
            let key = self.lru.remove(0);
            if let Some(entry) = self.entries.remove(&key) {
                self.used -= entry.size();
                debug!(?key, "evicted cache entry over size budget");
            }
        }
    }
}

/// Captures the request header values a response's Vary header selects.
fn vary_capture(head: &ResponseHeader, request: &RequestHeader) -> Vec<(String, String)> {
    let mut captured = Vec::new();
    for listed in head.header().get_header_all("Vary") {
        for name in listed.split(',') {
            let name = name.trim();
            if name.is_empty() || name == "*" {
                continue;
            }
            let value = request.header().get_header(name).unwrap_or_default();
            captured.push((name.to_ascii_lowercase(), value));
        }
    }
    captured
}

fn vary_matches(vary: &[(String, String)], request: &RequestHeader) -> bool {
    vary.iter().all(|(name, value)| request.header().get_header(name).unwrap_or_default() == *value)
}

fn conditional_request(header: &RequestHeader, entry: &CacheEntry) -> RequestHeader {
    let mut conditional = header.clone();
    if let Some(etag) = entry.etag() {
        // best effort: a validator that fails header validation is skipped
        let _ = conditional.header_mut().set_header("If-None-Match", etag);
    }
    if let Some(last_modified) = entry.last_modified() {
        let _ = conditional.header_mut().set_header("If-Modified-Since", last_modified);
    }
    conditional
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> HttpOptions {
        HttpOptions::default()
    }

    fn get(url: &str) -> RequestHeader {
        RequestHeader::new(Method::GET, url.parse().unwrap())
    }

    fn response(headers: &[(&str, &str)]) -> ResponseHeader {
        let mut head = ResponseHeader::new(StatusCode::OK);
        for (name, value) in headers {
            head.header_mut().set_header(name, value).unwrap();
        }
        head
    }

    #[test]
    fn fresh_entry_hits() {
        let mut cache = HttpCache::new(&options());
        let request = get("/doc");
        cache.store(&request, response(&[("Cache-Control", "max-age=60")]), Bytes::from_static(b"body"));

        match cache.lookup(&request) {
            Lookup::Hit(cached) => assert_eq!(&cached.body[..], b"body"),
            other => panic!("expected hit, got {other:?}"),
        }
        assert_eq!(cache.stats().total_hits(), 1);
    }

    #[test]
    fn max_age_zero_entry_revalidates() {
        let mut cache = HttpCache::new(&options());
        let request = get("/doc");
        cache.store(
            &request,
            response(&[("Cache-Control", "max-age=0"), ("ETag", "\"v1\"")]),
            Bytes::from_static(b"body"),
        );

        match cache.lookup(&request) {
            Lookup::Revalidate(conditional) => {
                assert_eq!(conditional.header().get_header("If-None-Match").as_deref(), Some("\"v1\""));
            }
            other => panic!("expected revalidate, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_stale_lookup_served_while_revalidating() {
        let mut cache = HttpCache::new(&options());
        let request = get("/doc");
        cache.store(
            &request,
            response(&[("Cache-Control", "max-age=0"), ("ETag", "\"v1\"")]),
            Bytes::from_static(b"body"),
        );

        assert!(matches!(cache.lookup(&request), Lookup::Revalidate(_)));
        // second lookup while the first holds replace rights
        assert!(matches!(cache.lookup(&request), Lookup::Hit(_)));
    }

    #[test]
    fn not_modified_refreshes_and_serves_cached_body() {
        let mut cache = HttpCache::new(&options());
        let request = get("/doc");
        cache.store(
            &request,
            response(&[("Cache-Control", "max-age=0"), ("ETag", "\"v1\"")]),
            Bytes::from_static(b"cached"),
        );
        assert!(matches!(cache.lookup(&request), Lookup::Revalidate(_)));

        let not_modified = ResponseHeader::new(StatusCode::NOT_MODIFIED);
        let served = cache.revalidated(&request, not_modified, Bytes::new());
        assert_eq!(&served.body[..], b"cached");
        assert_eq!(served.head.status(), StatusCode::OK);
    }

    #[test]
    fn other_status_replaces_entry() {
        let mut cache = HttpCache::new(&options());
        let request = get("/doc");
        cache.store(
            &request,
            response(&[("Cache-Control", "max-age=0"), ("ETag", "\"v1\"")]),
            Bytes::from_static(b"old"),
        );
        assert!(matches!(cache.lookup(&request), Lookup::Revalidate(_)));

        let fresh = response(&[("Cache-Control", "max-age=60")]);
        let served = cache.revalidated(&request, fresh, Bytes::from_static(b"new"));
        assert_eq!(&served.body[..], b"new");
        assert!(matches!(cache.lookup(&request), Lookup::Hit(_)));
    }

    #[test]
    fn no_store_request_bypasses() {
        let mut cache = HttpCache::new(&options());
        let mut request = get("/doc");
        request.header_mut().set_header("Cache-Control", "no-store").unwrap();
        assert!(matches!(cache.lookup(&request), Lookup::Bypass));
    }

    #[test]
    fn only_if_cached_miss_is_unsatisfiable() {
        let mut cache = HttpCache::new(&options());
        let mut request = get("/missing");
        request.header_mut().set_header("Cache-Control", "only-if-cached").unwrap();
        assert!(matches!(cache.lookup(&request), Lookup::Unsatisfiable));
    }

    #[test]
    fn post_requests_bypass_and_invalidate() {
        let mut cache = HttpCache::new(&options());
        let request = get("/doc");
        cache.store(&request, response(&[("Cache-Control", "max-age=60")]), Bytes::from_static(b"body"));

        let post = RequestHeader::new(Method::POST, "/doc".parse().unwrap());
        assert!(matches!(cache.lookup(&post), Lookup::Bypass));
        cache.invalidate(&post);
        assert!(matches!(cache.lookup(&request), Lookup::Miss));
    }

    #[test]
    fn authorization_bypasses_shared_cache() {
        let mut cache = HttpCache::new(&options());
        let mut request = get("/doc");
        request.header_mut().set_header("Authorization", "Bearer t").unwrap();
        assert!(matches!(cache.lookup(&request), Lookup::Bypass));
    }

    #[test]
    fn vary_mismatch_misses() {
        let mut cache = HttpCache::new(&options());
        let mut request = get("/doc");
        request.header_mut().set_header("Accept-Encoding", "gzip").unwrap();
        cache.store(
            &request,
            response(&[("Cache-Control", "max-age=60"), ("Vary", "Accept-Encoding")]),
            Bytes::from_static(b"gzipped"),
        );

        assert!(matches!(cache.lookup(&request), Lookup::Hit(_)));

        let mut other = get("/doc");
        other.header_mut().set_header("Accept-Encoding", "br").unwrap();
        assert!(matches!(cache.lookup(&other), Lookup::Miss));
    }

    #[test]
    fn lru_eviction_respects_budget() {
        let mut options = options();
        options.cache_capacity = 700;
        let mut cache = HttpCache::new(&options);

        let first = get("/a");
        let second = get("/b");
        cache.store(&first, response(&[("Cache-Control", "max-age=60")]), Bytes::from(vec![0u8; 100]));
        cache.store(&second, response(&[("Cache-Control", "max-age=60")]), Bytes::from(vec![0u8; 100]));
        assert_eq!(cache.len(), 2);

        // the third entry pushes the least recently used one out
        let third = get("/c");
        cache.store(&third, response(&[("Cache-Control", "max-age=60")]), Bytes::from(vec![0u8; 100]));
        assert_eq!(cache.len(), 2);
        assert!(matches!(cache.lookup(&first), Lookup::Miss));
        assert!(matches!(cache.lookup(&third), Lookup::Hit(_)));
    }

    #[test]
    fn response_without_freshness_signal_not_stored() {
        let mut cache = HttpCache::new(&options());
        let request = get("/doc");
        cache.store(&request, response(&[]), Bytes::from_static(b"body"));
        assert!(cache.is_empty());
    }

    #[test]
    fn private_response_not_stored_in_shared_cache() {
        let mut cache = HttpCache::new(&options());
        let request = get("/doc");
        cache.store(
            &request,
            response(&[("Cache-Control", "private, max-age=60")]),
            Bytes::from_static(b"body"),
        );
        assert!(cache.is_empty());
    }
}
