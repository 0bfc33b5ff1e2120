//! Process-lifetime cookie jar shared by every call of one engine.
//!
//! # Design
//! The jar is an explicitly synchronized store (`RwLock`) handed out behind
//! `Arc`. Concurrent calls may race on writes; readers see whatever state was
//! last committed. Domain and path matching follow RFC 6265: host-only
//! cookies match their exact host, domain cookies also match subdomains,
//! and a cookie path matches itself and anything below it.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use ureq::http::Uri;

use crate::request::Cookie;

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    host_only: bool,
    path: String,
    expires: Option<DateTime<Utc>>,
    secure: bool,
}

impl StoredCookie {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn matches(&self, host: &str, path: &str, secure: bool) -> bool {
        if self.secure && !secure {
            return false;
        }
        let domain_ok = if self.host_only {
            host == self.domain
        } else {
            domain_match(host, &self.domain)
        };
        domain_ok && path_match(path, &self.path)
    }
}

fn domain_match(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

fn path_match(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// Directory of the request path, used when Set-Cookie carries no Path.
fn default_path(uri_path: &str) -> String {
    match uri_path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => uri_path[..idx].to_string(),
    }
}

fn request_path(uri: &Uri) -> &str {
    match uri.path() {
        "" => "/",
        path => path,
    }
}

/// Cookie store keyed by (name, domain, path).
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<Vec<StoredCookie>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a configured cookie for `uri`. Domain defaults to the request
    /// host and path to the request path. An already-expired cookie removes
    /// the stored one with the same name, domain and path.
    pub fn add(&self, uri: &Uri, cookie: &Cookie) {
        let host = uri.host().unwrap_or_default().to_ascii_lowercase();
        let (domain, host_only) = match &cookie.domain {
            Some(domain) => (domain.trim_start_matches('.').to_ascii_lowercase(), false),
            None => (host, true),
        };
        self.insert(StoredCookie {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain,
            host_only,
            path: cookie
                .path
                .clone()
                .unwrap_or_else(|| request_path(uri).to_string()),
            expires: cookie.expires,
            secure: cookie.secure,
        });
    }

    fn insert(&self, cookie: StoredCookie) {
        let now = Utc::now();
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        cookies.retain(|c| !c.same_slot(&cookie));
        if !cookie.is_expired(now) {
            cookies.push(cookie);
        }
    }

    /// Parses one `Set-Cookie` header received from `uri` and stores it.
    /// Returns false when the header is malformed or names a foreign domain.
    pub fn store_set_cookie(&self, uri: &Uri, header: &str) -> bool {
        let host = uri.host().unwrap_or_default().to_ascii_lowercase();
        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return false;
        };
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        let mut cookie = StoredCookie {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: host.clone(),
            host_only: true,
            path: default_path(request_path(uri)),
            expires: None,
            secure: false,
        };
        let mut max_age = None;

        for attr in parts {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr.trim(), ""),
            };
            if key.eq_ignore_ascii_case("domain") && !val.is_empty() {
                let domain = val.trim_start_matches('.').to_ascii_lowercase();
                if !domain_match(&host, &domain) {
                    return false;
                }
                cookie.domain = domain;
                cookie.host_only = false;
            } else if key.eq_ignore_ascii_case("path") && val.starts_with('/') {
                cookie.path = val.to_string();
            } else if key.eq_ignore_ascii_case("expires") {
                if let Ok(at) = DateTime::parse_from_rfc2822(val) {
                    cookie.expires = Some(at.with_timezone(&Utc));
                }
            } else if key.eq_ignore_ascii_case("max-age") {
                max_age = val.parse::<i64>().ok();
            } else if key.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
            }
        }
        // Max-Age wins over Expires.
        if let Some(seconds) = max_age {
            cookie.expires =
                Duration::try_seconds(seconds).and_then(|d| Utc::now().checked_add_signed(d));
        }

        self.insert(cookie);
        true
    }

    /// `(name, value)` pairs applicable to `uri`, longest path first.
    pub fn matching(&self, uri: &Uri) -> Vec<(String, String)> {
        let host = uri.host().unwrap_or_default().to_ascii_lowercase();
        let path = request_path(uri);
        let secure = uri.scheme_str() == Some("https");
        let now = Utc::now();

        let cookies = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<&StoredCookie> = cookies
            .iter()
            .filter(|c| !c.is_expired(now) && c.matches(&host, path, secure))
            .collect();
        found.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        found
            .into_iter()
            .map(|c| (c.name.clone(), c.value.clone()))
            .collect()
    }

    /// Value for a `Cookie` request header, if any cookie applies.
    pub fn header_value(&self, uri: &Uri) -> Option<String> {
        let pairs = self.matching(uri);
        if pairs.is_empty() {
            return None;
        }
        Some(
            pairs
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Drops expired cookies; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut cookies = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        let before = cookies.len();
        cookies.retain(|c| !c.is_expired(now));
        before - cookies.len()
    }

    pub fn len(&self) -> usize {
        self.cookies.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cookies.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}
