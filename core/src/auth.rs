//! Per-call authentication context.
//!
//! # Design
//! A context is derived from the request credential for exactly one call and
//! dropped with it. Credentials are scoped to the origin (host and port) of
//! the request URI unless the credential opts into `CredentialScope::Any`.
//! Basic credentials are sent preemptively. Digest credentials answer a
//! `WWW-Authenticate: Digest` challenge (RFC 7616 with MD5 / MD5-sess,
//! `qop=auth` or the legacy no-qop form).

use std::fmt;

use base64::prelude::*;
use md5::{Digest, Md5};
use secrecy::{ExposeSecret, SecretString};
use ureq::http::Uri;
use uuid::Uuid;

use crate::http::{RawResponse, WireRequest};
use crate::request::{AuthCredential, AuthType, CredentialScope};

/// Hosts and ports a credential may be presented to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScope {
    Any,
    Origin { host: String, port: u16 },
}

impl AuthScope {
    pub fn origin_of(uri: &Uri) -> Self {
        AuthScope::Origin {
            host: uri.host().unwrap_or_default().to_ascii_lowercase(),
            port: effective_port(uri),
        }
    }

    pub fn matches(&self, uri: &Uri) -> bool {
        match self {
            AuthScope::Any => true,
            AuthScope::Origin { host, port } => {
                uri.host().is_some_and(|h| h.eq_ignore_ascii_case(host))
                    && effective_port(uri) == *port
            }
        }
    }
}

/// Explicit port, or 443 for https and 80 otherwise.
pub fn effective_port(uri: &Uri) -> u16 {
    uri.port_u16().unwrap_or(match uri.scheme_str() {
        Some("https") => 443,
        _ => 80,
    })
}

/// Credential bound to a scope for one call.
pub struct ScopedCredential {
    scope: AuthScope,
    kind: AuthType,
    user: String,
    password: SecretString,
}

impl ScopedCredential {
    pub fn scope(&self) -> &AuthScope {
        &self.scope
    }

    pub fn kind(&self) -> AuthType {
        self.kind
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }
}

impl fmt::Debug for ScopedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCredential")
            .field("scope", &self.scope)
            .field("kind", &self.kind)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Authentication state of a single call.
#[derive(Debug, Default)]
pub struct AuthContext {
    credential: Option<ScopedCredential>,
}

impl AuthContext {
    /// Context without credentials.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_request(auth: Option<&AuthCredential>, uri: &Uri) -> Self {
        let Some(auth) = auth else {
            return Self::none();
        };
        let scope = match auth.scope() {
            CredentialScope::Any => AuthScope::Any,
            CredentialScope::Target => AuthScope::origin_of(uri),
        };
        Self {
            credential: Some(ScopedCredential {
                scope,
                kind: auth.kind(),
                user: auth.user().to_string(),
                password: SecretString::from(auth.password().expose_secret().to_string()),
            }),
        }
    }

    pub fn credential(&self) -> Option<&ScopedCredential> {
        self.credential.as_ref()
    }

    pub fn has_credentials(&self) -> bool {
        self.credential.is_some()
    }

    fn credential_for(&self, uri: &Uri, kind: AuthType) -> Option<&ScopedCredential> {
        self.credential
            .as_ref()
            .filter(|c| c.kind == kind && c.scope.matches(uri))
    }

    /// Adds a preemptive Basic `Authorization` header when a Basic
    /// credential applies and the caller did not set one.
    pub fn authorize(&self, request: &mut WireRequest) {
        if request.header("authorization").is_some() {
            return;
        }
        if let Some(cred) = self.credential_for(request.uri(), AuthType::Basic) {
            let value = basic_authorization(&cred.user, cred.password.expose_secret());
            request.add_header("Authorization", value);
        }
    }

    /// Authorization header answering a Digest challenge in `response`, if
    /// a Digest credential applies and the challenge is supported.
    pub fn answer_challenge(&self, request: &WireRequest, response: &RawResponse) -> Option<String> {
        if response.status != 401 {
            return None;
        }
        let cred = self.credential_for(request.uri(), AuthType::Digest)?;
        let cnonce = Uuid::new_v4().simple().to_string();
        // First challenge this client can answer wins.
        response
            .header_values("www-authenticate")
            .filter_map(DigestChallenge::parse)
            .find_map(|challenge| {
                challenge.authorization(
                    &cred.user,
                    cred.password.expose_secret(),
                    request.method().as_str(),
                    request.request_target(),
                    1,
                    &cnonce,
                )
            })
    }
}

/// `Basic base64(user:password)`.
pub fn basic_authorization(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64_STANDARD.encode(format!("{user}:{password}")))
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Splits `key=value, key="quoted value"` auth parameters.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut rest = input.trim();
    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut end = quoted.len();
            let mut escaped = false;
            for (idx, ch) in quoted.char_indices() {
                if escaped {
                    value.push(ch);
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == '"' {
                    end = idx + 1;
                    break;
                } else {
                    value.push(ch);
                }
            }
            rest = &quoted[end..];
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        params.push((key, value));
        rest = rest.trim_start().trim_start_matches(',').trim_start();
    }
    params
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DigestAlgorithm {
    Md5,
    Md5Sess,
}

/// A parsed `WWW-Authenticate: Digest` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: Option<DigestAlgorithm>,
    qop: Option<Vec<String>>,
}

impl DigestChallenge {
    /// Parses one challenge value; `None` unless it is a Digest challenge
    /// carrying a nonce.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut challenge = DigestChallenge {
            realm: String::new(),
            nonce: String::new(),
            opaque: None,
            algorithm: Some(DigestAlgorithm::Md5),
            qop: None,
        };
        for (key, value) in parse_params(params) {
            match key.as_str() {
                "realm" => challenge.realm = value,
                "nonce" => challenge.nonce = value,
                "opaque" => challenge.opaque = Some(value),
                "algorithm" => {
                    challenge.algorithm = if value.eq_ignore_ascii_case("md5") {
                        Some(DigestAlgorithm::Md5)
                    } else if value.eq_ignore_ascii_case("md5-sess") {
                        Some(DigestAlgorithm::Md5Sess)
                    } else {
                        None
                    }
                }
                "qop" => {
                    challenge.qop = Some(
                        value
                            .split(',')
                            .map(|q| q.trim().to_ascii_lowercase())
                            .filter(|q| !q.is_empty())
                            .collect(),
                    )
                }
                _ => {}
            }
        }
        (!challenge.nonce.is_empty()).then_some(challenge)
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Builds the `Authorization` value. `None` when the challenge asks for
    /// an algorithm or qop this client does not implement.
    pub fn authorization(
        &self,
        user: &str,
        password: &str,
        method: &str,
        target: &str,
        nonce_count: u32,
        cnonce: &str,
    ) -> Option<String> {
        let algorithm = self.algorithm?;
        let qop = match &self.qop {
            None => None,
            Some(offered) if offered.iter().any(|q| q == "auth") => Some("auth"),
            Some(_) => return None,
        };

        let mut ha1 = md5_hex(&format!("{user}:{}:{password}", self.realm));
        if algorithm == DigestAlgorithm::Md5Sess {
            ha1 = md5_hex(&format!("{ha1}:{}:{cnonce}", self.nonce));
        }
        let ha2 = md5_hex(&format!("{method}:{target}"));
        let nc = format!("{nonce_count:08x}");
        let response = match qop {
            Some(qop) => md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:{qop}:{ha2}", self.nonce)),
            None => md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce)),
        };

        let algorithm_name = match algorithm {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Md5Sess => "MD5-sess",
        };
        let mut header = format!(
            r#"Digest username="{user}", realm="{}", nonce="{}", uri="{target}", algorithm={algorithm_name}, response="{response}""#,
            self.realm, self.nonce
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(r#", opaque="{opaque}""#));
        }
        if let Some(qop) = qop {
            header.push_str(&format!(r#", qop={qop}, nc={nc}, cnonce="{cnonce}""#));
        }
        Some(header)
    }
}
