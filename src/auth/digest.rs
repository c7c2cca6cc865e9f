//! HTTP Digest authentication (RFC 7616), `algorithm=SHA-256`.
//!
//! Passwords never reach the server in the clear: the validator looks up
//! `HA1 = SHA-256(user:realm:password)` for a user and the scheme checks the
//! client's response hash against it. Nonces are issued with each challenge
//! and only the most recent [`NONCE_CAPACITY`] are honoured.
//!
//! Replays are refused: with `qop=auth` every accepted response must carry a
//! higher `nc` than the last one accepted for its nonce, and without qop a
//! nonce is good for a single request.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use sha2::{Digest as _, Sha256};

use super::{AuthError, AuthScheme, Identity, authorization};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Outstanding nonces kept per scheme. Every rejected request is answered
/// with a fresh nonce, so a flood of unauthenticated requests can evict a
/// client's nonce before it is used; that client gets a new challenge.
pub const NONCE_CAPACITY: usize = 1024;

struct Nonce {
    value: String,
    /// Highest nonce count accepted so far.
    last_count: Option<u32>,
}

/// Digest auth with an async `(user, realm) -> HA1` lookup.
pub struct Digest<P> {
    name: String,
    realm: String,
    ha1: P,
    nonces: Mutex<VecDeque<Nonce>>,
}

impl<P> Digest<P> {
    pub fn new(name: impl Into<String>, realm: impl Into<String>, ha1: P) -> Self {
        Self {
            name: name.into(),
            realm: realm.into(),
            ha1,
            nonces: Mutex::new(VecDeque::with_capacity(NONCE_CAPACITY)),
        }
    }

    fn issue_nonce(&self) -> String {
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let mut nonces = self.nonces.lock().unwrap_or_else(PoisonError::into_inner);
        if nonces.len() == NONCE_CAPACITY {
            nonces.pop_front();
        }
        nonces.push_back(Nonce { value: nonce.clone(), last_count: None });
        nonce
    }

    fn knows_nonce(&self, nonce: &str) -> bool {
        self.nonces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|n| n.value == nonce)
    }

    /// Records `count` as used for `nonce`. False if the nonce is gone or the
    /// count is not above the last accepted one.
    fn consume(&self, nonce: &str, count: u32) -> bool {
        let mut nonces = self.nonces.lock().unwrap_or_else(PoisonError::into_inner);
        match nonces.iter_mut().find(|n| n.value == nonce) {
            Some(entry) if entry.last_count.is_none_or(|last| count > last) => {
                entry.last_count = Some(count);
                true
            }
            _ => false,
        }
    }
}

/// `HA1` for a user, as stored by whatever backs the lookup.
pub fn digest_ha1(user: &str, realm: &str, password: &str) -> String {
    sha256_hex(&format!("{user}:{realm}:{password}"))
}

pub(crate) fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

impl<P, Fut> AuthScheme for Digest<P>
where
    P: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<String>> + Send + 'static,
{
    fn name(&self) -> &str { &self.name }

    fn validate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<Option<Identity>, AuthError>> {
        Box::pin(async move {
            let params = parse_params(authorization(req, "Digest")?)?;
            let field = |key: &str| {
                params
                    .get(key)
                    .map(String::as_str)
                    .ok_or_else(|| AuthError::Malformed(format!("missing `{key}`")))
            };

            let username = field("username")?;
            let realm = field("realm")?;
            let nonce = field("nonce")?;
            let uri = field("uri")?;
            let response = field("response")?;

            if let Some(algorithm) = params.get("algorithm") {
                if !algorithm.eq_ignore_ascii_case("SHA-256") {
                    return Err(AuthError::Malformed(format!("unsupported algorithm `{algorithm}`")));
                }
            }
            if realm != self.realm {
                return Err(AuthError::Invalid("realm mismatch".into()));
            }
            if uri != req.target() {
                return Err(AuthError::Invalid("digest uri does not match the request".into()));
            }
            if !self.knows_nonce(nonce) {
                return Err(AuthError::Invalid("stale or unknown nonce".into()));
            }

            let Some(ha1) = (self.ha1)(username.to_owned(), realm.to_owned()).await else {
                return Ok(None);
            };
            let ha2 = sha256_hex(&format!("{}:{uri}", req.method()));
            let (expected, count) = match params.get("qop").map(String::as_str) {
                Some("auth") => {
                    let nc = field("nc")?;
                    let cnonce = field("cnonce")?;
                    let count = u32::from_str_radix(nc, 16)
                        .map_err(|_| AuthError::Malformed(format!("bad nonce count `{nc}`")))?;
                    (sha256_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}")), count)
                }
                Some(other) => return Err(AuthError::Malformed(format!("unsupported qop `{other}`"))),
                // without qop there is no counter: the nonce is single use
                None => (sha256_hex(&format!("{ha1}:{nonce}:{ha2}")), u32::MAX),
            };

            if !expected.eq_ignore_ascii_case(response) {
                return Ok(None);
            }
            if !self.consume(nonce, count) {
                return Err(AuthError::Invalid("replayed nonce count".into()));
            }
            Ok(Some(Identity::new(username).with_attribute("realm", realm)))
        })
    }

    fn challenge(&self) -> Option<String> {
        Some(format!(
            r#"Digest realm="{}", nonce="{}", algorithm=SHA-256, qop="auth""#,
            self.realm,
            self.issue_nonce()
        ))
    }
}

/// Parses `key=value, key="quoted \"value\""` auth-params. Keys are
/// lowercased.
pub(crate) fn parse_params(input: &str) -> Result<HashMap<String, String>, AuthError> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ',' && !c.is_whitespace()) {
            key.push(c.to_ascii_lowercase());
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(AuthError::Malformed(format!("expected `=` after `{key}`")));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(c) => value.push(c),
                        None => return Err(AuthError::Malformed("dangling escape".into())),
                    },
                    Some('"') => break,
                    Some(c) => value.push(c),
                    None => return Err(AuthError::Malformed("unterminated quoted string".into())),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',' && !c.is_whitespace()) {
                value.push(c);
            }
        }
        params.insert(key, value);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REALM: &str = "testrealm@host.com";

    fn scheme() -> Digest<impl Fn(String, String) -> std::future::Ready<Option<String>> + Send + Sync + 'static> {
        Digest::new("digest", REALM, |user: String, realm: String| {
            std::future::ready((user == "Mufasa").then(|| digest_ha1(&user, &realm, "Circle of Life")))
        })
    }

    fn nonce_of(challenge: &str) -> String {
        parse_params(challenge.strip_prefix("Digest ").unwrap()).unwrap()["nonce"].clone()
    }

    fn answer(user: &str, password: &str, nonce: &str, uri: &str) -> String {
        answer_nc(user, password, nonce, uri, "00000001")
    }

    fn answer_nc(user: &str, password: &str, nonce: &str, uri: &str, nc: &str) -> String {
        let ha1 = digest_ha1(user, REALM, password);
        let ha2 = sha256_hex(&format!("GET:{uri}"));
        let response = sha256_hex(&format!("{ha1}:{nonce}:{nc}:0a4f113b:auth:{ha2}"));
        format!(
            r#"Digest username="{user}", realm="{REALM}", nonce="{nonce}", uri="{uri}", algorithm=SHA-256, qop=auth, nc={nc}, cnonce="0a4f113b", response="{response}""#
        )
    }

    #[tokio::test]
    async fn full_handshake() {
        let digest = scheme();
        let nonce = nonce_of(&digest.challenge().unwrap());

        let req = Request::new("GET", "/dir/index.html?x=1")
            .with_header("authorization", answer("Mufasa", "Circle of Life", &nonce, "/dir/index.html?x=1"));
        let identity = digest.validate(&req).await.unwrap().unwrap();
        assert_eq!(identity.name(), "Mufasa");
        assert_eq!(identity.attribute("realm"), Some(REALM));
    }

    #[tokio::test]
    async fn wrong_password_or_user_is_not_accepted() {
        let digest = scheme();
        let nonce = nonce_of(&digest.challenge().unwrap());

        let req = Request::new("GET", "/a").with_header("authorization", answer("Mufasa", "wrong", &nonce, "/a"));
        assert_eq!(digest.validate(&req).await, Ok(None));

        let req = Request::new("GET", "/a").with_header("authorization", answer("Scar", "x", &nonce, "/a"));
        assert_eq!(digest.validate(&req).await, Ok(None));
    }

    #[tokio::test]
    async fn unknown_nonce_and_foreign_uri_are_invalid() {
        let digest = scheme();
        let req = Request::new("GET", "/a").with_header("authorization", answer("Mufasa", "Circle of Life", "made-up", "/a"));
        assert!(matches!(digest.validate(&req).await, Err(AuthError::Invalid(_))));

        let nonce = nonce_of(&digest.challenge().unwrap());
        let req = Request::new("GET", "/b").with_header("authorization", answer("Mufasa", "Circle of Life", &nonce, "/a"));
        assert!(matches!(digest.validate(&req).await, Err(AuthError::Invalid(_))));
    }

    #[tokio::test]
    async fn replayed_header_is_refused() {
        let digest = scheme();
        let nonce = nonce_of(&digest.challenge().unwrap());
        let first = Request::new("GET", "/a").with_header("authorization", answer("Mufasa", "Circle of Life", &nonce, "/a"));
        assert!(digest.validate(&first).await.unwrap().is_some());
        assert!(matches!(digest.validate(&first).await, Err(AuthError::Invalid(_))));

        let next = answer_nc("Mufasa", "Circle of Life", &nonce, "/a", "00000002");
        let second = Request::new("GET", "/a").with_header("authorization", next);
        assert!(digest.validate(&second).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn no_qop_nonce_is_single_use() {
        let digest = scheme();
        let nonce = nonce_of(&digest.challenge().unwrap());
        let ha1 = digest_ha1("Mufasa", REALM, "Circle of Life");
        let response = sha256_hex(&format!("{ha1}:{nonce}:{}", sha256_hex("GET:/a")));
        let header = format!(r#"Digest username="Mufasa", realm="{REALM}", nonce="{nonce}", uri="/a", response="{response}""#);
        let req = Request::new("GET", "/a").with_header("authorization", header);
        assert!(digest.validate(&req).await.unwrap().is_some());
        assert!(matches!(digest.validate(&req).await, Err(AuthError::Invalid(_))));
    }

    #[tokio::test]
    async fn wrong_answer_does_not_burn_the_count() {
        let digest = scheme();
        let nonce = nonce_of(&digest.challenge().unwrap());
        let wrong = Request::new("GET", "/a").with_header("authorization", answer("Mufasa", "nope", &nonce, "/a"));
        assert_eq!(digest.validate(&wrong).await, Ok(None));
        let right = Request::new("GET", "/a").with_header("authorization", answer("Mufasa", "Circle of Life", &nonce, "/a"));
        assert!(digest.validate(&right).await.unwrap().is_some());
    }

    #[test]
    fn old_nonces_are_evicted() {
        let digest = scheme();
        let first = nonce_of(&digest.challenge().unwrap());
        for _ in 0..NONCE_CAPACITY {
            digest.challenge();
        }
        assert!(!digest.knows_nonce(&first));
    }

    #[test]
    fn params_handle_quotes_and_escapes() {
        let p = parse_params(r#"username="Mu\"fasa", qop=auth ,nc=00000001, realm="a, b""#).unwrap();
        assert_eq!(p["username"], "Mu\"fasa");
        assert_eq!(p["qop"], "auth");
        assert_eq!(p["nc"], "00000001");
        assert_eq!(p["realm"], "a, b");
        assert!(parse_params(r#"username="open"#).is_err());
        assert!(parse_params("username").is_err());
    }
}
