//! HTTP Basic authentication (RFC 7617).

use std::future::Future;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{AuthError, AuthScheme, Identity, UserPasswordCredential, authorization};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Basic auth with an async user/password validator.
///
/// ```rust
/// use gatehouse::auth::{Basic, Identity, UserPasswordCredential};
///
/// let basic = Basic::new("basic", "ktor", |cred: UserPasswordCredential| async move {
///     (cred.name == "user" && cred.password == "password").then(|| Identity::new(cred.name))
/// });
/// ```
pub struct Basic<V> {
    name: String,
    realm: String,
    validator: V,
}

impl<V> Basic<V> {
    pub fn new(name: impl Into<String>, realm: impl Into<String>, validator: V) -> Self {
        Self { name: name.into(), realm: realm.into(), validator }
    }
}

impl<V, Fut> AuthScheme for Basic<V>
where
    V: Fn(UserPasswordCredential) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Identity>> + Send + 'static,
{
    fn name(&self) -> &str { &self.name }

    fn validate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<Option<Identity>, AuthError>> {
        Box::pin(async move {
            let credential = parse(authorization(req, "Basic")?)?;
            Ok((self.validator)(credential).await)
        })
    }

    fn challenge(&self) -> Option<String> {
        Some(format!(r#"Basic realm="{}", charset="UTF-8""#, self.realm))
    }
}

fn parse(encoded: &str) -> Result<UserPasswordCredential, AuthError> {
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| AuthError::Malformed(format!("base64: {e}")))?;
    let text = String::from_utf8(decoded).map_err(|_| AuthError::Malformed("credentials are not UTF-8".into()))?;
    let (name, password) = text
        .split_once(':')
        .ok_or_else(|| AuthError::Malformed("missing `:` separator".into()))?;
    Ok(UserPasswordCredential { name: name.to_owned(), password: password.to_owned() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> impl AuthScheme {
        Basic::new("basic", "ktor", |cred: UserPasswordCredential| async move {
            (cred.name == "user" && cred.password == "password").then(|| Identity::new(cred.name))
        })
    }

    fn with_auth(value: &str) -> Request {
        Request::new("GET", "/").with_header("authorization", value)
    }

    #[tokio::test]
    async fn accepts_matching_credentials() {
        let req = with_auth(&format!("Basic {}", STANDARD.encode("user:password")));
        let identity = scheme().validate(&req).await.unwrap().unwrap();
        assert_eq!(identity.name(), "user");
    }

    #[tokio::test]
    async fn wrong_password_yields_no_identity() {
        let req = with_auth(&format!("Basic {}", STANDARD.encode("user:nope")));
        assert_eq!(scheme().validate(&req).await, Ok(None));
    }

    #[test]
    fn password_may_contain_colons() {
        let cred = parse(&STANDARD.encode("user:pa:ss")).unwrap();
        assert_eq!(cred.password, "pa:ss");
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let req = with_auth("Basic !!!");
        assert!(matches!(scheme().validate(&req).await, Err(AuthError::Malformed(_))));
        let req = with_auth(&format!("Basic {}", STANDARD.encode("no-separator")));
        assert!(matches!(scheme().validate(&req).await, Err(AuthError::Malformed(_))));
    }

    #[test]
    fn challenge_names_the_realm() {
        assert_eq!(scheme().challenge().unwrap(), r#"Basic realm="ktor", charset="UTF-8""#);
    }
}
