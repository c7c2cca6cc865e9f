//! Form authentication: credentials posted as urlencoded body fields.

use std::future::Future;

use super::{AuthError, AuthScheme, Identity, UserPasswordCredential};
use crate::handler::BoxFuture;
use crate::negotiate::parse_pairs;
use crate::request::Request;

const FORM: &str = "application/x-www-form-urlencoded";

/// Reads `user` / `password` (or the configured field names) from an
/// urlencoded body. Sends no challenge on rejection.
pub struct Form<V> {
    name: String,
    user_field: String,
    password_field: String,
    validator: V,
}

impl<V> Form<V> {
    pub fn new(name: impl Into<String>, validator: V) -> Self {
        Self {
            name: name.into(),
            user_field: "user".to_owned(),
            password_field: "password".to_owned(),
            validator,
        }
    }

    pub fn fields(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user_field = user.into();
        self.password_field = password.into();
        self
    }
}

impl<V, Fut> AuthScheme for Form<V>
where
    V: Fn(UserPasswordCredential) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Identity>> + Send + 'static,
{
    fn name(&self) -> &str { &self.name }

    fn validate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<Option<Identity>, AuthError>> {
        Box::pin(async move {
            let is_form = req
                .header("content-type")
                .and_then(|ct| ct.split(';').next())
                .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(FORM));
            if !is_form {
                return Err(AuthError::Missing);
            }

            let mut name = None;
            let mut password = None;
            let pairs = parse_pairs(req.body()).map_err(|e| AuthError::Malformed(e.to_string()))?;
            for (key, value) in pairs {
                if key == self.user_field {
                    name = Some(value);
                } else if key == self.password_field {
                    password = Some(value);
                }
            }

            match (name, password) {
                (Some(name), Some(password)) => Ok((self.validator)(UserPasswordCredential { name, password }).await),
                _ => Err(AuthError::Missing),
            }
        })
    }
}
