//! Bearer JWT authentication.

use std::future::Future;
use std::marker::PhantomData;

use jsonwebtoken::{DecodingKey, Validation};
use serde::de::DeserializeOwned;

use super::{AuthError, AuthScheme, Identity, authorization};
use crate::handler::BoxFuture;
use crate::request::Request;

/// Verifies `Authorization: Bearer <token>` with [`jsonwebtoken`], then maps
/// the decoded claims to an identity.
///
/// Signature, `exp` and whatever else `validation` enables are checked before
/// the validator sees the claims.
pub struct Jwt<C, V> {
    name: String,
    realm: String,
    key: DecodingKey,
    validation: Validation,
    validator: V,
    _claims: PhantomData<fn() -> C>,
}

impl<C, V> Jwt<C, V> {
    pub fn new(name: impl Into<String>, realm: impl Into<String>, key: DecodingKey, validation: Validation, validator: V) -> Self {
        Self {
            name: name.into(),
            realm: realm.into(),
            key,
            validation,
            validator,
            _claims: PhantomData,
        }
    }
}

impl<C, V, Fut> AuthScheme for Jwt<C, V>
where
    C: DeserializeOwned + Send + 'static,
    V: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<Identity>> + Send + 'static,
{
    fn name(&self) -> &str { &self.name }

    fn validate<'a>(&'a self, req: &'a Request) -> BoxFuture<'a, Result<Option<Identity>, AuthError>> {
        Box::pin(async move {
            let token = authorization(req, "Bearer")?;
            let data = jsonwebtoken::decode::<C>(token, &self.key, &self.validation)
                .map_err(|e| AuthError::Invalid(e.to_string()))?;
            Ok((self.validator)(data.claims).await)
        })
    }

    fn challenge(&self) -> Option<String> {
        Some(format!(r#"Bearer realm="{}""#, self.realm))
    }
}
