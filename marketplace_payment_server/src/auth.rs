//! Caller identity extraction.
//!
//! Authentication itself lives with the session/auth collaborator in front of this server. By the time a
//! request reaches us, the collaborator has verified credentials and injected the caller's identity into a
//! trusted header. This module turns that header into a typed [`Principal`]; nothing here checks passwords,
//! tokens or signatures.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use log::*;
use marketplace_payment_engine::db_types::Principal;

use crate::{
    config::IDENTITY_HEADER,
    errors::{AuthError, ServerError},
};

/// The verified caller identity, extracted from the trusted identity header.
///
/// `platform-admin` and `seller:<id>` are the only accepted forms. Anything else is a 401, on the grounds
/// that a gateway misconfiguration should fail closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity(pub Principal);

impl CallerIdentity {
    pub fn principal(&self) -> &Principal {
        &self.0
    }
}

impl FromRequest for CallerIdentity {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match req.headers().get(IDENTITY_HEADER) {
            None => Err(AuthError::MissingIdentity),
            Some(value) => value
                .to_str()
                .map_err(|e| AuthError::MalformedIdentity(e.to_string()))
                .and_then(|s| {
                    s.parse::<Principal>().map_err(|e| {
                        debug!("🔐️ Rejecting malformed identity header: {e}");
                        AuthError::MalformedIdentity(e.to_string())
                    })
                })
                .map(CallerIdentity),
        };
        ready(result.map_err(ServerError::from))
    }
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    #[actix_web::test]
    async fn identities_parse_from_the_trusted_header() {
        let req = TestRequest::default().insert_header((IDENTITY_HEADER, "platform-admin")).to_http_request();
        let id = CallerIdentity::extract(&req).await.unwrap();
        assert_eq!(id.0, Principal::PlatformAdmin);

        let req = TestRequest::default().insert_header((IDENTITY_HEADER, "seller:42")).to_http_request();
        let id = CallerIdentity::extract(&req).await.unwrap();
        assert_eq!(id.0, Principal::Seller(42));
    }

    #[actix_web::test]
    async fn missing_or_malformed_identities_are_rejected() {
        let req = TestRequest::default().to_http_request();
        assert!(CallerIdentity::extract(&req).await.is_err());
        let req = TestRequest::default().insert_header((IDENTITY_HEADER, "customer:9")).to_http_request();
        assert!(CallerIdentity::extract(&req).await.is_err());
    }
}
