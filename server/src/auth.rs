use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use error_stack::Report;

use kernel::interface::identity::{DependOnIdentityVerifier, IdentityVerifier};
use kernel::prelude::entity::UserId;
use kernel::KernelError;

use crate::error::ErrorStatus;
use crate::handler::AppModule;

/// Acting-user context resolved from the bearer credential by the external
/// identity provider. Routes never look at the token themselves.
pub struct Authenticated(pub UserId);

#[async_trait::async_trait]
impl FromRequestParts<AppModule> for Authenticated {
    type Rejection = ErrorStatus;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppModule,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    ErrorStatus::from(
                        Report::new(KernelError::Unauthenticated)
                            .attach_printable("missing or malformed bearer header"),
                    )
                })?;

        let user = state
            .identity_verifier()
            .verify(bearer.token())
            .await
            .map_err(ErrorStatus::from)?;
        Ok(Authenticated(user))
    }
}
