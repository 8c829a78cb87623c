use std::time::Duration;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use kernel::interface::identity::IdentityVerifier;
use kernel::prelude::entity::UserId;
use kernel::KernelError;

use crate::env;
use crate::error::ConvertError;

static IDENTITY_BASE_URL: &str = "IDENTITY_BASE_URL";

const IDENTITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the external identity provider. Tokens are opaque here; the
/// provider either resolves one to a stable uid or it does not.
pub struct HttpIdentityVerifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityVerifier {
    pub fn from_env() -> error_stack::Result<Self, KernelError> {
        let client = reqwest::Client::builder()
            .timeout(IDENTITY_TIMEOUT)
            .build()
            .change_context_lazy(|| KernelError::Internal)?;
        Ok(Self {
            client,
            base_url: env(IDENTITY_BASE_URL)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VerifiedIdentity {
    uid: String,
}

#[async_trait::async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    async fn verify(&self, token: &str) -> error_stack::Result<UserId, KernelError> {
        let response = self
            .client
            .get(format!("{}/verify", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .convert_error()?;

        if !response.status().is_success() {
            return Err(Report::new(KernelError::Unauthenticated)
                .attach_printable(format!("identity provider answered {}", response.status())));
        }

        let identity: VerifiedIdentity = response.json().await.convert_error()?;
        Ok(UserId::new(identity.uid))
    }
}
