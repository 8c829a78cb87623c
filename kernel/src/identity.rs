use crate::entity::UserId;
use crate::KernelError;

/// External identity provider. Given a bearer credential it returns the
/// stable user id or `Unauthenticated`; this system never inspects tokens
/// itself.
#[async_trait::async_trait]
pub trait IdentityVerifier: 'static + Sync + Send {
    async fn verify(&self, token: &str) -> error_stack::Result<UserId, KernelError>;
}

pub trait DependOnIdentityVerifier: 'static + Sync + Send {
    type IdentityVerifier: IdentityVerifier;
    fn identity_verifier(&self) -> &Self::IdentityVerifier;
}
