use async_trait::async_trait;
use provisor_core::{OrchestrationAction, SuccessPayload};

use crate::error::ProvisioningError;

/// Strongly-typed handler trait with native `async fn`.
///
/// A handler performs the provisioning side effect for one lifecycle event
/// and reports either a [`SuccessPayload`] or a [`ProvisioningError`].
///
/// This trait is **not** object-safe. Implement it and rely on the blanket
/// [`DynHandler`] implementation when handlers must be stored as
/// `Arc<dyn DynHandler>`.
pub trait Handler: Send + Sync {
    /// Name used in logs and the registry listing.
    fn name(&self) -> &str;

    /// Perform the provisioning side effect for `action`.
    fn handle(
        &self,
        action: &OrchestrationAction,
    ) -> impl std::future::Future<Output = Result<SuccessPayload, ProvisioningError>> + Send;
}

/// Object-safe handler trait for use behind `Arc<dyn DynHandler>`.
///
/// You generally should not implement this trait directly; implement
/// [`Handler`] instead.
#[async_trait]
pub trait DynHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(
        &self,
        action: &OrchestrationAction,
    ) -> Result<SuccessPayload, ProvisioningError>;
}

#[async_trait]
impl<T: Handler + Sync> DynHandler for T {
    fn name(&self) -> &str {
        Handler::name(self)
    }

    async fn handle(
        &self,
        action: &OrchestrationAction,
    ) -> Result<SuccessPayload, ProvisioningError> {
        Handler::handle(self, action).await
    }
}
