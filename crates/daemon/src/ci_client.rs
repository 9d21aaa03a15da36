//! Contract with the CI server.

use async_trait::async_trait;
use traffic_light_core::model::CheckStateResult;
use traffic_light_core::TransportError;

/// Queries the CI server for the status of a set of build types.
#[async_trait]
pub trait CiStatusClient: Send + Sync {
    /// Status of `build_type_ids`; items come back in request order.
    async fn check_state(&self, build_type_ids: &[String]) -> Result<CheckStateResult, TransportError>;
}
