//! A dispatcher that performs no real I/O.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::{ActionDispatcher, ActionType, EffectError};

/// Logs every action through `tracing` and reports success.
///
/// Used by the CLI `simulate` command to dry-run a definition.
#[derive(Debug, Default, Clone)]
pub struct TracingDispatcher;

#[async_trait]
impl ActionDispatcher for TracingDispatcher {
    async fn invoke(
        &self,
        action: ActionType,
        params: &Map<String, Value>,
    ) -> Result<Value, EffectError> {
        let params = Value::Object(params.clone());
        info!(action = %action, params = %params, "dry-run action");
        Ok(json!({ "action": action.as_str(), "dry_run": true }))
    }
}
