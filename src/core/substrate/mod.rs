//! Contract with the remote execution substrate.
//!
//! The substrate hosts deployed operations and runs them on request. This
//! crate only ever talks to it through [`Substrate`]; the stdio JSON-RPC peer
//! in [`rpc`] is the production implementation.

pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;
use uuid::Uuid;

use crate::core::assets::AssetMap;

/// JSON-RPC error code the substrate uses for "operation already exists".
pub const CONFLICT_CODE: i64 = -32009;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub source: Value,
}

impl OperationDefinition {
    /// Loads every `*.json` file in `dir`, sorted by file name. Files that
    /// fail to read or parse are logged and skipped.
    pub async fn load_dir(dir: &Path) -> Result<Vec<Self>> {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = match tokio::fs::read_to_string(&path).await {
                Ok(content) => serde_json::from_str::<OperationDefinition>(&content)
                    .map_err(anyhow::Error::from),
                Err(e) => Err(e.into()),
            };
            match parsed {
                Ok(def) => definitions.push(def),
                Err(e) => warn!("Skipping operation definition {}: {}", path.display(), e),
            }
        }
        Ok(definitions)
    }
}

/// One entry of the substrate's operation inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOperation {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SubstrateError {
    #[error("operation already exists: {message}")]
    Conflict { message: String },
    /// Remote failure; the message is kept exactly as the substrate sent it.
    #[error("{message}")]
    Rpc { code: i64, message: String },
    #[error("substrate transport error: {0}")]
    Transport(String),
}

impl SubstrateError {
    /// Classifies a remote error. The structured code wins; the message
    /// substring is only a fallback for peers that do not send it.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == CONFLICT_CODE || message.to_lowercase().contains("already exists") {
            SubstrateError::Conflict { message }
        } else {
            SubstrateError::Rpc { code, message }
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SubstrateError::Conflict { .. })
    }
}

#[async_trait]
pub trait Substrate: Send + Sync {
    /// Registers a definition. Re-submitting identical content must report
    /// [`SubstrateError::Conflict`] rather than create a duplicate.
    async fn deploy(&self, definition: &OperationDefinition) -> Result<(), SubstrateError>;

    async fn list_operations(&self) -> Result<Vec<RemoteOperation>, SubstrateError>;

    async fn invoke(&self, id: &str, input: Value) -> Result<Value, SubstrateError>;
}

/// A live session with the substrate. Owns the per-connection deployment
/// state so a second deploy pass on the same connection is a cache hit.
pub struct Connection {
    id: Uuid,
    substrate: Arc<dyn Substrate>,
    pub(crate) assets: OnceCell<AssetMap>,
}

impl Connection {
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            substrate,
            assets: OnceCell::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn substrate(&self) -> &dyn Substrate {
        self.substrate.as_ref()
    }

    pub fn is_deployed(&self) -> bool {
        self.assets.initialized()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("deployed", &self.is_deployed())
            .finish()
    }
}
