//! Cloud provider trait definition

use crate::error::Result;
use crate::resource::Resource;
use crate::sweep::SweeperRegistry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cloud provider abstraction trait
///
/// A configured provider owns the client state ("meta") its resources
/// share, the set of resource types it manages and the sweepers that clean
/// up after acceptance tests.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Client state passed to every resource operation
    type Meta: Send + Sync + 'static;

    /// Returns the provider name (e.g., "huaweicloud")
    fn name(&self) -> &str;

    /// Returns the provider display name for UI
    fn display_name(&self) -> &str;

    fn meta(&self) -> Arc<Self::Meta>;

    /// Every resource type this provider manages
    fn resources(&self) -> Vec<Arc<dyn Resource<Self::Meta>>>;

    /// Look up a resource type by name
    fn resource(&self, type_name: &str) -> Option<Arc<dyn Resource<Self::Meta>>> {
        self.resources()
            .into_iter()
            .find(|r| r.type_name() == type_name)
    }

    /// Sweepers of the provider's resource types
    fn sweepers(&self) -> Result<SweeperRegistry<Self::Meta>>;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}
