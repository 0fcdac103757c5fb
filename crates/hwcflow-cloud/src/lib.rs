//! hwcflow resource engine
//!
//! Provider-agnostic building blocks for declaratively managed cloud
//! resources: attribute schemas, resource data, diagnostics, the status
//! poller, retries, concurrent sweeping, the state file and plan/apply.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   hwc CLI                        │
//! │        (plan / apply / destroy / sweep)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                hwcflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  trait CloudProvider / trait Resource     │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────┐ ┌──────────┐ ┌──────────────┐    │
//! │  │ Executor │ │  Poller  │ │ Sweep / State │    │
//! │  └──────────┘ └──────────┘ └──────────────┘    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//!          ┌────────▼─────────┐
//!          │   huaweicloud    │
//!          │    provider      │
//!          └──────────────────┘
//! ```

pub mod action;
pub mod diag;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod schema;
pub mod state;
pub mod sweep;
pub mod wait;

// Re-exports
pub use action::{Action, ActionType, ApplyResult, Plan, PlanSummary};
pub use diag::{DiagResult, Diagnostic, Diagnostics, Severity};
pub use error::{BoxError, CloudError, Result};
pub use executor::Executor;
pub use manifest::{Manifest, ResourceBlock};
pub use provider::{AuthStatus, CloudProvider};
pub use resource::{Operation, Resource, ResourceData, ResourceTimeouts};
pub use retry::{RetryConf, RetryError, retry, retry_with_wait_for_state};
pub use schema::{Attribute, Schema, Validator, ValueType};
pub use state::{GlobalState, ResourceState, ResourceStatus, StateLock, StateManager};
pub use sweep::{
    SweepError, SweepResource, Sweeper, SweeperRegistry, is_sweepable_name, sweep_orchestrated,
};
pub use wait::{RefreshResult, StateChangeConf, WaitError};
