//! HuaweiCloud provider for hwcflow
//!
//! This crate implements the [`CloudProvider`](hwcflow_cloud::CloudProvider)
//! trait for HuaweiCloud, managing resources through the service REST APIs.
//!
//! # Resources
//!
//! - `huaweicloud_as_group`: Auto Scaling group
//! - `huaweicloud_as_bandwidth_policy`: Auto Scaling policy on a bandwidth
//! - `huaweicloud_drs_job`: Data Replication Service job
//! - `huaweicloud_scm_certificate`: SSL certificate from SCM
//!
//! # Authentication
//!
//! Requests are authenticated with an IAM token (`X-Auth-Token`) or signed
//! with an access key pair (`SDK-HMAC-SHA256`). Settings come from the
//! manifest's `provider:` block; unset fields fall back to `HW_REGION_NAME`,
//! `HW_ACCESS_KEY`, `HW_SECRET_KEY`, `HW_AUTH_TOKEN` and friends.
//!
//! # Example
//!
//! ```ignore
//! use hwcflow_cloud::CloudProvider;
//! use hwcflow_cloud_huawei::HuaweiProvider;
//!
//! let provider = HuaweiProvider::from_settings(&serde_json::json!({
//!     "region": "cn-north-4",
//! }))?;
//!
//! let auth = provider.check_auth().await?;
//! if !auth.authenticated {
//!     panic!("Not authenticated: {:?}", auth.error);
//! }
//! ```

pub mod catalog;
pub mod client;
pub mod common;
pub mod config;
pub mod error;
pub mod provider;
pub mod services;
pub mod signer;
pub mod sweepers;
pub mod utils;

pub use client::{RequestOpts, ServiceClient};
pub use common::{
    check_deleted, convert_expected_400_err_into_404_err, convert_expected_403_err_into_404_err,
    convert_expected_500_err_into_404_err,
};
pub use config::{Config, Credentials, ProviderConfig};
pub use error::{ApiError, HuaweiError, Result};
pub use provider::HuaweiProvider;
pub use services::{AsBandwidthPolicy, AsGroup, DrsJob, ScmCertificate};
