pub mod apply;
pub mod auth;
pub mod destroy;
pub mod plan;
pub mod refresh;
pub mod state;
pub mod sweep;
pub mod validate;

use colored::Colorize;
use hwcflow_cloud::{ActionType, ApplyResult, Executor, Manifest, Plan, StateManager};
use hwcflow_cloud_huawei::HuaweiProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Manifest, provider and executor for one project
pub struct Project {
    pub manifest: Manifest,
    pub provider: Arc<HuaweiProvider>,
    pub executor: Executor<HuaweiProvider>,
}

impl Project {
    pub async fn load(manifest_path: &Path) -> anyhow::Result<Self> {
        let manifest = Manifest::from_file(manifest_path).await?;
        debug!(
            path = %manifest_path.display(),
            resources = manifest.resources.len(),
            "Loaded manifest"
        );
        let provider = Arc::new(HuaweiProvider::from_settings(&manifest.provider)?);
        let root = project_root(manifest_path);
        debug!(region = provider.config().region(), root = %root.display(), "Configured provider");
        let state = StateManager::new(root);
        let executor = Executor::new(provider.clone(), state);
        Ok(Self {
            manifest,
            provider,
            executor,
        })
    }
}

/// The state directory lives next to the manifest
pub fn project_root(manifest_path: &Path) -> PathBuf {
    match manifest_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn print_plan(plan: &Plan) {
    if !plan.has_changes {
        println!("{}", "No changes. Resources match the manifest.".green());
        return;
    }

    for action in &plan.actions {
        let line = match action.action_type {
            ActionType::Create => format!("  + {}", action.address).green(),
            ActionType::Update => format!("  ~ {}", action.address).yellow(),
            ActionType::Replace => format!("-/+ {}", action.address).yellow().bold(),
            ActionType::Delete => format!("  - {}", action.address).red(),
            ActionType::NoOp => continue,
        };
        println!("{}", line);
        if !action.changed.is_empty() {
            println!("      changed: {}", action.changed.join(", ").dimmed());
        }
    }
    println!();
    println!("Plan: {}", plan.summary().to_string().bold());
}

/// Print the outcome of an apply-like run; errors when anything failed
pub fn print_result(result: &ApplyResult) -> anyhow::Result<()> {
    for ok in &result.succeeded {
        println!("  {} {}: {}", "✓".green(), ok.address.cyan(), ok.message);
    }
    for failed in &result.failed {
        eprintln!(
            "  {} {}: {}",
            "✗".red(),
            failed.address.cyan(),
            failed.error.as_deref().unwrap_or_default()
        );
    }
    println!();
    println!(
        "{} succeeded, {} failed ({:.1}s)",
        result.succeeded.len(),
        result.failed.len(),
        result.duration_ms as f64 / 1000.0
    );

    if !result.is_success() {
        anyhow::bail!("{} resource(s) failed", result.failed.len());
    }
    Ok(())
}
