use colored::Colorize;
use hwcflow_cloud::{CloudProvider, Manifest};
use hwcflow_cloud_huawei::HuaweiProvider;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

pub async fn handle(
    manifest_path: &Path,
    region: Option<String>,
    sweepers: Vec<String>,
    yes: bool,
) -> anyhow::Result<()> {
    // without a manifest the provider is configured from HW_* variables
    let settings = if manifest_path.exists() {
        Manifest::from_file(manifest_path).await?.provider
    } else {
        debug!(path = %manifest_path.display(), "No manifest, using HW_* environment");
        Value::Null
    };
    let provider = HuaweiProvider::from_settings(&settings)?;
    let region = region.unwrap_or_else(|| provider.config().region().to_string());
    let registry = provider.sweepers()?;
    let order = registry.run_order(&sweepers)?;

    println!(
        "{}",
        format!("Sweepers for region {}:", region).blue().bold()
    );
    for name in &order {
        println!("  • {}", name.cyan());
    }

    if !yes {
        println!();
        println!(
            "{}",
            "Resources named with a test prefix will be deleted.".yellow()
        );
        println!("Run again with --yes to sweep");
        return Ok(());
    }

    println!();
    info!(region = %region, sweepers = order.len(), "Sweeping");
    let ran = registry.run(&region, provider.meta(), &sweepers).await?;
    println!(
        "{}",
        format!("✓ {} sweeper(s) completed in {}", ran.len(), region).green()
    );
    Ok(())
}
