use super::Project;
use colored::Colorize;
use hwcflow_cloud::CloudProvider;
use std::path::Path;

pub async fn handle(manifest_path: &Path) -> anyhow::Result<()> {
    let project = Project::load(manifest_path).await?;
    let status = project.provider.check_auth().await?;
    if status.authenticated {
        println!(
            "{} {}: {}",
            "✓".green(),
            project.provider.display_name(),
            status.account_info.unwrap_or_default()
        );
        Ok(())
    } else {
        anyhow::bail!(
            "{} authentication failed: {}",
            project.provider.display_name(),
            status.error.unwrap_or_default()
        )
    }
}
