use super::Project;
use colored::Colorize;
use hwcflow_cloud::ResourceStatus;
use std::path::Path;

pub async fn handle(manifest_path: &Path, json: bool) -> anyhow::Result<()> {
    let project = Project::load(manifest_path).await?;
    let state = project.executor.state().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state.resources)?);
        return Ok(());
    }

    if state.resources.is_empty() {
        println!("{}", "No resources in state.".dimmed());
        return Ok(());
    }

    println!("{}", "ADDRESS\tID\tSTATUS".bold());
    for (address, resource) in &state.resources {
        let status = match resource.status {
            ResourceStatus::Ready => resource.status.to_string().green(),
            ResourceStatus::Tainted => resource.status.to_string().red(),
        };
        println!("{}\t{}\t{}", address.cyan(), resource.id, status);
    }
    Ok(())
}
