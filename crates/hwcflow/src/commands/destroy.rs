use super::Project;
use colored::Colorize;
use std::path::Path;

pub async fn handle(manifest_path: &Path, yes: bool) -> anyhow::Result<()> {
    let project = Project::load(manifest_path).await?;
    let state = project.executor.state().await?;
    if state.resources.is_empty() {
        println!("{}", "Nothing to destroy.".green());
        return Ok(());
    }

    for (address, resource) in &state.resources {
        println!("  - {} ({})", address.red(), resource.id.dimmed());
    }

    if !yes {
        println!();
        println!(
            "{}",
            format!("{} resource(s) will be deleted. This cannot be undone.", state.resources.len())
                .red()
                .bold()
        );
        println!("Run again with --yes to destroy");
        return Ok(());
    }

    println!();
    println!("{}", "Destroying...".red().bold());
    let count = project.executor.destroy().await?;
    println!("{}", format!("✓ {} resource(s) destroyed", count).green());
    Ok(())
}
