use super::{Project, print_plan};
use colored::Colorize;
use std::path::Path;

pub async fn handle(manifest_path: &Path) -> anyhow::Result<()> {
    let project = Project::load(manifest_path).await?;
    println!("{}", "Planning changes...".blue());
    println!();

    let plan = project.executor.plan(&project.manifest).await?;
    print_plan(&plan);
    Ok(())
}
