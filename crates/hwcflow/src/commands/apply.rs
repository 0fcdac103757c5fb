use super::{Project, print_plan, print_result};
use colored::Colorize;
use std::path::Path;

pub async fn handle(manifest_path: &Path, yes: bool) -> anyhow::Result<()> {
    let project = Project::load(manifest_path).await?;
    let plan = project.executor.plan(&project.manifest).await?;
    print_plan(&plan);
    if !plan.has_changes {
        return Ok(());
    }

    if !yes {
        println!();
        println!("{}", "Resources will be changed in the cloud.".yellow().bold());
        println!("Run again with --yes to apply");
        return Ok(());
    }

    println!();
    println!("{}", "Applying...".blue().bold());
    let result = project.executor.apply(&project.manifest).await?;
    print_result(&result)
}
