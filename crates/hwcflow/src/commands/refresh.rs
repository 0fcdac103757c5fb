use super::{Project, print_result};
use colored::Colorize;
use std::path::Path;

pub async fn handle(manifest_path: &Path) -> anyhow::Result<()> {
    let project = Project::load(manifest_path).await?;
    println!("{}", "Refreshing state...".blue());
    let result = project.executor.refresh().await?;
    print_result(&result)
}
