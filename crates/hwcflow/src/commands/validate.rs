use colored::Colorize;
use hwcflow_cloud::{CloudProvider, Diagnostic, Manifest};
use hwcflow_cloud_huawei::HuaweiProvider;
use std::path::Path;

pub async fn handle(manifest_path: &Path) -> anyhow::Result<()> {
    println!("{}", "Validating manifest...".blue());
    let manifest = Manifest::from_file(manifest_path).await?;
    let provider = HuaweiProvider::from_settings(&manifest.provider)?;

    let mut failures = 0;
    for block in &manifest.resources {
        let Some(resource) = provider.resource(&block.resource_type) else {
            eprintln!(
                "  {} {}: unsupported resource type",
                "✗".red(),
                block.address().cyan()
            );
            failures += 1;
            continue;
        };

        let schema = resource.schema();
        let mut config = block.config.clone();
        schema.apply_defaults(&mut config);
        let mut diags = schema.validate(&config);
        if let Err(e) = block.timeouts.resolve() {
            diags.push(Diagnostic::error(e.to_string()).with_attribute("timeouts"));
        }

        for warning in diags.warnings() {
            println!("  {} {}: {}", "!".yellow(), block.address().cyan(), warning);
        }
        if diags.has_error() {
            for error in diags.errors() {
                eprintln!("  {} {}: {}", "✗".red(), block.address().cyan(), error);
            }
            failures += 1;
        } else {
            println!("  {} {}", "✓".green(), block.address().cyan());
        }
    }

    if failures > 0 {
        anyhow::bail!("{} resource(s) have configuration errors", failures);
    }
    println!(
        "{}",
        format!("✓ {} resource(s) valid", manifest.resources.len()).green().bold()
    );
    Ok(())
}
