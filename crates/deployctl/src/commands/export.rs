use anyhow::{Context, Result};
use deploy_config::{Config, ExportFormat, export};
use std::path::Path;

pub fn run(config: &Config, format: ExportFormat, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            export::write_file(config, path, format)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✓ Exported {} configuration to {}", format, path.display());
        }
        None => {
            let rendered = export::render(config, format).context("Failed to render configuration")?;
            print!("{}", rendered);
            if !rendered.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}
