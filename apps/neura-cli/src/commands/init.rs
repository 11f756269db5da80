// init.rs — Write the default `.neura/` layout.

use std::path::Path;

use anyhow::Context;
use neura_pipeline::NeuraConfig;
use neura_policy::RuleSet;

pub fn execute(project_root: &Path, force: bool) -> anyhow::Result<()> {
    let config = NeuraConfig::for_project(project_root);
    let config_path = NeuraConfig::config_path(project_root);
    let rules_path = config.rules_file();

    write_unless_present(&config_path, &config.to_toml()?, force)?;
    write_unless_present(&rules_path, &RuleSet::default().to_yaml()?, force)?;

    println!("Journal will be written to {}", config.journal_file().display());
    Ok(())
}

fn write_unless_present(path: &Path, content: &str, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        println!("Keeping existing {} (use --force to overwrite)", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
