use anyhow::Context;
use std::path::Path;
use vigil_core::config::VigilConfig;
use vigil_core::paths;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let vigil_dir = paths::vigil_dir(root);
    if paths::config_path(root).exists() {
        println!("already initialized at {}", vigil_dir.display());
        return Ok(());
    }

    VigilConfig::default()
        .save(root)
        .context("failed to write config")?;
    std::fs::create_dir_all(paths::approvals_dir(root))?;

    println!("initialized {}", vigil_dir.display());
    println!("edit {} to configure tools and the orchestrator", paths::config_path(root).display());
    Ok(())
}
