use anyhow::Context;
use forge_core::{config::Config, io, paths};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    println!("Initializing gherkin-forge in: {}", root.display());

    for dir in [paths::FORGE_DIR, paths::FEATURES_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        let config = Config::load(root).context("failed to read config.yaml")?;
        for w in config.validate() {
            eprintln!("  warning: {}", w.message);
        }
    } else {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    println!("\nNext: forge feature create \"<title>\" --story \"<user story>\"");
    Ok(())
}
