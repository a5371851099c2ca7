use apparition_core::{Config, Paths};

/// Show the current configuration as pretty-printed JSON.
pub async fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    println!("File: {}", paths.config_file().display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn path() -> anyhow::Result<()> {
    println!("{}", Paths::new().config_file().display());
    Ok(())
}

/// Write the default configuration, refusing to clobber an existing file.
pub async fn init(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config_path = paths.config_file();
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    Config::default().save(&config_path)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}
