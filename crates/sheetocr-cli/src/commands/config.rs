//! Config command - manage configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;

use sheetocr_core::SheetOcrConfig;

use super::config_path;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Initialize a new configuration file
    Init(InitArgs),

    /// Get a specific configuration value
    Get {
        /// Configuration key (e.g., "raster.dpi")
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value (JSON, or a bare string)
        value: String,
    },

    /// Show configuration file path
    Path,
}

#[derive(Args)]
struct InitArgs {
    /// Output path for configuration file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Overwrite existing file
    #[arg(long)]
    force: bool,
}

pub async fn run(args: ConfigArgs, config: Option<&str>) -> anyhow::Result<()> {
    let path = config_path(config);
    match args.command {
        ConfigCommand::Show => show_config(&path),
        ConfigCommand::Init(init_args) => init_config(init_args, path),
        ConfigCommand::Get { key } => get_config(&path, &key),
        ConfigCommand::Set { key, value } => set_config(&path, &key, &value),
        ConfigCommand::Path => show_path(&path),
    }
}

fn load_or_default(path: &Path) -> anyhow::Result<SheetOcrConfig> {
    if path.exists() {
        Ok(SheetOcrConfig::from_file(path)?)
    } else {
        Ok(SheetOcrConfig::default())
    }
}

fn show_config(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        eprintln!("{} No config file found, showing defaults.", style("ℹ").blue());
    }
    let config = load_or_default(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn init_config(args: InitArgs, default_path: PathBuf) -> anyhow::Result<()> {
    let output_path = args.output.unwrap_or(default_path);

    if output_path.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            output_path.display()
        );
    }

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    SheetOcrConfig::default().save(&output_path)?;

    println!(
        "{} Created configuration file at {}",
        style("✓").green(),
        output_path.display()
    );
    Ok(())
}

/// Look up a dotted key in the JSON form of the configuration.
pub fn lookup(config: &SheetOcrConfig, key: &str) -> anyhow::Result<serde_json::Value> {
    let json = serde_json::to_value(config)?;
    key.split('.')
        .try_fold(&json, |current, part| current.get(part))
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Configuration key not found: {}", key))
}

/// Set a dotted key, re-validating the whole configuration.
pub fn assign(config: &SheetOcrConfig, key: &str, value: serde_json::Value) -> anyhow::Result<SheetOcrConfig> {
    let mut json = serde_json::to_value(config)?;
    let (parents, last) = match key.rsplit_once('.') {
        Some((parents, last)) => (Some(parents), last),
        None => (None, key),
    };

    let mut current = &mut json;
    for part in parents.into_iter().flat_map(|p| p.split('.')) {
        current = current
            .get_mut(part)
            .ok_or_else(|| anyhow::anyhow!("Configuration path not found: {}", key))?;
    }

    let object = current
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("Cannot set value at non-object path: {}", key))?;
    if !object.contains_key(last) {
        anyhow::bail!("Configuration key not found: {}", key);
    }
    object.insert(last.to_string(), value);

    let updated: SheetOcrConfig = serde_json::from_value(json)?;
    updated.validate()?;
    Ok(updated)
}

fn get_config(path: &Path, key: &str) -> anyhow::Result<()> {
    let config = load_or_default(path)?;
    println!("{}", serde_json::to_string_pretty(&lookup(&config, key)?)?);
    Ok(())
}

fn set_config(path: &Path, key: &str, value: &str) -> anyhow::Result<()> {
    let config = load_or_default(path)?;

    let parsed: serde_json::Value =
        serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    let updated = assign(&config, key, parsed.clone())?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    updated.save(path)?;

    println!("{} Set {} = {}", style("✓").green(), key, serde_json::to_string(&parsed)?);
    Ok(())
}

fn show_path(path: &Path) -> anyhow::Result<()> {
    println!("Configuration file: {}", path.display());

    if path.exists() {
        println!("Status: {}", style("exists").green());
    } else {
        println!("Status: {}", style("not created").yellow());
        println!();
        println!("Run 'sheetocr config init' to create a configuration file.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup() {
        let config = SheetOcrConfig::default();
        assert_eq!(lookup(&config, "raster.dpi").unwrap(), json!(200));
        assert_eq!(lookup(&config, "fetch.retry.max_attempts").unwrap(), json!(3));
        assert!(lookup(&config, "raster.nope").is_err());
    }

    #[test]
    fn test_assign() {
        let config = SheetOcrConfig::default();
        let updated = assign(&config, "run.concurrency", json!(4)).unwrap();
        assert_eq!(updated.run.concurrency, 4);

        let updated = assign(&config, "sink.empty_text", json!("-")).unwrap();
        assert_eq!(updated.sink.empty_text.as_deref(), Some("-"));

        assert!(assign(&config, "run.concurency", json!(4)).is_err());
        // Breaks the DPI contract.
        assert!(assign(&config, "raster.dpi", json!(300)).is_err());
    }
}
