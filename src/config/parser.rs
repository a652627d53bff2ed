use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// Keywords listed in `keywords-file` are appended to the inline keyword
/// list. A relative keywords file is resolved against the config file's
/// directory.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use sumi_sieve::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Threshold: {}", config.search.further_threshold);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    // Read the configuration file
    let content = std::fs::read_to_string(path)?;

    // Parse TOML
    let mut config: Config = toml::from_str(&content)?;

    if let Some(file) = config.search.keywords_file.clone() {
        let keywords_path = match path.parent() {
            Some(dir) if Path::new(&file).is_relative() => dir.join(&file),
            _ => Path::new(&file).to_path_buf(),
        };
        let extra = read_keyword_file(&keywords_path)?;
        tracing::debug!(
            "Loaded {} keyword(s) from {}",
            extra.len(),
            keywords_path.display()
        );
        config.search.keywords.extend(extra);
    }

    // Validate the configuration
    validate(&config)?;

    Ok(config)
}

/// Reads one keyword per line, skipping blank lines
pub fn read_keyword_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Computes a SHA-256 hash of the configuration file content
///
/// The hash is stored with each run so runs made with different settings
/// can be told apart.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
