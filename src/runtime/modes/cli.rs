//! Configuration helper commands

use colored::Colorize;

use crate::config::StaticConfig;
use crate::errors::{GoipError, Result};

/// 输出示例配置；指定文件时写入文件
pub fn generate_config(output: Option<&str>, force: bool) -> Result<()> {
    let sample = StaticConfig::generate_sample_config();
    let Some(path) = output else {
        println!("{}", sample);
        return Ok(());
    };

    if std::path::Path::new(path).exists() && !force {
        return Err(GoipError::file_operation(format!(
            "{} already exists (use --force to overwrite)",
            path
        )));
    }

    if let Some(parent) = std::path::Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, sample)?;
    println!("{} Sample configuration written to {}", "✓".green(), path);
    Ok(())
}

/// 加载并校验配置
pub fn check_config(path: &str) -> Result<StaticConfig> {
    let config = StaticConfig::load(path)?;
    println!("{} Configuration is valid", "✓".green());
    println!("  server:     {}:{}", config.server.host, config.server.port);
    println!(
        "  cache:      {} ({}, ttl {}s)",
        if config.cache.enabled { "enabled" } else { "disabled" },
        config.cache.backend,
        config.cache.ttl.as_secs()
    );
    println!(
        "  rate limit: {} ({}/min, {}/hour, {})",
        if config.rate_limit.enabled { "enabled" } else { "disabled" },
        config.rate_limit.requests_per_minute,
        config.rate_limit.requests_per_hour,
        config.rate_limit.storage
    );
    for provider in config.effective_providers() {
        println!(
            "  provider:   {} (priority {}, region '{}'){}",
            provider.kind,
            provider.priority,
            provider.region,
            provider
                .db_path
                .as_deref()
                .map(|p| format!(" {}", p))
                .unwrap_or_default()
        );
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_config_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("goip.toml");
        let path = path.to_str().unwrap();

        generate_config(Some(path), false).unwrap();
        let parsed: StaticConfig = toml::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.providers.len(), 3);

        // 已存在时需要 --force
        assert!(generate_config(Some(path), false).is_err());
        assert!(generate_config(Some(path), true).is_ok());
    }
}
