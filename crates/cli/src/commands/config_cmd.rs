//! `m1nd config`: Configuration management commands.

use std::path::Path;

use anyhow::{Context, bail};
use m1nd_config::AppConfig;

const REDACTED: &str = "[REDACTED]";

pub async fn validate(config_path: &Path) -> anyhow::Result<()> {
    println!("🔍 Validating {}...", config_path.display());

    let config = match AppConfig::load_with_env(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ {e}");
            bail!("configuration is invalid");
        }
    };
    println!("   ✅ Config parsed successfully");

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   ✅ All checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   ⚠️  {w}");
        }
    }

    println!();
    println!("   Providers:  {}", config.provider_priority.join(" → "));
    println!("   History:    {} turns", config.conversation.max_history);
    println!("   Tools:      {}", if config.tools.web_search { "web_search" } else { "none" });
    println!(
        "   Telegram:   {}",
        if config.telegram.is_some() { "configured" } else { "not configured" }
    );
    Ok(())
}

/// Problems that do not stop the bot from starting but will hurt it.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    for p in &config.providers {
        if p.api_key.is_none() && !p.api_url.contains("localhost") {
            warnings.push(format!("Provider '{}' has no API key", p.id));
        }
    }

    match &config.telegram {
        Some(t) if t.bot_token.is_empty() => warnings.push("telegram.bot_token is empty".into()),
        Some(t) if t.allowed_users.is_empty() => {
            warnings.push("telegram.allowed_users is empty; nobody can talk to the bot".into())
        }
        Some(t) if t.admins.is_empty() => warnings.push("No admins configured".into()),
        _ => {}
    }

    warnings
}

pub async fn show(config_path: &Path) -> anyhow::Result<()> {
    let config = redacted(AppConfig::load_with_env(config_path)?);
    let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
    println!("# {}", config_path.display());
    println!("{rendered}");
    Ok(())
}

fn redacted(mut config: AppConfig) -> AppConfig {
    for p in &mut config.providers {
        if p.api_key.is_some() {
            p.api_key = Some(REDACTED.into());
        }
    }
    if let Some(t) = &mut config.telegram {
        if !t.bot_token.is_empty() {
            t.bot_token = REDACTED.into();
        }
    }
    config
}

pub async fn init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", config_path.display());
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(config_path, AppConfig::default_toml())
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!("✅ Wrote {}", config_path.display());
    println!("   Set GROQ_API_KEY and TELEGRAM_BOT_TOKEN, then run `m1nd run`.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_writes_a_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init(&path, false).await.unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider_priority, AppConfig::default().provider_priority);

        assert!(init(&path, false).await.is_err());
        init(&path, true).await.unwrap();
    }

    #[test]
    fn redaction_hides_secrets() {
        let mut config = AppConfig::default();
        config.providers[0].api_key = Some("gsk-secret".into());
        config.telegram = Some(m1nd_config::TelegramConfig {
            bot_token: "123:abc".into(),
            allowed_users: vec!["*".into()],
            admins: vec![],
            poll_timeout_secs: 30,
        });

        let rendered = toml::to_string_pretty(&redacted(config)).unwrap();
        assert!(!rendered.contains("gsk-secret"));
        assert!(!rendered.contains("123:abc"));
        assert!(rendered.contains(REDACTED));
    }

    #[test]
    fn warns_about_missing_keys_and_admins() {
        let mut config = AppConfig::default();
        config.telegram = Some(m1nd_config::TelegramConfig {
            bot_token: "123:abc".into(),
            allowed_users: vec!["*".into()],
            admins: vec![],
            poll_timeout_secs: 30,
        });

        let warnings = warnings(&config);
        assert!(warnings.iter().any(|w| w.contains("has no API key")));
        assert!(warnings.iter().any(|w| w == "No admins configured"));
    }
}
