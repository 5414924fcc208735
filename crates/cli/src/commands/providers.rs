//! `m1nd providers`: Show configured providers and the fallback order.

use std::path::Path;

use m1nd_config::{AppConfig, ProviderKind};

pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = AppConfig::load_with_env(config_path)?;

    println!("🤖 Configured Providers");
    println!("=======================");
    println!();

    if config.providers.is_empty() {
        println!("  (none); add a [[providers]] section to {}", config_path.display());
        return Ok(());
    }

    println!(
        "  {:<14} {:<17} {:<28} {:<8} {:<6} {}",
        "ID", "KIND", "MODEL", "KEY", "TOOLS", "TIMEOUT"
    );
    for p in &config.providers {
        let kind = match p.kind {
            ProviderKind::ChatCompletions => "chat_completions",
            ProviderKind::Responses => "responses",
        };
        println!(
            "  {:<14} {:<17} {:<28} {:<8} {:<6} {}s",
            p.id,
            kind,
            p.model,
            if p.api_key.is_some() { "set" } else { "missing" },
            if p.supports_tools { "yes" } else { "no" },
            p.timeout_secs
        );
    }

    println!();
    println!("  Fallback order: {}", config.provider_priority.join(" → "));
    println!(
        "  Retries:        {} per provider, base delay {}ms",
        config.retry.max_retries, config.retry.base_delay_ms
    );
    println!();
    println!("  Environment variables:");
    println!("    M1ND_API_KEY, GROQ_API_KEY, OPENAI_API_KEY, OPENROUTER_API_KEY");
    println!("    M1ND_PROVIDERS (comma-separated fallback order)");

    Ok(())
}
