//! `m1nd ask`: Answer a single question and exit.

use std::path::Path;

use m1nd_core::error::OrchestrationError;

use crate::runtime::Runtime;

pub async fn run(config_path: &Path, user: &str, question: &str) -> anyhow::Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question is empty");
    }

    let runtime = Runtime::load(config_path)?;
    let priority = runtime.priority();

    match runtime.orchestrator.answer(user, question, &priority).await {
        Ok(answer) => {
            println!("{answer}");
            Ok(())
        }
        Err(OrchestrationError::AllProvidersFailed { last_errors }) => {
            eprintln!("❌ No provider could answer");
            for failure in &last_errors {
                eprintln!("   {}: {} ({})", failure.provider_id, failure.message, failure.kind);
            }
            anyhow::bail!("all {} providers failed", last_errors.len())
        }
    }
}
