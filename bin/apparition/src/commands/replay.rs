use anyhow::Context;
use apparition_core::{Config, Paths};
use apparition_runtime::{Evaluator, ReplayChannel, Transcript};
use std::path::Path;
use tracing::info;

pub async fn run(file: &Path, compact: bool) -> anyhow::Result<()> {
    let config = Config::load_or_default(&Paths::new())?;
    let transcript = Transcript::load(file)
        .with_context(|| format!("Failed to read transcript {}", file.display()))?;

    info!(
        file = %file.display(),
        exchanges = transcript.exchanges.len(),
        "Replaying transcript"
    );

    let channel = ReplayChannel::from_exchanges(transcript.exchanges);
    let evaluator = Evaluator::new(channel, transcript.session_id, config.evaluate.clone());

    let resolved = match (&transcript.root, &transcript.expression) {
        (Some(root), _) => evaluator.resolve(root).await?,
        (None, Some(expression)) => evaluator.evaluate(expression).await?,
        (None, None) => anyhow::bail!("Transcript has neither a root descriptor nor an expression"),
    };

    let json = resolved.to_json();
    if config.output.pretty && !compact {
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", json);
    }
    Ok(())
}
