use dotenv::dotenv;
use income_statement_reconciler::llm::GroqClient;
use income_statement_reconciler::{
    AuditEvent, IncomeStatementPipeline, PipelineConfig, TextFileProducer,
};
use std::error::Error;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .ok_or("usage: extract_statement <statement.txt> [output.csv] [config.json]")?;
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_extension("csv"));
    let config = match args.next() {
        Some(path) => PipelineConfig::from_path(path)?,
        None => PipelineConfig::default(),
    };

    println!("📄 Reconciling {}", input.display());

    let client = GroqClient::with_timeout(
        std::env::var("GROQ_API_KEY")?,
        config.per_call_timeout(),
    )?;
    let pipeline = IncomeStatementPipeline::new(config, client)?;

    let outcome = pipeline
        .run_from_producer(&TextFileProducer::new(&input))
        .await?;

    let failed = outcome
        .audit
        .iter()
        .filter(|e| matches!(e, AuditEvent::ChunkFailed { .. }))
        .count();
    let rejected = outcome
        .audit
        .iter()
        .filter(|e| matches!(e, AuditEvent::RowRejected { .. }))
        .count();

    println!("\n{}", outcome.dataset.to_markdown());
    println!(
        "✅ {} rows across {} periods ({} chunks failed, {} rows rejected)",
        outcome.dataset.rows().len(),
        outcome.dataset.periods().len(),
        failed,
        rejected
    );

    outcome.dataset.write_csv(&output)?;
    println!("💾 Saved {}", output.display());

    Ok(())
}
