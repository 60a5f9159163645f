use anyhow::{Result, bail};
use dealmind_ai::{RagCompletionAdapter, SessionKey};
use serde_json::json;

use super::parse_domain;
use crate::cli::AskArgs;
use crate::output::{OutputFormat, json::print_json};
use crate::setup::Runtime;

pub async fn run(runtime: &Runtime, args: AskArgs, format: OutputFormat) -> Result<()> {
    let Some(llm) = runtime.llm.clone() else {
        bail!("No LLM configured; set providers.openai_api_key or OPENAI_API_KEY");
    };
    let domain = parse_domain(&args.domain)?;

    let adapter = RagCompletionAdapter::new(runtime.manager.clone(), llm);
    let key = SessionKey::new(format!("ask-{}", chrono::Utc::now().timestamp_millis()), args.user);
    let answer = adapter.complete(&key, domain, &args.question).await?;
    runtime.manager.end_session(&key, false).await?;

    if format.is_json() {
        return print_json(&json!({ "domain": domain, "answer": answer }));
    }

    println!("{answer}");
    Ok(())
}
