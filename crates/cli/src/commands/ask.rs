//! `querysmith ask`: Answer one question against a dataset.

use querysmith_engine::AnswerRequest;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::{CliResult, chat_service, load_config, open_store};

pub async fn run(
    explicit: Option<&Path>,
    dataset: &str,
    session: Option<String>,
    question: &str,
    json: bool,
) -> CliResult {
    let config = load_config(explicit)?;
    let store = open_store(&config).await?;
    let service = chat_service(&config, store);

    // Ctrl-C abandons the in-flight provider call
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let request = AnswerRequest {
        question: question.to_string(),
        session_id: session,
        dataset: dataset.to_string(),
    };

    let response = match service.answer_question_with_cancel(request, &cancel).await {
        Ok(response) => response,
        Err(e) => {
            error!(dataset, error = %e, "Question failed");
            eprintln!("❌ {}", e.user_message());
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let envelope = response.envelope()?;
    println!("{}\n", envelope.text);
    println!("  Query:          {}", envelope.query);
    println!("  Session:        {}", response.session_id);
    println!("  Correlation id: {}", response.correlation_id);
    println!(
        "\n  Continue with --session {}, or rate it: querysmith feedback {} [--wrong]",
        response.session_id, response.correlation_id
    );

    Ok(())
}
