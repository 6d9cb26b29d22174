//! Chat command - interactive conversation on stdin/stdout.

use std::io::Write;

use bmo_core::{ChatRequest, SessionId};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::ServiceArgs;

const HELP: &str = "Commands: /reset, /status, /history, /help, /quit";

pub(crate) async fn run(
    service_args: &ServiceArgs,
    session: &str,
    max_tokens: u32,
    temperature: f32,
) -> miette::Result<()> {
    println!("Waking BMO up, loading the model...");
    let service = service_args.start().await?;
    let session = SessionId::new(session);

    if let Some(model) = service.host().loaded_model() {
        println!(
            "BMO is ready! ({}, {:.1} tokens/s)",
            model.path.display(),
            model.warmup_tokens_per_second
        );
    }
    println!("{}", HELP);
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("You: ");
        std::io::stdout()
            .flush()
            .map_err(|e| miette::miette!("Failed to write prompt: {}", e))?;

        let line = match lines
            .next_line()
            .await
            .map_err(|e| miette::miette!("Failed to read input: {}", e))?
        {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/reset" => {
                let reply = service
                    .reset(&session)
                    .map_err(|e| miette::miette!("{}", e))?;
                println!("BMO ({}): {}", reply.mood, reply.message);
            }
            "/status" => {
                let status = service.status(&session);
                let json = serde_json::to_string_pretty(&status)
                    .map_err(|e| miette::miette!("Failed to encode status: {}", e))?;
                println!("{}", json);
            }
            "/history" => {
                let history = service.store().history(&session);
                if history.is_empty() {
                    println!("(no exchanges yet)");
                }
                for exchange in history {
                    println!("[{}]", exchange.timestamp.format("%H:%M:%S"));
                    println!("  You: {}", exchange.user_text);
                    println!("  BMO: {}", exchange.response_text);
                }
            }
            prompt => {
                let request = ChatRequest {
                    max_tokens,
                    temperature,
                    ..ChatRequest::new(prompt)
                };
                match service.handle_chat(&session, &request).await {
                    Ok(response) => println!("BMO ({}): {}", response.mood, response.response),
                    Err(e) if e.is_fatal() => return Err(miette::miette!("{}", e)),
                    Err(e) => println!("{}", e),
                }
            }
        }
        println!();
    }

    println!("Bye! BMO will miss you!");
    Ok(())
}
