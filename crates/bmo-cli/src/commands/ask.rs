//! Ask command - one prompt in, one JSON reply out.

use bmo_core::{ChatRequest, SessionId};

use super::ServiceArgs;

pub(crate) async fn run(
    service_args: &ServiceArgs,
    prompt: &str,
    max_tokens: u32,
    temperature: f32,
) -> miette::Result<()> {
    let request = ChatRequest {
        max_tokens,
        temperature,
        ..ChatRequest::new(prompt)
    };
    // Reject bad input before paying for a model load.
    request
        .validate()
        .map_err(|e| miette::miette!("{}", e))?;

    let service = service_args.start().await?;
    let response = service
        .handle_chat(&SessionId::default(), &request)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    let json = serde_json::to_string_pretty(&response)
        .map_err(|e| miette::miette!("Failed to encode reply: {}", e))?;
    println!("{}", json);

    Ok(())
}
