//! Contains the logic for the agent's "ReAct" (Reason and Act) cycle.

use anyhow::{Context, Result};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionToolArgs, FunctionObjectArgs,
};
use futures_util::StreamExt;
use rmcp::{
    model::{CallToolRequestParam, JsonObject, RawContent},
    service::{Peer, RoleClient, ServiceError},
};
use salesvoice_core::{
    agent::CallState,
    chat::{ChatMessage, to_request_messages},
    llm_client::{LLMAction, LLMClient, LLMStreamEvent, ToolCall},
};
use tracing::{info, warn};

/// Appends the persisted call record to the policy prompt so the model knows
/// what has already been saved.
fn system_prompt_with_state(system_prompt: &str, call_state: &CallState) -> Result<String> {
    let state_json = serde_json::to_string_pretty(call_state)?;
    Ok(format!(
        "{}\n\n# Current Context for This Turn\n\n**Saved Call Record:**\n```json\n{}\n```",
        system_prompt, state_json
    ))
}

/// Produces the agent's opening line.
pub async fn greet(llm: &dyn LLMClient, system_prompt: &str, greeting: &str) -> Result<String> {
    let messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()?
            .into(),
        ChatCompletionRequestSystemMessageArgs::default()
            .content(greeting)
            .build()?
            .into(),
    ];
    llm.complete(messages).await
}

/// Runs a single user turn through the ReAct cycle and returns the agent's reply.
///
/// This involves:
/// 1.  Constructing the prompt with the saved call record and the history.
/// 2.  Calling the LLM to decide on an action (speak or use a tool).
/// 3.  If tools are chosen, executing them over MCP and feeding the results back.
/// 4.  Collecting the final streamed text.
///
/// `history` must already end with the caller's message.
pub async fn run_react_cycle(
    llm: &dyn LLMClient,
    mcp: &Peer<RoleClient>,
    system_prompt: &str,
    call_state: &CallState,
    history: &[ChatMessage],
) -> Result<String> {
    let prompt = system_prompt_with_state(system_prompt, call_state)?;
    let messages = to_request_messages(Some(&prompt), history)?;

    // Get the list of available tools for the agent.
    let tools = mcp
        .list_all_tools()
        .await?
        .into_iter()
        .map(|t| {
            Ok(ChatCompletionToolArgs::default()
                .function(
                    FunctionObjectArgs::default()
                        .name(t.name)
                        .description(t.description.unwrap_or_default())
                        .parameters(serde_json::to_value(&*t.input_schema)?)
                        .build()?,
                )
                .build()?)
        })
        .collect::<Result<Vec<_>>>()?;

    let action = llm.decide_action(messages.clone(), tools).await?;

    let tool_calls = match action {
        LLMAction::TextResponse(text) => return Ok(text),
        LLMAction::ToolCall(tool_calls) => tool_calls,
    };

    let mut tool_results = Vec::with_capacity(tool_calls.len());
    for call in &tool_calls {
        info!(tool = %call.function.name, "Model requested tool call");
        tool_results.push(call_tool(mcp, call).await?);
    }

    // Append the tool calls and their results to the history.
    let mut history_with_tools = messages;
    history_with_tools.push(
        ChatCompletionRequestAssistantMessageArgs::default()
            .tool_calls(tool_calls.clone())
            .build()?
            .into(),
    );
    for (call, result) in tool_calls.iter().zip(tool_results) {
        history_with_tools.push(
            ChatCompletionRequestToolMessageArgs::default()
                .tool_call_id(call.id.clone())
                .content(result)
                .build()?
                .into(),
        );
    }

    let mut final_stream = llm.stream_reply(history_with_tools).await?;
    let mut full_response = String::new();
    while let Some(event_result) = final_stream.next().await {
        match event_result {
            Ok(LLMStreamEvent::TextChunk(chunk)) => full_response.push_str(&chunk),
            Err(e) => warn!(error = %e, "Dropped a chunk of the streamed reply"),
        }
    }
    Ok(full_response)
}

/// Runs one requested tool and returns the text the model should see.
///
/// Arguments the tool cannot accept come back as an `error:` result, the same
/// shape as a failed tool call, so the model can ask the caller again.
async fn call_tool(mcp: &Peer<RoleClient>, call: &ToolCall) -> Result<String> {
    let name = &call.function.name;
    let arguments: JsonObject = match serde_json::from_str(&call.function.arguments) {
        Ok(arguments) => arguments,
        Err(e) => {
            warn!(tool = %name, "Model sent malformed tool arguments");
            return Ok(format!("error: malformed arguments for '{}': {}", name, e));
        }
    };
    let result = match mcp
        .call_tool(CallToolRequestParam {
            name: name.clone().into(),
            arguments: Some(arguments),
        })
        .await
    {
        Ok(result) => result,
        Err(ServiceError::McpError(e)) => {
            warn!(tool = %name, error = %e.message, "Tool rejected its arguments");
            return Ok(format!("error: {}", e.message));
        }
        Err(e) => return Err(e.into()),
    };
    if result.is_error == Some(true) {
        warn!(tool = %name, "Tool call failed; passing error to the model");
    }

    let annotated_content = result
        .content
        .context("Tool call returned no content")?
        .pop()
        .context("Content list was empty")?;
    Ok(match annotated_content.raw {
        RawContent::Text(text_content) => text_content.text,
        _ => "{\"error\": \"Unexpected content type from tool\"}".to_string(),
    })
}
