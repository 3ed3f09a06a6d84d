use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::message::{Message, MessageContent};
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::Usage;

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
}

fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

fn check_unique_names(tools: &[Tool]) -> Result<()> {
    let mut tool_names = HashSet::new();
    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
    }
    Ok(())
}

fn as_i32(value: Option<&Value>) -> Option<i32> {
    value.and_then(|v| v.as_i64()).map(|v| v as i32)
}

/// Convert internal Message format to OpenAI's API message specification.
///
/// Tool results travel as separate `tool` role messages, one per call id.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let role = match message.role {
            Role::User => "user",
            Role::Model => "assistant",
        };
        let mut converted = Map::new();
        converted.insert("role".to_string(), json!(role));
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(t) => {
                    if !t.text.is_empty() {
                        text.push(t.text.as_str());
                    }
                }
                MessageContent::ToolRequest(request) => {
                    tool_calls.push(json!({
                        "id": request.id,
                        "type": "function",
                        "function": {
                            "name": sanitize_function_name(&request.tool_call.name),
                            "arguments": request.tool_call.arguments.to_string(),
                        }
                    }));
                }
                MessageContent::ToolResponse(response) => {
                    output.push(json!({
                        "role": "tool",
                        "content": response.result,
                        "tool_call_id": response.id
                    }));
                }
            }
        }

        if !text.is_empty() {
            converted.insert("content".to_string(), json!(text.join("\n")));
        }
        if !tool_calls.is_empty() {
            converted.insert("tool_calls".to_string(), json!(tool_calls));
        }
        if converted.contains_key("content") || converted.contains_key("tool_calls") {
            output.insert(0, Value::Object(converted));
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    check_unique_names(tools)?;
    Ok(tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect())
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = &response["choices"][0]["message"];
    if original.is_null() {
        return Err(anyhow!("No message in response: {}", response));
    }
    let mut message = Message::model();

    if let Some(text) = original.get("content").and_then(|t| t.as_str()) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();
            let params: Value = if arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(arguments).with_context(|| {
                    format!("Could not interpret tool use parameters for id {}", id)
                })?
            };
            message = message.with_tool_request(id, ToolCall::new(name, params));
        }
    }

    Ok(message)
}

pub fn openai_usage(data: &Value) -> Usage {
    let usage = &data["usage"];
    let input_tokens = as_i32(usage.get("prompt_tokens"));
    let output_tokens = as_i32(usage.get("completion_tokens"));
    let total_tokens = as_i32(usage.get("total_tokens")).or(match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });
    Usage::new(input_tokens, output_tokens, total_tokens)
}

/// Convert internal Message format to gemini `contents`.
///
/// Gemini matches a function response to its call by name, so the result is
/// wrapped under the tool name with the rendered `Success:`/`Error:` string.
pub fn messages_to_gemini_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .filter_map(|message| {
            let parts: Vec<Value> = message
                .content
                .iter()
                .filter_map(|content| match content {
                    MessageContent::Text(t) if t.text.is_empty() => None,
                    MessageContent::Text(t) => Some(json!({"text": t.text})),
                    MessageContent::ToolRequest(request) => Some(json!({
                        "functionCall": {
                            "name": request.tool_call.name,
                            "args": request.tool_call.arguments,
                        }
                    })),
                    MessageContent::ToolResponse(response) => Some(json!({
                        "functionResponse": {
                            "name": response.name,
                            "response": {"result": response.result},
                        }
                    })),
                })
                .collect();
            if parts.is_empty() {
                return None;
            }
            let role = match message.role {
                Role::User => "user",
                Role::Model => "model",
            };
            Some(json!({"role": role, "parts": parts}))
        })
        .collect()
}

/// Convert internal Tool format to a gemini `tools` entry
pub fn tools_to_gemini_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    check_unique_names(tools)?;
    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            })
        })
        .collect();
    Ok(vec![json!({"functionDeclarations": declarations})])
}

/// Convert a gemini `generateContent` response to internal Message format.
///
/// Gemini does not always give calls an id, so one is generated when missing.
pub fn gemini_response_to_message(response: &Value) -> Result<Message> {
    let candidate = response["candidates"]
        .get(0)
        .ok_or_else(|| anyhow!("No candidates in response: {}", response))?;
    let parts = candidate["content"]["parts"]
        .as_array()
        .ok_or_else(|| match candidate.get("finishReason") {
            Some(reason) => anyhow!("Response has no content, finish reason: {}", reason),
            None => anyhow!("Response has no content: {}", candidate),
        })?;

    let mut message = Message::model();
    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            message = message.with_text(text);
        } else if let Some(call) = part.get("functionCall") {
            let name = call["name"]
                .as_str()
                .ok_or_else(|| anyhow!("Function call without a name: {}", call))?;
            let args = match call.get("args") {
                Some(args) if !args.is_null() => args.clone(),
                _ => json!({}),
            };
            let id = call
                .get("id")
                .and_then(|id| id.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            message = message.with_tool_request(id, ToolCall::new(name, args));
        }
    }
    Ok(message)
}

pub fn gemini_usage(data: &Value) -> Usage {
    let usage = &data["usageMetadata"];
    Usage::new(
        as_i32(usage.get("promptTokenCount")),
        as_i32(usage.get("candidatesTokenCount")),
        as_i32(usage.get("totalTokenCount")),
    )
}
