//! Anthropic Messages API

use crate::*;
use reqwest::Client;
use serde_json::json;
use tracing::trace;

const DEFAULT_BASE: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic backend
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    api_base: String,
}

impl AnthropicProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        let api_base = settings
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE.to_string());

        Ok(Self {
            client,
            api_key: settings.api_key.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn build_request(&self, request: &TurnRequest) -> Value {
        let mut messages: Vec<Value> = Vec::new();

        for m in &request.messages {
            let (role, blocks) = match m.role {
                Role::User => ("user", vec![json!({ "type": "text", "text": &m.content })]),
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if !m.content.is_empty() {
                        blocks.push(json!({ "type": "text", "text": &m.content }));
                    }
                    for call in &m.tool_calls {
                        let input = if call.arguments.is_object() {
                            call.arguments.clone()
                        } else {
                            json!({})
                        };
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": &call.id,
                            "name": &call.name,
                            "input": input,
                        }));
                    }
                    ("assistant", blocks)
                }
                Role::Tool => (
                    "user",
                    vec![json!({
                        "type": "tool_result",
                        "tool_use_id": m.tool_call_id.as_deref().unwrap_or_default(),
                        "content": &m.content,
                        "is_error": m.is_error,
                    })],
                ),
            };

            // Results of one batch travel in a single user message
            match messages.last_mut() {
                Some(last) if last["role"] == role && role == "user" => {
                    if let Some(content) = last["content"].as_array_mut() {
                        content.extend(blocks);
                    }
                }
                _ => messages.push(json!({ "role": role, "content": blocks })),
            }
        }

        let mut body = json!({
            "model": &request.model,
            "max_tokens": request.limits.max_tokens,
            "temperature": request.limits.temperature,
            "messages": messages,
        });

        if !request.system.is_empty() {
            body["system"] = json!(&request.system);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": &t.name,
                        "description": &t.description,
                        "input_schema": &t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        body
    }

    fn parse_response(&self, json: Value) -> Result<ModelResponse> {
        let blocks = json["content"].as_array().ok_or_else(|| {
            ProviderError::MalformedResponse("response has no content blocks".to_string())
        })?;

        let mut text = String::new();
        let mut calls = Vec::new();

        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(block["text"].as_str().unwrap_or_default());
                }
                Some("tool_use") => {
                    let id = block["id"].as_str().unwrap_or_default();
                    let name = block["name"].as_str().unwrap_or_default();
                    if id.is_empty() || name.is_empty() {
                        return Err(ProviderError::MalformedResponse(
                            "tool_use block without id or name".to_string(),
                        ));
                    }
                    calls.push(ToolCall::new(id, name, decode_arguments(&block["input"])));
                }
                _ => {}
            }
        }

        let usage = Usage {
            input_tokens: json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(ModelResponse {
            turn: ModelTurn::from_parts(Some(text), calls)?,
            usage,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn send(&self, request: TurnRequest) -> Result<ModelResponse> {
        let estimated = check_budget(&request)?;
        trace!(estimated, "◆ calling {}", self.api_base);

        let url = format!("{}/v1/messages", self.api_base);
        let body = self.build_request(&request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(classify_status(status.as_u16(), error_message(&text)));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::MalformedResponse(format!("invalid JSON: {e}")))?;

        let parsed = self.parse_response(json)?;
        debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "◆ model turn received"
        );
        Ok(parsed)
    }

    fn id(&self) -> String {
        "anthropic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(&ProviderSettings {
            provider: "anthropic".into(),
            api_key: "sk-ant".into(),
            api_base: None,
            request_timeout: Duration::from_secs(5),
            max_retries: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_build_request_shape() {
        let req = TurnRequest {
            model: "claude-sonnet-4-20250514".into(),
            system: "rules".into(),
            messages: vec![
                Message::user("fix it"),
                Message::assistant(
                    "checking",
                    vec![
                        ToolCall::new("t1", "read_file", json!({"path": "a"})),
                        ToolCall::new("t2", "read_file", json!({"path": "b"})),
                    ],
                ),
                Message::tool_result("t1", "contents", false),
                Message::tool_result("t2", "missing", true),
            ],
            tools: vec![ToolSpec {
                name: "read_file".into(),
                description: "Read".into(),
                parameters: json!({"type": "object"}),
            }],
            limits: ModelLimits::default(),
        };

        let body = provider().build_request(&req);
        assert_eq!(body["system"], "rules");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "text");
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[1]["content"][2]["id"], "t2");

        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "t1");
        assert_eq!(results[1]["is_error"], true);
    }

    #[test]
    fn test_parse_tool_use() {
        let parsed = provider()
            .parse_response(json!({
                "content": [
                    {"type": "text", "text": "Let me look."},
                    {"type": "tool_use", "id": "toolu_1", "name": "list_dir", "input": {"path": "."}}
                ],
                "usage": {"input_tokens": 40, "output_tokens": 9}
            }))
            .unwrap();

        match parsed.turn {
            ModelTurn::ToolCalls { text, calls } => {
                assert_eq!(text.as_deref(), Some("Let me look."));
                assert_eq!(calls[0].arguments, json!({"path": "."}));
            }
            other => panic!("expected tool calls, got {:?}", other),
        }
        assert_eq!(parsed.usage.input_tokens, 40);
    }

    #[test]
    fn test_parse_without_content_is_malformed() {
        let result = provider().parse_response(json!({"type": "message"}));
        assert!(matches!(result, Err(ProviderError::MalformedResponse(_))));
    }
}
