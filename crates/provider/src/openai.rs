//! OpenAI-compatible chat completions
//!
//! Most hosted backends speak this dialect; they differ only in base URL.

use crate::*;
use reqwest::Client;
use serde_json::json;
use tracing::trace;

/// Base URL for a known OpenAI-compatible provider id
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    let url = match provider {
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "deepseek" => "https://api.deepseek.com",
        "glm" => "https://open.bigmodel.cn/api/paas/v4",
        "minimax" => "https://api.minimax.chat/v1",
        "moonshot" => "https://api.moonshot.cn/v1",
        "dashscope" => "https://dashscope.aliyuncs.com/compatible-mode/v1",
        "doubao" => "https://ark.cn-beijing.volces.com/api/v3",
        "spark" => "https://spark-api-open.xf-yun.com/v1",
        "baichuan" => "https://api.baichuan-ai.com/v1",
        "yi" => "https://api.lingyiwanwu.com/v1",
        "stepfun" => "https://api.stepfun.com/v1",
        _ => return None,
    };
    Some(url)
}

const FALLBACK_BASE: &str = "https://api.openai.com/v1";

/// OpenAI-compatible backend
pub struct OpenAiCompatProvider {
    client: Client,
    provider: String,
    api_key: String,
    api_base: String,
}

impl OpenAiCompatProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let api_base = settings
            .api_base
            .clone()
            .or_else(|| default_base_url(&settings.provider).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_BASE.to_string());

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            provider: settings.provider.clone(),
            api_key: settings.api_key.clone(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(&self, request: &TurnRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(json!({ "role": "system", "content": &request.system }));
        }

        for m in &request.messages {
            let obj = match m.role {
                Role::User => json!({ "role": "user", "content": &m.content }),
                Role::Assistant => {
                    let mut obj = json!({ "role": "assistant" });
                    obj["content"] = if m.content.is_empty() {
                        Value::Null
                    } else {
                        json!(&m.content)
                    };
                    if !m.tool_calls.is_empty() {
                        let calls: Vec<Value> = m
                            .tool_calls
                            .iter()
                            .map(|c| {
                                json!({
                                    "id": &c.id,
                                    "type": "function",
                                    "function": {
                                        "name": &c.name,
                                        "arguments": c.arguments.to_string(),
                                    }
                                })
                            })
                            .collect();
                        obj["tool_calls"] = json!(calls);
                    }
                    obj
                }
                Role::Tool => {
                    let content = if m.is_error {
                        format!("ERROR: {}", m.content)
                    } else {
                        m.content.clone()
                    };
                    json!({
                        "role": "tool",
                        "tool_call_id": m.tool_call_id.as_deref().unwrap_or_default(),
                        "content": content,
                    })
                }
            };
            messages.push(obj);
        }

        let mut body = json!({
            "model": &request.model,
            "messages": messages,
            "max_tokens": request.limits.max_tokens,
            "temperature": request.limits.temperature,
        });

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": &t.name,
                            "description": &t.description,
                            "parameters": &t.parameters
                        }
                    })
                })
                .collect();

            body["tools"] = json!(tools);
            body["tool_choice"] = json!("auto");
        }

        body
    }

    fn parse_response(&self, json: Value) -> Result<ModelResponse> {
        let choice = json["choices"].get(0).ok_or_else(|| {
            ProviderError::MalformedResponse("response has no choices".to_string())
        })?;
        let message = &choice["message"];
        if !message.is_object() {
            return Err(ProviderError::MalformedResponse(
                "choice has no message".to_string(),
            ));
        }

        let text = non_empty(message["content"].as_str());

        let mut calls = Vec::new();
        if let Some(raw_calls) = message["tool_calls"].as_array() {
            for call in raw_calls {
                let function = &call["function"];
                let id = call["id"].as_str().unwrap_or_default();
                let name = function["name"].as_str().unwrap_or_default();
                if id.is_empty() || name.is_empty() {
                    return Err(ProviderError::MalformedResponse(
                        "tool call without id or name".to_string(),
                    ));
                }
                calls.push(ToolCall::new(id, name, decode_arguments(&function["arguments"])));
            }
        }

        let usage = Usage {
            input_tokens: json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(ModelResponse {
            turn: ModelTurn::from_parts(text, calls)?,
            usage,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    async fn send(&self, request: TurnRequest) -> Result<ModelResponse> {
        let estimated = check_budget(&request)?;
        trace!(provider = %self.provider, estimated, "◆ calling {}", self.api_base);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&request);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
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
            provider = %self.provider,
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "◆ model turn received"
        );
        Ok(parsed)
    }

    fn id(&self) -> String {
        self.provider.clone()
    }
}
