use crate::{output_key, output_key_param, with_output_key};
use async_trait::async_trait;
use serde_json::{json, Map};
use std::collections::HashMap;
use wfcore::{
    Node, NodeContext, NodeError, NodeInterface, PortDefinition, TypeHint, Value, ValueStore,
    DEFAULT_ACTION,
};
use wfruntime::{BuildContext, NodeFactory, NodeMetadata};

const HTTP_OUTPUT: &str = "response";

/// HTTP request node
pub struct HttpRequestNode {
    client: reqwest::Client,
}

impl HttpRequestNode {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for HttpRequestNode {
    fn node_type(&self) -> &str {
        "http.request"
    }

    async fn exec(&self, ctx: &NodeContext, _prepared: &Value) -> Result<Value, NodeError> {
        let url = ctx
            .require_param("url")?
            .as_str()
            .ok_or_else(|| NodeError::InvalidInputType {
                field: "url".to_string(),
                expected: "string".to_string(),
                actual: "other".to_string(),
            })?;
        let method = ctx.param_str("method").unwrap_or("GET").to_uppercase();

        ctx.events.info(format!("{} {}", method, url));

        let request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            _ => return Err(NodeError::Configuration(format!("Unsupported method: {}", method))),
        };

        let request = match ctx.params.get("body") {
            Some(Value::String(text)) => request.body(text.clone()),
            Some(Value::Null) | None => request,
            Some(json) => request.json(json),
        };

        // Add headers if provided
        let request = if let Some(Value::Object(headers)) = ctx.params.get("headers") {
            let mut req = request;
            for (key, value) in headers {
                if let Some(val_str) = value.as_str() {
                    req = req.header(key, val_str);
                }
            }
            req
        } else {
            request
        };

        let response = request
            .send()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let headers_map: Map<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        ctx.events.info(format!("Response status: {}", status));

        let fail_on_status = ctx
            .params
            .get("fail_on_status")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if fail_on_status && status >= 400 {
            return Err(NodeError::ExecutionFailed(format!(
                "{} {} returned status {}",
                method, url, status
            )));
        }

        // JSON bodies are kept structured so later params can reference into them.
        let body = serde_json::from_str::<Value>(&body_text).unwrap_or(Value::String(body_text));

        Ok(json!({
            "status": status,
            "body": body,
            "headers": headers_map,
        }))
    }

    async fn post(
        &self,
        ctx: &NodeContext,
        store: &mut ValueStore,
        _prepared: &Value,
        result: Value,
    ) -> Result<String, NodeError> {
        store.insert(output_key(&ctx.params, HTTP_OUTPUT), result);
        Ok(DEFAULT_ACTION.to_string())
    }
}

pub struct HttpRequestNodeFactory;

impl NodeFactory for HttpRequestNodeFactory {
    fn create(
        &self,
        _params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(HttpRequestNode::new()))
    }

    fn node_type(&self) -> &str {
        "http.request"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
            interface: NodeInterface::new()
                .with_output(
                    PortDefinition::new(HTTP_OUTPUT, "status, body and headers").typed(TypeHint::Object),
                )
                .with_param(PortDefinition::new("url", "Request URL").typed(TypeHint::String))
                .with_param(
                    PortDefinition::new("method", "GET, POST, PUT, PATCH or DELETE")
                        .optional()
                        .typed(TypeHint::String),
                )
                .with_param(PortDefinition::new("body", "Text or JSON body").optional())
                .with_param(
                    PortDefinition::new("headers", "Header name to value")
                        .optional()
                        .typed(TypeHint::Object),
                )
                .with_param(
                    PortDefinition::new("fail_on_status", "Fail on 4xx/5xx responses")
                        .optional()
                        .typed(TypeHint::Boolean),
                )
                .with_param(output_key_param(HTTP_OUTPUT)),
        }
    }

    fn interface_for(&self, params: &HashMap<String, Value>) -> NodeInterface {
        with_output_key(self.metadata().interface, params, HTTP_OUTPUT)
    }

    fn default_retry_policy(&self) -> wfcore::RetryPolicy {
        wfcore::RetryPolicy::new(3, 500).with_backoff(2.0)
    }
}
