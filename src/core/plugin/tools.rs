//! Custom tools plugin.
//!
//! Registers named async tool functions with JSON schemas and executes them
//! when a `tool_call` message arrives. Ships three built-in demo tools
//! (weather, calculator, web_search); real deployments register their own via
//! `register_tool`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::{info, warn};

use super::{Plugin, PluginError, PluginMessage, PluginResponse, PluginResult};

/// Async tool function: parameters in, JSON result out.
pub type ToolHandler = Arc<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = PluginResult<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// A `tool_call` message body.
#[derive(Debug, Deserialize)]
struct ToolCall {
    tool: String,
    #[serde(default)]
    parameters: serde_json::Value,
}

/// Tools plugin for custom function execution.
pub struct ToolsPlugin {
    config: serde_json::Value,
    enabled: bool,
    max_execution_secs: u64,
    tools: RwLock<HashMap<String, ToolHandler>>,
    schemas: RwLock<HashMap<String, serde_json::Value>>,
}

impl Default for ToolsPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolsPlugin {
    pub fn new() -> Self {
        Self {
            config: serde_json::Value::Null,
            enabled: true,
            max_execution_secs: 30,
            tools: RwLock::new(HashMap::new()),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool with an optional schema.
    pub fn register_tool(
        &self,
        name: impl Into<String>,
        handler: ToolHandler,
        schema: Option<serde_json::Value>,
    ) {
        let name = name.into();
        let schema = schema.unwrap_or_else(|| {
            serde_json::json!({
                "description": format!("Tool: {name}"),
                "parameters": {},
            })
        });

        self.tools
            .write()
            .expect("tool registry poisoned")
            .insert(name.clone(), handler);
        self.schemas
            .write()
            .expect("tool registry poisoned")
            .insert(name.clone(), schema);
        info!("Tool registered: {name}");
    }

    /// Remove a registered tool.
    pub fn unregister_tool(&self, name: &str) {
        self.tools
            .write()
            .expect("tool registry poisoned")
            .remove(name);
        self.schemas
            .write()
            .expect("tool registry poisoned")
            .remove(name);
        info!("Tool unregistered: {name}");
    }

    /// Names of registered tools.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Schema for a registered tool.
    pub fn tool_schema(&self, name: &str) -> Option<serde_json::Value> {
        self.schemas
            .read()
            .expect("tool registry poisoned")
            .get(name)
            .cloned()
    }

    /// Execute a registered tool with a timeout.
    pub async fn execute(
        &self,
        name: &str,
        parameters: serde_json::Value,
    ) -> PluginResult<serde_json::Value> {
        let handler = self
            .tools
            .read()
            .expect("tool registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::ToolNotFound(name.to_string()))?;

        let deadline = Duration::from_secs(self.max_execution_secs);
        match timeout(deadline, handler(parameters)).await {
            Ok(result) => result,
            Err(_) => Err(PluginError::Timeout(self.max_execution_secs)),
        }
    }

    fn load_builtin_tool(&self, name: &str) {
        match name {
            "weather" => self.register_tool(
                "weather",
                Arc::new(|params| {
                    Box::pin(async move {
                        let location = params
                            .get("location")
                            .and_then(|v| v.as_str())
                            .unwrap_or("unknown");
                        Ok(serde_json::json!({
                            "location": location,
                            "condition": "sunny",
                            "temperature_c": 22,
                        }))
                    })
                }),
                Some(serde_json::json!({
                    "description": "Get weather information",
                    "parameters": {
                        "location": {"type": "string", "required": true}
                    }
                })),
            ),
            "calculator" => self.register_tool(
                "calculator",
                Arc::new(|params| {
                    Box::pin(async move {
                        let expression = params
                            .get("expression")
                            .and_then(|v| v.as_str())
                            .ok_or_else(|| {
                                PluginError::Processing(
                                    "calculator requires an 'expression' parameter".to_string(),
                                )
                            })?;
                        let result = evaluate_expression(expression)?;
                        Ok(serde_json::json!({
                            "expression": expression,
                            "result": result,
                        }))
                    })
                }),
                Some(serde_json::json!({
                    "description": "Perform calculations",
                    "parameters": {
                        "expression": {"type": "string", "required": true}
                    }
                })),
            ),
            "web_search" => self.register_tool(
                "web_search",
                Arc::new(|params| {
                    Box::pin(async move {
                        let query = params
                            .get("query")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default();
                        let max_results = params
                            .get("max_results")
                            .and_then(|v| v.as_u64())
                            .unwrap_or(5);
                        Ok(serde_json::json!({
                            "query": query,
                            "results": [],
                            "max_results": max_results,
                        }))
                    })
                }),
                Some(serde_json::json!({
                    "description": "Search the web",
                    "parameters": {
                        "query": {"type": "string", "required": true},
                        "max_results": {"type": "integer", "default": 5}
                    }
                })),
            ),
            other => warn!("Unknown built-in tool: {other}"),
        }
    }
}

#[async_trait]
impl Plugin for ToolsPlugin {
    fn name(&self) -> &str {
        "tools_plugin"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn config(&self) -> &serde_json::Value {
        &self.config
    }

    fn initialize(&mut self, config: &serde_json::Value) -> PluginResult<()> {
        self.config = config.clone();

        if let Some(secs) = config.get("max_execution_time").and_then(|v| v.as_u64()) {
            self.max_execution_secs = secs;
        }

        if let Some(enabled_tools) = config.get("enabled_tools").and_then(|v| v.as_array()) {
            for tool in enabled_tools {
                if let Some(name) = tool.as_str() {
                    self.load_builtin_tool(name);
                }
            }
        }

        info!(
            "Tools plugin initialized with {} tools",
            self.tools.read().expect("tool registry poisoned").len()
        );
        Ok(())
    }

    async fn process(&self, message: &PluginMessage) -> PluginResult<Option<PluginResponse>> {
        if !self.enabled || message.kind != "tool_call" {
            return Ok(None);
        }

        let call: ToolCall = serde_json::from_str(&message.content).map_err(|e| {
            PluginError::Processing(format!("Invalid tool call payload: {e}"))
        })?;

        let result = self.execute(&call.tool, call.parameters).await?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("plugin".to_string(), serde_json::json!(self.name()));
        metadata.insert("tool".to_string(), serde_json::json!(call.tool));

        Ok(Some(PluginResponse {
            content: serde_json::to_string(&result)?,
            metadata,
            is_final: true,
        }))
    }

    async fn cleanup(&mut self) -> PluginResult<()> {
        self.tools.write().expect("tool registry poisoned").clear();
        self.schemas
            .write()
            .expect("tool registry poisoned")
            .clear();
        info!("Tools plugin cleaned up");
        Ok(())
    }
}

/// Evaluate a simple arithmetic expression with `+ - * /` and standard
/// precedence. Enough for the built-in calculator demo tool.
fn evaluate_expression(expression: &str) -> PluginResult<f64> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(PluginError::Processing("Empty expression".to_string()));
    }

    // Fold multiplicative runs first, then sum the additive terms
    let mut terms: Vec<f64> = Vec::new();
    let mut pending_add_sign = 1.0;
    let mut current = match &tokens[0] {
        Token::Number(n) => *n,
        Token::Operator(_) => {
            return Err(PluginError::Processing(
                "Expression must start with a number".to_string(),
            ));
        }
    };

    let mut i = 1;
    while i < tokens.len() {
        let Token::Operator(op) = tokens[i] else {
            return Err(PluginError::Processing(
                "Expected an operator".to_string(),
            ));
        };
        let Some(Token::Number(rhs)) = tokens.get(i + 1) else {
            return Err(PluginError::Processing(
                "Expected a number after operator".to_string(),
            ));
        };

        match op {
            '*' => current *= rhs,
            '/' => {
                if *rhs == 0.0 {
                    return Err(PluginError::Processing("Division by zero".to_string()));
                }
                current /= rhs;
            }
            '+' => {
                terms.push(pending_add_sign * current);
                pending_add_sign = 1.0;
                current = *rhs;
            }
            '-' => {
                terms.push(pending_add_sign * current);
                pending_add_sign = -1.0;
                current = *rhs;
            }
            other => {
                return Err(PluginError::Processing(format!(
                    "Unsupported operator: {other}"
                )));
            }
        }
        i += 2;
    }

    terms.push(pending_add_sign * current);
    Ok(terms.into_iter().sum())
}

#[derive(Debug, Clone, Copy)]
enum Token {
    Number(f64),
    Operator(char),
}

fn tokenize(expression: &str) -> PluginResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut number = String::new();

    for c in expression.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            '+' | '-' | '*' | '/' => {
                if !number.is_empty() {
                    tokens.push(Token::Number(number.parse().map_err(|_| {
                        PluginError::Processing(format!("Invalid number: {number}"))
                    })?));
                    number.clear();
                }
                tokens.push(Token::Operator(c));
            }
            c if c.is_whitespace() => {
                if !number.is_empty() {
                    tokens.push(Token::Number(number.parse().map_err(|_| {
                        PluginError::Processing(format!("Invalid number: {number}"))
                    })?));
                    number.clear();
                }
            }
            other => {
                return Err(PluginError::Processing(format!(
                    "Unexpected character in expression: {other}"
                )));
            }
        }
    }

    if !number.is_empty() {
        tokens.push(Token::Number(number.parse().map_err(|_| {
            PluginError::Processing(format!("Invalid number: {number}"))
        })?));
    }

    Ok(tokens)
}
