use crate::{output_key, output_key_param, with_output_key};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use wfcore::value::to_text;
use wfcore::{
    Node, NodeContext, NodeError, NodeInterface, PortDefinition, TypeHint, Value, ValueStore,
    DEFAULT_ACTION,
};
use wfruntime::{BuildContext, NodeFactory, NodeMetadata};

const SHELL_OUTPUT: &str = "shell";

/// Runs a program directly (no shell interpretation) and records its
/// stdout, stderr and exit code.
pub struct ShellNode;

fn string_list(value: Option<&Value>, field: &str) -> Result<Vec<String>, NodeError> {
    match value {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.iter().map(to_text).collect()),
        Some(other) => Err(NodeError::InvalidInputType {
            field: field.to_string(),
            expected: "array".to_string(),
            actual: wfcore::value::type_name(other).to_string(),
        }),
    }
}

#[async_trait]
impl Node for ShellNode {
    fn node_type(&self) -> &str {
        "shell.run"
    }

    async fn exec(&self, ctx: &NodeContext, _prepared: &Value) -> Result<Value, NodeError> {
        let program = ctx
            .param_str("command")
            .ok_or_else(|| NodeError::MissingInput("command".to_string()))?;
        let args = string_list(ctx.params.get("args"), "args")?;
        let fail_on_error = ctx
            .params
            .get("fail_on_error")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let mut cmd = Command::new(program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = ctx.param_str("cwd") {
            cmd.current_dir(cwd);
        }
        if let Some(Value::Object(env)) = ctx.params.get("env") {
            for (key, value) in env {
                cmd.env(key, to_text(value));
            }
        }

        ctx.events.info(format!("Running: {} {}", program, args.join(" ")));

        let mut child = cmd
            .spawn()
            .map_err(|e| NodeError::ExecutionFailed(format!("Failed to spawn {}: {}", program, e)))?;

        // Stdin is fed alongside the output drain so a full stdout pipe
        // cannot stall the write. Without input it is closed at once.
        let feeder = match (child.stdin.take(), ctx.params.get("stdin")) {
            (Some(mut stdin), Some(input)) => {
                let bytes = to_text(input).into_bytes();
                Some(tokio::spawn(async move { stdin.write_all(&bytes).await }))
            }
            _ => None,
        };

        let output = tokio::select! {
            output = child.wait_with_output() => output
                .map_err(|e| NodeError::ExecutionFailed(format!("Failed to wait for {}: {}", program, e)))?,
            _ = ctx.cancellation.cancelled() => {
                if let Some(feeder) = feeder {
                    feeder.abort();
                }
                return Err(NodeError::Cancelled);
            }
        };

        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Ok(())) => {}
                // The program exited without reading all of its input.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => {
                    return Err(NodeError::ExecutionFailed(format!("Failed to write stdin: {}", e)))
                }
                Err(e) => {
                    return Err(NodeError::ExecutionFailed(format!("Stdin writer failed: {}", e)))
                }
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code();

        if !stderr.is_empty() {
            ctx.events.warn(format!("stderr: {}", stderr.trim_end()));
        }

        if fail_on_error && !output.status.success() {
            return Err(NodeError::ExecutionFailed(format!(
                "{} exited with {}. stderr: {}",
                program,
                output.status,
                stderr.trim_end()
            )));
        }

        Ok(json!({
            "stdout": stdout,
            "stderr": stderr,
            "exit_code": exit_code,
            "success": output.status.success(),
        }))
    }

    async fn post(
        &self,
        ctx: &NodeContext,
        store: &mut ValueStore,
        _prepared: &Value,
        result: Value,
    ) -> Result<String, NodeError> {
        store.insert(output_key(&ctx.params, SHELL_OUTPUT), result);
        Ok(DEFAULT_ACTION.to_string())
    }
}

pub struct ShellNodeFactory;

impl NodeFactory for ShellNodeFactory {
    fn create(
        &self,
        params: &HashMap<String, Value>,
        _build: &BuildContext<'_>,
    ) -> Result<Box<dyn Node>, NodeError> {
        if !params.contains_key("command") {
            return Err(NodeError::Configuration("shell.run needs a 'command' param".to_string()));
        }
        Ok(Box::new(ShellNode))
    }

    fn node_type(&self) -> &str {
        "shell.run"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Run a program and capture its output".to_string(),
            category: "system".to_string(),
            interface: NodeInterface::new()
                .with_output(
                    PortDefinition::new(SHELL_OUTPUT, "stdout, stderr, exit_code and success")
                        .typed(TypeHint::Object),
                )
                .with_param(PortDefinition::new("command", "Program to run").typed(TypeHint::String))
                .with_param(
                    PortDefinition::new("args", "Program arguments")
                        .optional()
                        .typed(TypeHint::Array),
                )
                .with_param(PortDefinition::new("cwd", "Working directory").optional())
                .with_param(
                    PortDefinition::new("env", "Extra environment variables")
                        .optional()
                        .typed(TypeHint::Object),
                )
                .with_param(PortDefinition::new("stdin", "Text written to stdin").optional())
                .with_param(
                    PortDefinition::new("fail_on_error", "Fail on a non-zero exit (default true)")
                        .optional()
                        .typed(TypeHint::Boolean),
                )
                .with_param(output_key_param(SHELL_OUTPUT)),
        }
    }

    fn interface_for(&self, params: &HashMap<String, Value>) -> NodeInterface {
        with_output_key(self.metadata().interface, params, SHELL_OUTPUT)
    }
}
