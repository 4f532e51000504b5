//! Command execution module for the panel
//!
//! Handles the privileged host actions:
//! - Power management commands (reboot, shutdown)
//! - Service management for the panel's own systemd unit
//! - Bounded command execution with timeout

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info};

/// Command execution result
#[derive(Debug, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub execution_time_ms: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Reboot,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Restart,
    Enable,
    Disable,
    Stop,
}

impl PowerAction {
    pub fn command(self) -> &'static [&'static str] {
        match self {
            PowerAction::Reboot => &["reboot"],
            PowerAction::Shutdown => &["shutdown", "now"],
        }
    }
}

impl FromStr for PowerAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reboot" => Ok(PowerAction::Reboot),
            "shutdown" => Ok(PowerAction::Shutdown),
            other => Err(anyhow!("Unknown power command: {}", other)),
        }
    }
}

impl ServiceAction {
    pub fn verb(self) -> &'static str {
        match self {
            ServiceAction::Restart => "restart",
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
            ServiceAction::Stop => "stop",
        }
    }
}

impl FromStr for ServiceAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "restart" => Ok(ServiceAction::Restart),
            "enable" => Ok(ServiceAction::Enable),
            "disable" => Ok(ServiceAction::Disable),
            "stop" => Ok(ServiceAction::Stop),
            other => Err(anyhow!("Unknown service command: {}", other)),
        }
    }
}

/// Host command executor
pub struct CommandExecutor;

impl CommandExecutor {
    /// Start a reboot or shutdown without waiting for it
    ///
    /// The process is detached so the caller can still answer the request.
    pub async fn execute_power_command(action: PowerAction) -> Result<ExecutionResult> {
        let start_time = Instant::now();
        let argv = action.command();
        info!("Executing power command: {:?}", argv);

        let result = AsyncCommand::new(argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to execute {} command", argv[0]));

        let execution_time = start_time.elapsed().as_millis();

        match result {
            Ok(_child) => Ok(ExecutionResult {
                success: true,
                output: match action {
                    PowerAction::Reboot => "Reboot initiated".to_string(),
                    PowerAction::Shutdown => "Shutdown initiated".to_string(),
                },
                error: None,
                exit_code: None,
                execution_time_ms: execution_time,
            }),
            Err(e) => Ok(ExecutionResult {
                success: false,
                output: String::new(),
                error: Some(format!("{:#}", e)),
                exit_code: None,
                execution_time_ms: execution_time,
            }),
        }
    }

    /// `systemctl <action> <service>` with timeout
    pub async fn execute_service_command(
        action: ServiceAction,
        service: &str,
        timeout_secs: u32,
    ) -> Result<ExecutionResult> {
        info!("Executing service command: {} {}", action.verb(), service);
        let argv = ["systemctl".to_string(), action.verb().to_string(), service.to_string()];
        Self::execute_command(&argv, timeout_secs).await
    }

    /// Run `argv` and wait for it, killing it after `timeout_secs`
    pub async fn execute_command(argv: &[String], timeout_secs: u32) -> Result<ExecutionResult> {
        let start_time = Instant::now();
        debug!("Executing command: {:?} (timeout: {}s)", argv, timeout_secs);

        let result = Self::execute_unix_command(argv, timeout_secs).await;
        let execution_time = start_time.elapsed().as_millis();

        match result {
            Ok((output, exit_code)) => Ok(ExecutionResult {
                success: exit_code == 0,
                output,
                error: None,
                exit_code: Some(exit_code),
                execution_time_ms: execution_time,
            }),
            Err(e) => Ok(ExecutionResult {
                success: false,
                output: String::new(),
                error: Some(format!("{:#}", e)),
                exit_code: Some(-1),
                execution_time_ms: execution_time,
            }),
        }
    }

    async fn execute_unix_command(argv: &[String], timeout_secs: u32) -> Result<(String, i32)> {
        let (program, args) = argv.split_first().ok_or_else(|| anyhow!("Empty command"))?;
        let output = tokio::time::timeout(
            Duration::from_secs(timeout_secs as u64),
            AsyncCommand::new(program)
                .args(args)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("Command timed out")?
        .context("Failed to execute command")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined_output = if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\nSTDERR:\n{}", stdout, stderr)
        };

        let exit_code = output.status.code().unwrap_or(-1);

        Ok((combined_output, exit_code))
    }
}
