use std::process::Stdio;
use thiserror::Error;
use tracing::{debug, info};
use treesync_core::SyncPlan;

/// Exit code reported when a hook could not run at all or died from a signal.
pub const HOOK_UNAVAILABLE_CODE: i32 = 255;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook command could not be parsed: {0:?}")]
    Parse(String),
    #[error("hook command could not be started: {0}")]
    Launch(#[from] std::io::Error),
    #[error("hook command did not complete successfully (exit code {code})")]
    Failed { code: i32 },
}

impl HookError {
    /// Exit code a CLI should propagate for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Failed { code } => *code,
            Self::Parse(_) | Self::Launch(_) => HOOK_UNAVAILABLE_CODE,
        }
    }
}

/// Runs after a sync that changed something.
#[async_trait::async_trait]
pub trait PostApplyHook: Send + Sync {
    async fn run(&self, plan: &SyncPlan) -> Result<(), HookError>;
}

/// External command, split with POSIX shell quoting rules.
#[derive(Debug, Clone)]
pub struct CommandHook {
    program: String,
    args: Vec<String>,
}

impl CommandHook {
    pub fn new(command: &str) -> Result<Self, HookError> {
        let mut parts = shlex::split(command).ok_or_else(|| HookError::Parse(command.into()))?;
        if parts.is_empty() {
            return Err(HookError::Parse(command.into()));
        }
        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait::async_trait]
impl PostApplyHook for CommandHook {
    async fn run(&self, plan: &SyncPlan) -> Result<(), HookError> {
        info!(
            "Running hook {:?} ({} added, {} changed, {} removed)",
            self.program,
            plan.added.len(),
            plan.changed.len(),
            plan.removed.len()
        );

        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        debug!("Hook {:?} finished: {}", self.program, status);
        if status.success() {
            Ok(())
        } else {
            Err(HookError::Failed {
                code: status.code().unwrap_or(HOOK_UNAVAILABLE_CODE),
            })
        }
    }
}
