//! Process runner abstraction for OS command execution

use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::process::Command;

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Result of a finished process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    /// Exit status as reported by the OS
    pub status: String,
    /// stdout followed by stderr, trailing newlines trimmed
    pub output: String,
}

/// Runs a single OS process to completion
#[async_trait]
pub trait ProcessRunner: Send + Sync + 'static {
    async fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput>;
}

/// Runs processes on the host via `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(ProcessOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            output: combined.trim_end_matches('\n').to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display() {
        let inv = Invocation::new("/sbin/shutdown", ["-h", "now"]);
        assert_eq!(inv.to_string(), "/sbin/shutdown -h now");
    }

    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let inv = Invocation::new("/bin/echo", ["shutdown", "-r", "now"]);
        let out = SystemRunner.run(&inv).await.expect("spawn failed");
        assert!(out.success);
        assert_eq!(out.output, "shutdown -r now");
    }

    #[tokio::test]
    async fn test_system_runner_spawn_error() {
        let inv = Invocation::new("/nonexistent/definitely-not-here", Vec::<String>::new());
        assert!(SystemRunner.run(&inv).await.is_err());
    }
}
