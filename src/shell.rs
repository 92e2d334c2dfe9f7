//! Privileged command execution.
//!
//! Every external firewall-tool invocation goes through [`Shell`], which
//! decides whether to prefix `sudo`, intercepts mutating invocations in
//! dry-run mode, and turns failed invocations into typed errors. The
//! underlying [`CommandExecutor`] trait exists so unit tests can mock
//! system commands without running them.

use anyhow::Result;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::EngineError;

#[cfg(test)]
use mockall::automock;

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Whether the command exited with code 0
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Synthetic success, used when a dry-run intercepts an invocation.
    fn intercepted() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Default::default()
        }
    }
}

/// Trait for command execution, allowing dependency injection for testing.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with the given arguments.
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;

    /// Execute a command, writing `stdin` to the child's standard input.
    fn execute_with_stdin(&self, cmd: &str, args: &[String], stdin: &str) -> Result<CommandOutput>;
}

/// Real implementation of [`CommandExecutor`] that runs actual system commands.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }

    fn execute_with_stdin(
        &self,
        cmd: &str,
        args: &[String],
        stdin_data: &str,
    ) -> Result<CommandOutput> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(stdin_data.as_bytes())?;
        }

        let output = child.wait_with_output()?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Helper to convert a slice of &str to Vec<String>.
///
/// Mockall has trouble with lifetimes in `&[&str]`, so the executor trait
/// takes `&[String]` and call sites convert through this.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Check if running as root (effective UID == 0), used to skip sudo.
pub fn is_root() -> bool {
    // SAFETY: geteuid() reads the effective user ID. It has no
    // preconditions, never fails, and doesn't modify any state.
    unsafe { libc::geteuid() == 0 }
}

/// The privileged execution shell.
///
/// Invocations come in three flavors:
/// - [`probe`](Shell::probe): existence/permission checks where a non-zero
///   exit is data, not an error. Always executed.
/// - [`read`](Shell::read): listings. Always executed, so dry-run
///   reconciliations diff against the real current state.
/// - [`mutate`](Shell::mutate) / [`mutate_with_stdin`](Shell::mutate_with_stdin):
///   anything that changes firewall state. In dry-run mode these are
///   intercepted before invocation and the would-be command line recorded.
pub struct Shell {
    executor: Arc<dyn CommandExecutor>,
    use_sudo: bool,
    dry_run: bool,
    recorded: Mutex<Vec<String>>,
}

impl Shell {
    pub fn new(executor: Arc<dyn CommandExecutor>, use_sudo: bool, dry_run: bool) -> Self {
        Self {
            executor,
            use_sudo,
            dry_run,
            recorded: Mutex::new(Vec::new()),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Command lines intercepted so far in dry-run mode.
    pub fn recorded(&self) -> Vec<String> {
        self.recorded.lock().unwrap().clone()
    }

    fn resolve(&self, program: &str, args: &[String]) -> (String, Vec<String>) {
        if self.use_sudo {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(program.to_string());
            full.extend_from_slice(args);
            ("sudo".to_string(), full)
        } else {
            (program.to_string(), args.to_vec())
        }
    }

    fn command_line(&self, program: &str, args: &[String]) -> String {
        let (cmd, argv) = self.resolve(program, args);
        let mut line = cmd;
        for arg in &argv {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Run a non-mutating check. Non-zero exit is reported in the output,
    /// never as an error; only a failure to spawn the tool errors.
    pub fn probe(&self, program: &str, args: &[String]) -> Result<CommandOutput, EngineError> {
        let (cmd, argv) = self.resolve(program, args);
        self.executor
            .execute(&cmd, &argv)
            .map_err(|e| EngineError::BackendOperationFailed {
                operation: format!("invoke {}", program),
                detail: e.to_string(),
            })
    }

    /// Run a non-mutating listing, classifying a non-zero exit.
    pub fn read(
        &self,
        operation: &str,
        program: &str,
        args: &[String],
    ) -> Result<String, EngineError> {
        let output = self.probe(program, args)?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(classify(operation, &output))
        }
    }

    /// Run a state-changing invocation, or record it in dry-run mode.
    pub fn mutate(
        &self,
        operation: &str,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, EngineError> {
        if self.dry_run {
            let line = self.command_line(program, args);
            debug!("[dry-run] {}", line);
            self.recorded.lock().unwrap().push(line);
            return Ok(CommandOutput::intercepted());
        }

        let output = self.probe(program, args)?;
        if output.success {
            Ok(output)
        } else {
            Err(classify(operation, &output))
        }
    }

    /// Like [`mutate`](Shell::mutate) but feeds a script on stdin.
    pub fn mutate_with_stdin(
        &self,
        operation: &str,
        program: &str,
        args: &[String],
        stdin: &str,
    ) -> Result<CommandOutput, EngineError> {
        if self.dry_run {
            let line = self.command_line(program, args);
            debug!("[dry-run] {} with script:\n{}", line, stdin);
            self.recorded.lock().unwrap().push(line);
            return Ok(CommandOutput::intercepted());
        }

        let (cmd, argv) = self.resolve(program, args);
        let output = self
            .executor
            .execute_with_stdin(&cmd, &argv, stdin)
            .map_err(|e| EngineError::BackendOperationFailed {
                operation: format!("invoke {}", program),
                detail: e.to_string(),
            })?;
        if output.success {
            Ok(output)
        } else {
            Err(classify(operation, &output))
        }
    }
}

/// Turn a failed invocation into the right error variant, keeping the
/// backend's raw diagnostic text.
fn classify(operation: &str, output: &CommandOutput) -> EngineError {
    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim().to_string()
    } else {
        output.stderr.trim().to_string()
    };

    if detail.contains("Permission denied")
        || detail.contains("Operation not permitted")
        || detail.contains("password is required")
    {
        EngineError::PermissionDenied(detail)
    } else {
        EngineError::BackendOperationFailed {
            operation: operation.to_string(),
            detail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_output(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            success: true,
            code: Some(0),
        }
    }

    fn failure_output(stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: false,
            code: Some(1),
        }
    }

    #[test]
    fn test_args_to_strings() {
        let args = args_to_strings(&["-L", "CHAIN", "-n"]);
        assert_eq!(args, vec!["-L", "CHAIN", "-n"]);
        assert!(args_to_strings(&[]).is_empty());
    }

    #[test]
    fn test_real_executor_echo() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute("echo", &args_to_strings(&["-n", "hello"]))
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_real_executor_stdin() {
        let executor = RealCommandExecutor::new();
        let output = executor
            .execute_with_stdin("cat", &[], "hello world")
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello world");
    }

    #[test]
    fn test_sudo_prefix_applied() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "sudo" && args[0] == "iptables" && args[1] == "-N")
            .times(1)
            .returning(|_, _| Ok(success_output("")));

        let shell = Shell::new(Arc::new(mock), true, false);
        let result = shell.mutate(
            "create chain",
            "iptables",
            &args_to_strings(&["-N", "TEST"]),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_no_sudo_when_disabled() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "iptables" && args[0] == "-N")
            .times(1)
            .returning(|_, _| Ok(success_output("")));

        let shell = Shell::new(Arc::new(mock), false, false);
        let result = shell.mutate(
            "create chain",
            "iptables",
            &args_to_strings(&["-N", "TEST"]),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_dry_run_intercepts_mutations() {
        let mut mock = MockCommandExecutor::new();
        // The executor must never be called for a mutation in dry-run.
        mock.expect_execute().times(0);

        let shell = Shell::new(Arc::new(mock), true, true);
        let result = shell.mutate(
            "add rule",
            "iptables",
            &args_to_strings(&["-A", "TEST", "-d", "1.2.3.4", "-j", "DROP"]),
        );
        assert!(result.unwrap().success);

        let recorded = shell.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0], "sudo iptables -A TEST -d 1.2.3.4 -j DROP");
    }

    #[test]
    fn test_dry_run_still_executes_reads() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_, _| Ok(success_output("-A TEST -d 1.2.3.4 -j DROP")));

        let shell = Shell::new(Arc::new(mock), false, true);
        let stdout = shell
            .read("list rules", "iptables", &args_to_strings(&["-S", "TEST"]))
            .unwrap();
        assert!(stdout.contains("1.2.3.4"));
        assert!(shell.recorded().is_empty());
    }

    #[test]
    fn test_permission_denied_classified() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute().times(1).returning(|_, _| {
            Ok(failure_output(
                "iptables v1.8.9: can't initialize iptables table `filter': Permission denied",
            ))
        });

        let shell = Shell::new(Arc::new(mock), false, false);
        let err = shell
            .mutate("add rule", "iptables", &args_to_strings(&["-A", "TEST"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::PermissionDenied(_)));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_other_failure_classified_as_backend_failure() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_, _| Ok(failure_output("Bad argument `DORP'")));

        let shell = Shell::new(Arc::new(mock), false, false);
        let err = shell
            .mutate("add rule", "iptables", &args_to_strings(&["-A", "TEST"]))
            .unwrap_err();
        match err {
            EngineError::BackendOperationFailed { operation, detail } => {
                assert_eq!(operation, "add rule");
                assert!(detail.contains("DORP"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_probe_reports_nonzero_without_error() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .times(1)
            .returning(|_, _| Ok(failure_output("No chain/target/match by that name")));

        let shell = Shell::new(Arc::new(mock), false, false);
        let output = shell
            .probe("iptables", &args_to_strings(&["-C", "TEST", "-d", "1.2.3.4"]))
            .unwrap();
        assert!(!output.success);
    }

    #[test]
    fn test_mutate_with_stdin_dry_run_records() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute_with_stdin().times(0);

        let shell = Shell::new(Arc::new(mock), false, true);
        let result = shell.mutate_with_stdin(
            "apply script",
            "nft",
            &args_to_strings(&["-f", "-"]),
            "add table inet t\n",
        );
        assert!(result.is_ok());
        assert_eq!(shell.recorded(), vec!["nft -f -".to_string()]);
    }
}
