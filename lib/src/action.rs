pub mod ssh;
pub mod transport;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use async_trait::async_trait;
use bstr::ByteSlice;

use crate::error::Result;
use crate::inventory::Node;

/// Runs one command on one target.
///
/// A runner owns at most one session and is never shared across targets.
/// Dropping the future returned by [`Runner::exec`] must release any
/// transport resources it holds.
#[async_trait]
pub trait Runner {
    /// Executes the request to completion.
    ///
    /// A non-zero remote exit status is not an error; only connection,
    /// authentication and channel failures are.
    async fn exec(&mut self, request: &ExecRequest) -> Result<ExecOutput>;
}

/// Factory for building a fresh [`Runner`] per target.
pub trait RunnerFactory {
    fn runner(&self, node: Arc<Node>) -> Box<dyn Runner + Send>;
}

/// Concrete command to run on a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub target_host: String,
    /// Identity the command runs as. May differ from the login user.
    pub exec_user: String,
    /// Passed verbatim to a shell on the target.
    pub command: String,
}

impl ExecRequest {
    /// Command line to send over a session logged in as `login_user`.
    ///
    /// Runs the command verbatim when no identity switch is needed, and
    /// through non-interactive `sudo` otherwise.
    #[must_use]
    pub fn remote_command(&self, login_user: &str) -> Cow<'_, str> {
        if self.exec_user.is_empty() || self.exec_user == login_user {
            Cow::Borrowed(&self.command)
        } else {
            Cow::Owned(format!(
                "sudo -n -u {} -- sh -c {}",
                shell_quote(&self.exec_user),
                shell_quote(&self.command)
            ))
        }
    }
}

/// Output of a command run by [`Runner::exec`].
#[derive(Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    /// `None` when the remote side closed the channel without an exit status,
    /// for example when the command was killed by a signal.
    pub exit_status: Option<u32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Wall-clock time between issuing the command and its completion.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or_default()
    }
}

impl fmt::Debug for ExecOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecOutput")
            .field("start_time", &self.start_time)
            .field("end_time", &self.end_time)
            .field("exit_status", &self.exit_status)
            .field("stdout", &self.stdout.as_bstr())
            .field("stderr", &self.stderr.as_bstr())
            .finish()
    }
}

/// Wraps `s` in single quotes for a POSIX shell.
fn shell_quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for c in s.chars() {
        if c == '\'' {
            quoted.push_str(r"'\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn request(exec_user: &str, command: &str) -> ExecRequest {
        ExecRequest {
            target_host: "10.0.0.1".into(),
            exec_user: exec_user.into(),
            command: command.into(),
        }
    }

    #[rstest]
    #[case("ops", "uptime", "uptime")]
    #[case("", "uptime", "uptime")]
    #[case("root", "uptime", "sudo -n -u 'root' -- sh -c 'uptime'")]
    #[case("root", "echo 'hi' | wc", r"sudo -n -u 'root' -- sh -c 'echo '\''hi'\'' | wc'")]
    fn remote_command_works(#[case] exec_user: &str, #[case] command: &str, #[case] should: &str) {
        let request = request(exec_user, command);
        assert_eq!(request.remote_command("ops"), should);
    }

    #[test]
    fn elapsed_never_negative() {
        let now = SystemTime::now();
        let output = ExecOutput {
            start_time: now,
            end_time: now - Duration::from_secs(1),
            exit_status: Some(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert_eq!(output.elapsed(), Duration::ZERO);
    }

    #[rstest]
    #[case(Some(0), true)]
    #[case(Some(2), false)]
    #[case(None, false)]
    fn is_success_works(#[case] exit_status: Option<u32>, #[case] should: bool) {
        let now = SystemTime::now();
        let output = ExecOutput {
            start_time: now,
            end_time: now,
            exit_status,
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert_eq!(output.is_success(), should);
    }
}
