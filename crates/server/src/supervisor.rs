use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use clockbridge_core::config::SupervisorConfig;
use clockbridge_slack::socket::{RunExit, SocketError};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RestartError {
    #[error("could not locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("could not spawn replacement process `{program}`: {source}")]
    Spawn { program: PathBuf, source: std::io::Error },
    #[error("event loop failed and restart is disabled: {0}")]
    Disabled(SocketError),
    #[error("event loop never connected: {0}")]
    NotConnected(SocketError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The run ended without a fault; exit normally.
    Shutdown,
    /// A replacement process is running; the caller must exit with status 0.
    Restarted { pid: u32 },
}

/// Starts a fresh copy of the program.
pub trait Relauncher {
    fn relaunch(&self) -> Result<u32, RestartError>;
}

#[derive(Clone, Debug)]
pub struct ExecutableRelauncher {
    program: Option<PathBuf>,
    args: Vec<OsString>,
}

impl ExecutableRelauncher {
    /// Relaunches the current executable, forwarding this process's CLI args when asked.
    pub fn current(forward_args: bool) -> Self {
        let args = if forward_args { std::env::args_os().skip(1).collect() } else { Vec::new() };
        Self { program: None, args }
    }

    #[cfg(test)]
    pub fn with_program(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self { program: Some(program.into()), args }
    }

    fn program(&self) -> Result<PathBuf, RestartError> {
        match &self.program {
            Some(program) => Ok(program.clone()),
            None => std::env::current_exe().map_err(RestartError::CurrentExe),
        }
    }
}

impl Relauncher for ExecutableRelauncher {
    fn relaunch(&self) -> Result<u32, RestartError> {
        let program = self.program()?;
        let child = Command::new(&program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| RestartError::Spawn { program: program.clone(), source })?;

        info!(
            event_name = "system.supervisor.relaunched",
            program = %program.display(),
            forwarded_args = self.args.len(),
            pid = child.id(),
            "replacement process started"
        );
        Ok(child.id())
    }
}

/// Turns the outcome of one event-loop run into a process-level decision.
///
/// A fault on an established connection is answered with exactly one
/// relaunch. A connect failure, or failing to relaunch, is fatal and is
/// returned to the caller rather than retried.
pub fn supervise(
    result: Result<RunExit, SocketError>,
    relauncher: &dyn Relauncher,
    settings: &SupervisorConfig,
) -> Result<SupervisorExit, RestartError> {
    let fault = match result {
        Ok(exit) => {
            info!(event_name = "system.supervisor.shutdown", exit = ?exit, "event loop finished");
            return Ok(SupervisorExit::Shutdown);
        }
        Err(fault) => fault,
    };

    warn!(
        event_name = "system.supervisor.fault",
        error = %fault,
        restart = settings.restart_on_disconnect,
        "event loop raised an unrecoverable fault"
    );
    if !fault.is_restartable() {
        error!(
            event_name = "system.supervisor.connect_failed",
            error = %fault,
            "initial connection failed; not restarting"
        );
        return Err(RestartError::NotConnected(fault));
    }
    if !settings.restart_on_disconnect {
        return Err(RestartError::Disabled(fault));
    }

    match relauncher.relaunch() {
        Ok(pid) => Ok(SupervisorExit::Restarted { pid }),
        Err(restart_error) => {
            error!(
                event_name = "system.supervisor.restart_failed",
                error = %restart_error,
                "could not restart after fault"
            );
            Err(restart_error)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use clockbridge_core::config::SupervisorConfig;
    use clockbridge_slack::socket::{RunExit, SocketError, TransportError};

    use super::{supervise, ExecutableRelauncher, Relauncher, RestartError, SupervisorExit};

    #[derive(Default)]
    struct CountingRelauncher {
        calls: Cell<usize>,
        fail: bool,
    }

    impl Relauncher for CountingRelauncher {
        fn relaunch(&self) -> Result<u32, RestartError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(RestartError::CurrentExe(std::io::Error::other("no exe")));
            }
            Ok(4242)
        }
    }

    fn enabled() -> SupervisorConfig {
        SupervisorConfig { restart_on_disconnect: true, forward_args: true }
    }

    fn disconnected() -> Result<RunExit, SocketError> {
        Err(SocketError::Disconnected { reason: "refresh_requested".to_owned() })
    }

    #[test]
    fn disconnect_relaunches_exactly_once() {
        let relauncher = CountingRelauncher::default();

        let exit = supervise(disconnected(), &relauncher, &enabled()).expect("restart");

        assert_eq!(exit, SupervisorExit::Restarted { pid: 4242 });
        assert_eq!(relauncher.calls.get(), 1);
    }

    #[test]
    fn transport_faults_also_relaunch() {
        let relauncher = CountingRelauncher::default();
        let fault = Err(SocketError::Transport(TransportError::Receive("reset".to_owned())));

        let exit = supervise(fault, &relauncher, &enabled()).expect("restart");

        assert!(matches!(exit, SupervisorExit::Restarted { .. }));
        assert_eq!(relauncher.calls.get(), 1);
    }

    #[test]
    fn connect_failures_are_fatal_in_every_generation() {
        let relauncher = CountingRelauncher::default();

        for _ in 0..3 {
            let fault = Err(SocketError::Transport(TransportError::Connect(
                "apps.connections.open failed: invalid_auth".to_owned(),
            )));

            let error = supervise(fault, &relauncher, &enabled()).expect_err("fatal");

            assert!(matches!(
                error,
                RestartError::NotConnected(SocketError::Transport(TransportError::Connect(_)))
            ));
        }
        assert_eq!(relauncher.calls.get(), 0, "a failed connect never spawns a replacement");
    }

    #[test]
    fn clean_exits_do_not_relaunch() {
        for exit in [RunExit::Cancelled, RunExit::StreamClosed] {
            let relauncher = CountingRelauncher::default();

            let outcome = supervise(Ok(exit), &relauncher, &enabled()).expect("shutdown");

            assert_eq!(outcome, SupervisorExit::Shutdown);
            assert_eq!(relauncher.calls.get(), 0);
        }
    }

    #[test]
    fn relaunch_failure_is_fatal_and_not_retried() {
        let relauncher = CountingRelauncher { fail: true, ..CountingRelauncher::default() };

        let error = supervise(disconnected(), &relauncher, &enabled()).expect_err("fatal");

        assert!(matches!(error, RestartError::CurrentExe(_)));
        assert_eq!(relauncher.calls.get(), 1);
    }

    #[test]
    fn disabled_restart_surfaces_the_fault() {
        let relauncher = CountingRelauncher::default();
        let settings = SupervisorConfig { restart_on_disconnect: false, forward_args: true };

        let error = supervise(disconnected(), &relauncher, &settings).expect_err("fault");

        assert!(matches!(error, RestartError::Disabled(SocketError::Disconnected { .. })));
        assert_eq!(relauncher.calls.get(), 0);
    }

    #[test]
    fn missing_executable_is_a_spawn_error() {
        let relauncher =
            ExecutableRelauncher::with_program("/nonexistent/clockbridge-binary", Vec::new());

        let error = relauncher.relaunch().expect_err("spawn must fail");

        assert!(matches!(error, RestartError::Spawn { .. }));
    }

    #[test]
    fn args_are_dropped_unless_forwarding() {
        assert!(ExecutableRelauncher::current(false).args.is_empty());
    }
}
