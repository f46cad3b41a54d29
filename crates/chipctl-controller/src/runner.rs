//! Command dispatch, deadlines and cleanup.
//!
//! A command moves through `Idle → Dispatched → (Completed | TimedOut) →
//! CleanedUp`. Completion and deadline race through [`CommandCompletion`],
//! which lets exactly one of them decide the exit status.

use chipctl_core::{ChipError, CommissionerIdentity, Result};
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandContext};
use crate::event_loop::{LoopHandle, ProtocolLoop};
use crate::options::StackOptions;
use crate::stack::StackContext;

/// Longest wait accepted for a command in interactive mode
pub const INTERACTIVE_WAIT_CEILING: Duration = Duration::from_secs(7200);

/// Which side of the completion race won
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Neither completion nor deadline yet
    Pending,
    /// The command reported its exit status in time
    Completed,
    /// The deadline elapsed first
    TimedOut,
}

struct CompletionState {
    outcome: CommandOutcome,
    tx: Option<oneshot::Sender<Result<()>>>,
}

/// Shared completion signal of one dispatched command
#[derive(Clone)]
pub struct CommandCompletion {
    state: Arc<Mutex<CompletionState>>,
}

/// Waiting side of a [`CommandCompletion`]
pub struct CompletionWaiter {
    rx: oneshot::Receiver<Result<()>>,
    completion: CommandCompletion,
}

impl CommandCompletion {
    /// Create a completion and the waiter observing it
    #[must_use]
    pub fn channel() -> (Self, CompletionWaiter) {
        let (tx, rx) = oneshot::channel();
        let completion = Self {
            state: Arc::new(Mutex::new(CompletionState {
                outcome: CommandOutcome::Pending,
                tx: Some(tx),
            })),
        };
        let waiter = CompletionWaiter {
            rx,
            completion: completion.clone(),
        };
        (completion, waiter)
    }

    /// Report the exit status; returns false if the race was already decided
    pub fn complete(&self, status: Result<()>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.outcome != CommandOutcome::Pending {
            debug!(outcome = ?state.outcome, "ignoring late completion");
            return false;
        }
        state.outcome = CommandOutcome::Completed;
        if let Some(tx) = state.tx.take() {
            // The waiter may be gone for zero-deadline commands.
            let _ = tx.send(status);
        }
        true
    }

    fn expire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.outcome != CommandOutcome::Pending {
            return false;
        }
        state.outcome = CommandOutcome::TimedOut;
        state.tx = None;
        true
    }

    /// Current outcome
    #[must_use]
    pub fn outcome(&self) -> CommandOutcome {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .outcome
    }
}

impl CompletionWaiter {
    /// Wait for the exit status, up to `deadline`
    pub async fn wait(mut self, deadline: Duration) -> Result<()> {
        match tokio::time::timeout(deadline, &mut self.rx).await {
            Ok(Ok(status)) => status,
            Ok(Err(_)) => Err(ChipError::Internal(
                "command dropped without reporting a status".into(),
            )),
            Err(_) => {
                if self.completion.expire() {
                    Err(ChipError::Timeout(deadline))
                } else {
                    // Completed between the timer firing and the expiry.
                    self.rx.try_recv().unwrap_or_else(|_| {
                        Err(ChipError::Internal("completion lost after deadline".into()))
                    })
                }
            }
        }
    }
}

/// The command currently in flight
pub struct PendingCommand {
    /// Commissioner the command runs against
    pub identity: CommissionerIdentity,
    /// When the runner stops waiting, `None` for zero-deadline commands
    pub deadline: Option<Instant>,
    pub(crate) command: Box<dyn Command>,
    pub(crate) completion: CommandCompletion,
}

/// How a dispatched command started
#[derive(Debug)]
pub(crate) enum Started {
    /// Zero deadline: the body's return value is the exit status
    Finished(Result<()>),
    /// The runner must wait on the completion
    Waiting,
}

impl StackContext {
    /// Run a command body and park it as the pending command
    pub(crate) fn start_command(
        &mut self,
        mut command: Box<dyn Command>,
        completion: CommandCompletion,
        wait: Duration,
        handle: &LoopHandle,
    ) -> Result<Started> {
        if let Some(pending) = &self.pending {
            error!(
                command = command.name(),
                pending = pending.command.name(),
                "a command is already pending"
            );
            return Err(ChipError::Internal(format!(
                "cannot dispatch {} while {} is pending",
                command.name(),
                pending.command.name()
            )));
        }

        let identity = self.ensure_commissioner(&command.commissioner_options())?;
        debug!(command = command.name(), identity = %identity, ?wait, "dispatching");
        self.tracing_mut().record(
            "command_dispatched",
            json!({ "command": command.name(), "identity": identity.to_string() }),
        );

        let result = {
            let mut ctx = CommandContext::new(self, handle, identity.clone(), completion.clone());
            command.run(&mut ctx)
        };

        let started = if wait.is_zero() {
            Started::Finished(result)
        } else {
            if let Err(e) = result {
                completion.complete(Err(e));
            }
            Started::Waiting
        };

        self.pending = Some(PendingCommand {
            identity,
            deadline: (!wait.is_zero()).then(|| Instant::now() + wait),
            command,
            completion,
        });
        Ok(started)
    }

    /// Shut the pending command down and clean it up or defer its cleanup
    pub(crate) fn finish_command(&mut self, interactive: bool, status: &Result<()>) {
        let Some(PendingCommand {
            mut command,
            completion,
            ..
        }) = self.pending.take()
        else {
            return;
        };

        let event = match completion.outcome() {
            CommandOutcome::TimedOut => "command_timed_out",
            _ => "command_completed",
        };
        self.tracing_mut().record(
            event,
            json!({
                "command": command.name(),
                "error": status.as_ref().err().map(ToString::to_string),
            }),
        );

        command.shutdown();
        if interactive && command.defer_interactive_cleanup() {
            debug!(command = command.name(), "deferring cleanup");
            self.deferred.push(command);
        } else {
            command.cleanup(self);
        }
    }
}

/// Runs commands on the protocol loop, one at a time
pub struct CommandRunner {
    protocol: ProtocolLoop,
    interactive: bool,
}

impl CommandRunner {
    /// Start a runner with its own protocol loop
    pub fn new(options: StackOptions) -> Result<Self> {
        Ok(Self::with_loop(ProtocolLoop::start(options)?))
    }

    /// Runner on an already started loop
    #[must_use]
    pub const fn with_loop(protocol: ProtocolLoop) -> Self {
        Self {
            protocol,
            interactive: false,
        }
    }

    /// Interactive runners keep the stack up between commands
    #[must_use]
    pub const fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Returns true in interactive mode
    #[must_use]
    pub const fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Protocol loop the runner dispatches onto
    #[must_use]
    pub const fn protocol(&self) -> &ProtocolLoop {
        &self.protocol
    }

    /// Run `work` against the stack on the protocol thread
    pub async fn call<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut StackContext, &LoopHandle) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.protocol.call(work).await
    }

    /// Bring the stack up on the protocol thread
    pub async fn set_up_stack(&self) -> Result<()> {
        self.protocol.call(|stack, _| stack.set_up_stack()).await?
    }

    /// Tear the stack down on the protocol thread
    pub async fn tear_down_stack(&self) -> Result<()> {
        self.protocol.call(|stack, _| stack.tear_down_stack()).await?
    }

    /// Run every deferred cleanup, returning how many ran
    pub async fn execute_deferred_cleanups(&self) -> Result<usize> {
        let count = self
            .protocol
            .call(|stack, _| stack.execute_deferred_cleanups())
            .await?;
        if count > 0 {
            info!(count, "executed deferred cleanups");
        }
        Ok(count)
    }

    /// Number of commands waiting for deferred cleanup
    pub async fn deferred_cleanup_count(&self) -> Result<usize> {
        self.protocol
            .call(|stack, _| stack.deferred_cleanup_count())
            .await
    }

    /// Run one command and return its exit status.
    ///
    /// In one-shot mode the stack is set up before and torn down after the
    /// command.
    pub async fn run(&self, command: Box<dyn Command>) -> Result<()> {
        if !self.interactive {
            self.set_up_stack().await?;
        }

        let status = self.dispatch(command).await;

        if !self.interactive {
            if let Err(e) = self.tear_down_stack().await {
                if status.is_ok() {
                    return Err(e);
                }
                warn!(error = %e, "teardown failed after command error");
            }
        }
        status
    }

    async fn dispatch(&self, command: Box<dyn Command>) -> Result<()> {
        let name = command.name().to_string();
        let wait = command.wait_duration();
        if self.interactive && wait > INTERACTIVE_WAIT_CEILING {
            return Err(ChipError::Internal(format!(
                "{name} waits {}s, interactive commands are limited to {}s",
                wait.as_secs(),
                INTERACTIVE_WAIT_CEILING.as_secs()
            )));
        }

        let (completion, waiter) = CommandCompletion::channel();
        let started = self
            .protocol
            .call(move |stack, handle| stack.start_command(command, completion, wait, handle))
            .await??;

        let status = match started {
            Started::Finished(status) => status,
            Started::Waiting => waiter.wait(wait).await,
        };

        match &status {
            Ok(()) => debug!(command = %name, "command completed"),
            Err(ChipError::Timeout(_)) => warn!(command = %name, "command timed out"),
            Err(e) => debug!(command = %name, error = %e, "command failed"),
        }

        let interactive = self.interactive;
        let report = status
            .as_ref()
            .map(|_| ())
            .map_err(|e| ChipError::Command(e.to_string()));
        self.protocol
            .call(move |stack, _| stack.finish_command(interactive, &report))
            .await?;
        status
    }

    /// Stop the protocol loop
    pub fn shutdown(mut self) -> Result<()> {
        self.protocol.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CommissionerOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum Behavior {
        /// Return the given status from `run`
        Sync(bool),
        /// Complete from a loop timer
        After(Duration),
        /// Never complete
        Hang,
    }

    struct Scripted {
        behavior: Behavior,
        wait: Duration,
        identity: &'static str,
        defer: bool,
        instances: Arc<Mutex<Vec<u64>>>,
        cleanups: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(behavior: Behavior, wait: Duration) -> Self {
            Self {
                behavior,
                wait,
                identity: "alpha",
                defer: false,
                instances: Arc::default(),
                cleanups: Arc::default(),
            }
        }
    }

    impl Command for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<()> {
            let instance = ctx.current_commissioner()?.instance_id();
            self.instances.lock().unwrap().push(instance);
            match self.behavior {
                Behavior::Sync(true) => Ok(()),
                Behavior::Sync(false) => Err(ChipError::Command("scripted failure".into())),
                Behavior::After(delay) => {
                    let completion = ctx.completion();
                    ctx.handle().schedule_after(delay, move |_, _| {
                        completion.complete(Ok(()));
                    })
                }
                Behavior::Hang => Ok(()),
            }
        }

        fn wait_duration(&self) -> Duration {
            self.wait
        }

        fn defer_interactive_cleanup(&self) -> bool {
            self.defer
        }

        fn cleanup(&mut self, _: &mut StackContext) {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
        }

        fn commissioner_options(&self) -> CommissionerOptions {
            CommissionerOptions::for_identity(self.identity)
        }
    }

    fn runner(dir: &TempDir) -> CommandRunner {
        CommandRunner::new(StackOptions::new().storage_directory(dir.path())).unwrap()
    }

    #[test]
    fn test_completion_is_decided_once() {
        let (completion, _waiter) = CommandCompletion::channel();
        assert_eq!(completion.outcome(), CommandOutcome::Pending);
        assert!(completion.complete(Ok(())));
        assert!(!completion.complete(Err(ChipError::Command("late".into()))));
        assert!(!completion.expire());
        assert_eq!(completion.outcome(), CommandOutcome::Completed);

        let (completion, _waiter) = CommandCompletion::channel();
        assert!(completion.expire());
        assert!(!completion.complete(Ok(())));
        assert_eq!(completion.outcome(), CommandOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_waiter_times_out_and_ignores_late_completion() {
        let (completion, waiter) = CommandCompletion::channel();
        let err = waiter.wait(Duration::from_millis(10)).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.exit_code(), 124);
        assert!(!completion.complete(Ok(())));
        assert_eq!(completion.outcome(), CommandOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_waiter_sees_completion() {
        let (completion, waiter) = CommandCompletion::channel();
        let signal = completion.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            signal.complete(Err(ChipError::Command("remote failure".into())));
        });
        let err = waiter.wait(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, ChipError::Command(_)));
        assert_eq!(completion.outcome(), CommandOutcome::Completed);
    }

    #[tokio::test]
    async fn test_zero_deadline_uses_body_status() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);

        runner
            .run(Box::new(Scripted::new(Behavior::Sync(true), Duration::ZERO)))
            .await
            .unwrap();
        let err = runner
            .run(Box::new(Scripted::new(Behavior::Sync(false), Duration::ZERO)))
            .await
            .unwrap_err();
        assert!(matches!(err, ChipError::Command(_)));

        // A zero-deadline command that never signals still finishes.
        runner
            .run(Box::new(Scripted::new(Behavior::Hang, Duration::ZERO)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_async_completion_and_timeout() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);

        runner
            .run(Box::new(Scripted::new(
                Behavior::After(Duration::from_millis(20)),
                Duration::from_secs(5),
            )))
            .await
            .unwrap();

        let scripted = Scripted::new(Behavior::Hang, Duration::from_millis(50));
        let cleanups = Arc::clone(&scripted.cleanups);
        let err = runner.run(Box::new(scripted)).await.unwrap_err();
        assert!(matches!(err, ChipError::Timeout(_)));
        // Timed-out commands are still cleaned up.
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_body_error_is_immediate_status() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let started = Instant::now();
        let err = runner
            .run(Box::new(Scripted::new(Behavior::Sync(false), Duration::from_secs(30))))
            .await
            .unwrap_err();
        assert!(matches!(err, ChipError::Command(_)));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_bad_identity_is_fatal() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let mut scripted = Scripted::new(Behavior::Sync(true), Duration::ZERO);
        scripted.identity = "3";
        let err = runner.run(Box::new(scripted)).await.unwrap_err();
        assert!(matches!(err, ChipError::InvalidFabricId { fabric_id: 3, .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_interactive_reuses_commissioner() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir).interactive(true);
        runner.set_up_stack().await.unwrap();

        let instances: Arc<Mutex<Vec<u64>>> = Arc::default();
        for _ in 0..2 {
            let mut scripted = Scripted::new(
                Behavior::After(Duration::from_millis(1)),
                Duration::from_secs(1),
            );
            scripted.instances = Arc::clone(&instances);
            runner.run(Box::new(scripted)).await.unwrap();
        }

        let instances = instances.lock().unwrap().clone();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0], instances[1]);
        let generated = runner
            .call(|stack, _| stack.factory().chains_generated())
            .await
            .unwrap();
        assert_eq!(generated, 1);

        runner.tear_down_stack().await.unwrap();
    }

    #[tokio::test]
    async fn test_deferred_cleanups_run_once() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir).interactive(true);
        runner.set_up_stack().await.unwrap();

        let cleanups = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let mut scripted = Scripted::new(Behavior::Sync(true), Duration::ZERO);
            scripted.defer = true;
            scripted.cleanups = Arc::clone(&cleanups);
            runner.run(Box::new(scripted)).await.unwrap();
        }
        assert_eq!(runner.deferred_cleanup_count().await.unwrap(), 3);
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        assert_eq!(runner.execute_deferred_cleanups().await.unwrap(), 3);
        assert_eq!(cleanups.load(Ordering::SeqCst), 3);
        assert_eq!(runner.execute_deferred_cleanups().await.unwrap(), 0);
        assert_eq!(cleanups.load(Ordering::SeqCst), 3);

        runner.tear_down_stack().await.unwrap();
    }

    #[tokio::test]
    async fn test_one_shot_cleans_up_immediately() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        let mut scripted = Scripted::new(Behavior::Sync(true), Duration::ZERO);
        scripted.defer = true;
        let cleanups = Arc::clone(&scripted.cleanups);

        runner.run(Box::new(scripted)).await.unwrap();
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(runner.deferred_cleanup_count().await.unwrap(), 0);
        let live = runner.call(|stack, _| stack.factory().len()).await.unwrap();
        assert_eq!(live, 0);
    }

    #[tokio::test]
    async fn test_interactive_wait_ceiling() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir).interactive(true);
        runner.set_up_stack().await.unwrap();
        let scripted = Scripted::new(Behavior::Hang, INTERACTIVE_WAIT_CEILING + Duration::from_secs(1));
        let err = runner.run(Box::new(scripted)).await.unwrap_err();
        assert!(matches!(err, ChipError::Internal(_)));
    }

    #[tokio::test]
    async fn test_second_dispatch_is_rejected_while_pending() {
        let dir = TempDir::new().unwrap();
        let runner = runner(&dir);
        runner.set_up_stack().await.unwrap();

        let rejected = runner
            .call(|stack, handle| {
                let (first, _w1) = CommandCompletion::channel();
                let (second, _w2) = CommandCompletion::channel();
                let wait = Duration::from_secs(5);
                stack
                    .start_command(Box::new(Scripted::new(Behavior::Hang, wait)), first, wait, handle)
                    .unwrap();
                let err = stack
                    .start_command(Box::new(Scripted::new(Behavior::Hang, wait)), second, wait, handle)
                    .unwrap_err();
                stack.finish_command(false, &Ok(()));
                (matches!(err, ChipError::Internal(_)), stack.has_pending_command())
            })
            .await
            .unwrap();
        assert_eq!(rejected, (true, false));
    }
}
