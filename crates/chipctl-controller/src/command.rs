//! The unit of work the runner dispatches onto the protocol loop.

use chipctl_core::{ChipError, CommissionerIdentity, Result};
use std::cell::RefMut;
use std::time::Duration;

use crate::attributes::AttributeStore;
use crate::commissioner::Commissioner;
use crate::event_loop::LoopHandle;
use crate::options::CommissionerOptions;
use crate::registry::IdentityRegistry;
use crate::runner::CommandCompletion;
use crate::stack::StackContext;
use crate::storage::PersistentStorage;

/// Wait applied when a command does not choose its own
pub const DEFAULT_WAIT_DURATION: Duration = Duration::from_secs(10);

/// A command body and its lifecycle hooks.
///
/// `run` executes on the protocol loop. A command with a non-zero wait
/// duration that returns `Ok` is still in flight until it reports its exit
/// status through [`CommandContext::set_command_exit_status`] or a clone of
/// [`CommandContext::completion`].
pub trait Command: Send {
    /// Name used in logs and traces
    fn name(&self) -> &str;

    /// Command body
    fn run(&mut self, ctx: &mut CommandContext<'_>) -> Result<()>;

    /// How long the runner waits for completion; zero runs synchronously
    fn wait_duration(&self) -> Duration {
        DEFAULT_WAIT_DURATION
    }

    /// Keep the command alive after it finishes in interactive mode
    fn defer_interactive_cleanup(&self) -> bool {
        false
    }

    /// Called on the loop once the command finished or timed out
    fn shutdown(&mut self) {}

    /// Release whatever the command still holds, on the loop
    fn cleanup(&mut self, _stack: &mut StackContext) {}

    /// Commissioner the command runs against
    fn commissioner_options(&self) -> CommissionerOptions {
        CommissionerOptions::default()
    }
}

/// What a running command can reach on the protocol loop
pub struct CommandContext<'a> {
    stack: &'a mut StackContext,
    handle: &'a LoopHandle,
    identity: CommissionerIdentity,
    completion: CommandCompletion,
}

impl<'a> CommandContext<'a> {
    pub(crate) fn new(
        stack: &'a mut StackContext,
        handle: &'a LoopHandle,
        identity: CommissionerIdentity,
        completion: CommandCompletion,
    ) -> Self {
        Self {
            stack,
            handle,
            identity,
            completion,
        }
    }

    /// Key of the commissioner selected by the command's options
    #[must_use]
    pub const fn identity(&self) -> &CommissionerIdentity {
        &self.identity
    }

    /// Commissioner selected by the command's options
    pub fn current_commissioner(&self) -> Result<&Commissioner> {
        self.stack.factory().get(&self.identity).ok_or_else(|| {
            ChipError::Internal(format!("commissioner {} is no longer live", self.identity))
        })
    }

    /// Commissioner for other options, created on first use
    pub fn commissioner_for(&mut self, options: &CommissionerOptions) -> Result<&Commissioner> {
        let key = self.stack.ensure_commissioner(options)?;
        self.stack
            .factory()
            .get(&key)
            .ok_or_else(|| ChipError::Internal(format!("commissioner {key} vanished")))
    }

    /// Every live commissioner in key order
    pub fn commissioners(&self) -> impl Iterator<Item = (&CommissionerIdentity, &Commissioner)> {
        self.stack.factory().commissioners()
    }

    /// Attribute store
    pub fn attributes(&mut self) -> &mut dyn AttributeStore {
        self.stack.attributes_mut()
    }

    /// Fabric-independent storage namespace
    pub fn storage(&self) -> Result<RefMut<'_, PersistentStorage>> {
        self.stack.storage()
    }

    /// Identity registry
    pub fn registry(&mut self) -> &mut IdentityRegistry {
        self.stack.registry_mut()
    }

    /// Loop handle, for timers and follow-up work
    #[must_use]
    pub const fn handle(&self) -> &LoopHandle {
        self.handle
    }

    /// Completion of this command, to signal from later work items
    #[must_use]
    pub fn completion(&self) -> CommandCompletion {
        self.completion.clone()
    }

    /// Report the command's exit status; only the first report counts
    pub fn set_command_exit_status(&self, status: Result<()>) -> bool {
        self.completion.complete(status)
    }

    /// Record a trace event
    pub fn trace(&mut self, event: &str, fields: serde_json::Value) {
        self.stack.tracing_mut().record(event, fields);
    }
}
