//! Process-scoped stack state living on the protocol thread.

use chipctl_core::{identity, ChipError, CommissionerIdentity, Result};
use serde_json::json;
use std::cell::{RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::attestation::{self, AttestationTrustStore};
use crate::attributes::{AttributeStore, InMemoryAttributeStore};
use crate::command::Command;
use crate::commissioner::{FactoryInitParams, SystemState};
use crate::factory::CommissionerFactory;
use crate::issuer::{CredentialIssuer, CredentialIssuerOption, ExampleCredentialIssuer};
use crate::options::{CommissionerOptions, StackOptions};
use crate::registry::IdentityRegistry;
use crate::runner::PendingCommand;
use crate::storage::{PersistentStorage, SharedStorage};
use crate::trace::TracingSetup;

/// Everything the protocol thread owns.
///
/// Built on the loop thread and never handed to another one.
pub struct StackContext {
    options: StackOptions,
    registry: IdentityRegistry,
    storage: Option<SharedStorage>,
    factory: CommissionerFactory,
    tracing: TracingSetup,
    attributes: InMemoryAttributeStore,
    pub(crate) deferred: Vec<Box<dyn Command>>,
    pub(crate) pending: Option<PendingCommand>,
    stack_up: bool,
}

impl StackContext {
    /// Stack using the example credential issuer
    #[must_use]
    pub fn new(options: StackOptions) -> Self {
        Self::with_issuer(options, Box::new(ExampleCredentialIssuer::default()))
    }

    /// Stack using a custom credential issuer
    #[must_use]
    pub fn with_issuer(options: StackOptions, issuer: Box<dyn CredentialIssuer>) -> Self {
        let registry = IdentityRegistry::new(options.storage_directory.as_deref());
        Self {
            options,
            registry,
            storage: None,
            factory: CommissionerFactory::new(issuer),
            tracing: TracingSetup::new(),
            attributes: InMemoryAttributeStore::new(),
            deferred: Vec::new(),
            pending: None,
            stack_up: false,
        }
    }

    /// Returns true between `set_up_stack` and `tear_down_stack`
    #[must_use]
    pub const fn is_up(&self) -> bool {
        self.stack_up
    }

    /// Options the stack was created with
    #[must_use]
    pub const fn options(&self) -> &StackOptions {
        &self.options
    }

    /// Bring the stack up. Does nothing if it is already up.
    ///
    /// Opens the fabric-independent storage, initializes group data and the
    /// controller factory, starts tracing, loads the attestation trust
    /// material and creates the null-fabric commissioner.
    ///
    /// A failed set-up is rolled back before the error is returned.
    pub fn set_up_stack(&mut self) -> Result<()> {
        if self.stack_up {
            return Ok(());
        }
        if let Err(e) = self.try_set_up() {
            if let Err(teardown) = self.tear_down_stack() {
                debug!(error = %teardown, "teardown after failed set-up");
            }
            return Err(e);
        }
        Ok(())
    }

    fn try_set_up(&mut self) -> Result<()> {
        let storage: SharedStorage = Rc::new(RefCell::new(PersistentStorage::open(
            self.options.storage_directory.as_deref(),
            None,
        )?));

        let group_data = self.factory.group_data_mut();
        group_data.set_storage_delegate(Rc::clone(&storage));
        group_data.init()?;

        let listen_port = storage.borrow().listen_port();
        self.factory.controller_mut().init(FactoryInitParams {
            listen_port,
            enable_server_interactions: false,
        })?;
        self.storage = Some(storage);

        let state = self.factory.controller().system_state();
        if state != SystemState::Ready {
            error!(?state, "controller factory did not come up");
            return Err(ChipError::Internal(format!(
                "controller factory is {state:?} after init"
            )));
        }

        for destination in &self.options.trace_to {
            self.tracing.enable_tracing_for(destination)?;
        }

        let trust_store = Arc::new(AttestationTrustStore::resolve(
            self.options.paa_trust_store_path.as_deref(),
        )?);
        let paa_count = trust_store.paa_count();
        self.factory.set_trust_store(trust_store);

        self.factory.ensure_commissioner(
            &mut self.registry,
            &CommissionerOptions::for_identity(identity::NULL_FABRIC),
        )?;

        let cd_certs =
            attestation::load_cd_verifying_certs(self.options.cd_trust_store_path.as_deref())?;
        let cd_count = cd_certs.len();
        let issuer = self.factory.issuer_mut();
        issuer.add_additional_cd_verifying_certs(cd_certs)?;
        issuer.set_option(
            CredentialIssuerOption::AllowTestCdSigningKey,
            !self.options.only_allow_trusted_cd_keys,
        );

        self.stack_up = true;
        info!(paa_count, cd_count, listen_port, "stack up");
        self.tracing.record(
            "stack_up",
            json!({ "paa_count": paa_count, "cd_count": cd_count, "listen_port": listen_port }),
        );
        Ok(())
    }

    /// Shut every commissioner down, stop the factory and tracing
    pub fn tear_down_stack(&mut self) -> Result<()> {
        let shut_down = self.factory.shutdown_all();
        if self.factory.controller().system_state() == SystemState::Ready {
            self.factory.controller_mut().shutdown();
        }
        self.tracing
            .record("teardown", json!({ "commissioners": shut_down }));
        let stopped = self.tracing.stop();
        self.stack_up = false;
        debug!(commissioners = shut_down, "stack torn down");
        stopped
    }

    /// Resolve options to a commissioner, creating it on first use
    pub fn ensure_commissioner(
        &mut self,
        options: &CommissionerOptions,
    ) -> Result<CommissionerIdentity> {
        self.factory.ensure_commissioner(&mut self.registry, options)
    }

    /// Shut one commissioner down and close its storage namespace
    pub fn remove_identity(&mut self, key: &CommissionerIdentity) -> bool {
        let removed = self.factory.remove_identity(key);
        if removed
            && !self
                .factory
                .commissioners()
                .any(|(other, _)| other.name == key.name)
        {
            self.registry.forget(&key.name);
        }
        removed
    }

    /// Run and drop every deferred cleanup, returning how many ran
    pub fn execute_deferred_cleanups(&mut self) -> usize {
        let deferred = std::mem::take(&mut self.deferred);
        let count = deferred.len();
        for mut command in deferred {
            debug!(command = command.name(), "running deferred cleanup");
            command.cleanup(self);
        }
        count
    }

    /// Commands whose cleanup is deferred
    #[must_use]
    pub fn deferred_cleanup_count(&self) -> usize {
        self.deferred.len()
    }

    /// Returns true while a dispatched command is in flight
    #[must_use]
    pub const fn has_pending_command(&self) -> bool {
        self.pending.is_some()
    }

    /// Report the exit status of the pending command
    pub fn set_command_exit_status(&self, status: Result<()>) -> bool {
        match &self.pending {
            Some(pending) => pending.completion.complete(status),
            None => {
                debug!("exit status reported with no pending command");
                false
            }
        }
    }

    /// Commissioner factory
    #[must_use]
    pub const fn factory(&self) -> &CommissionerFactory {
        &self.factory
    }

    /// Commissioner factory, mutably
    pub fn factory_mut(&mut self) -> &mut CommissionerFactory {
        &mut self.factory
    }

    /// Identity registry
    pub fn registry_mut(&mut self) -> &mut IdentityRegistry {
        &mut self.registry
    }

    /// Fabric-independent storage; only available while the stack is up
    pub fn storage(&self) -> Result<RefMut<'_, PersistentStorage>> {
        self.storage
            .as_ref()
            .map(|s| s.borrow_mut())
            .ok_or_else(|| ChipError::Internal("stack storage is not open".into()))
    }

    /// Attribute store
    #[must_use]
    pub fn attributes(&self) -> &dyn AttributeStore {
        &self.attributes
    }

    /// Attribute store, mutably
    pub fn attributes_mut(&mut self) -> &mut dyn AttributeStore {
        &mut self.attributes
    }

    /// Trace sinks
    pub fn tracing_mut(&mut self) -> &mut TracingSetup {
        &mut self.tracing
    }
}
