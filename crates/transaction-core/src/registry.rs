//! The transaction table.
//!
//! A single mutex over a `HashMap` keyed by [`TransactionKey`]; the critical
//! sections cover only map operations. Delivering an event to a transaction
//! happens after the lock is released, so a slow transaction never stalls
//! the dispatcher.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use siprelay_sip_core::{Method, SipMessage};
use siprelay_sip_transport::Transport;

use crate::error::Result;
use crate::key::TransactionKey;
use crate::timer::TimerSettings;
use crate::transaction::{
    ClientInviteTransaction, ClientNonInviteTransaction, ServerInviteTransaction,
    ServerNonInviteTransaction, TransactionCallbacks, TransactionHandle,
};

/// Creates transactions, spawns their tasks and routes later messages to
/// them. Entries are removed from the termination callback, exactly once per
/// transaction.
pub struct TransactionRegistry {
    settings: TimerSettings,
    transactions: Mutex<HashMap<TransactionKey, TransactionHandle>>,
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self::with_settings(TimerSettings::default())
    }

    pub fn with_settings(settings: TimerSettings) -> Self {
        TransactionRegistry {
            settings,
            transactions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a server transaction for an inbound request: IST for INVITE,
    /// NIST otherwise. The handle is registered before the task runs, so a
    /// retransmission arriving immediately after still finds it.
    pub fn server_transaction(
        &self,
        request: SipMessage,
        transport: Arc<dyn Transport>,
        callbacks: TransactionCallbacks,
    ) -> Result<TransactionHandle> {
        let id = TransactionKey::for_server(&request)?;
        debug!(id = %id, "starting server transaction");

        if request.method() == Some(&Method::Invite) {
            let (transaction, handle) = ServerInviteTransaction::new(
                id,
                request,
                transport,
                callbacks,
                self.settings.clone(),
            )?;
            self.register(handle.clone());
            tokio::spawn(transaction.run());
            Ok(handle)
        } else {
            let (transaction, handle) = ServerNonInviteTransaction::new(
                id,
                request,
                transport,
                callbacks,
                self.settings.clone(),
            )?;
            self.register(handle.clone());
            tokio::spawn(transaction.run());
            Ok(handle)
        }
    }

    /// Starts a client transaction for an outbound request: ICT for INVITE,
    /// NICT otherwise. The request's topmost Via must already carry the
    /// branch this element chose.
    pub fn client_transaction(
        &self,
        request: SipMessage,
        transport: Arc<dyn Transport>,
        callbacks: TransactionCallbacks,
    ) -> Result<TransactionHandle> {
        let id = TransactionKey::for_client(&request)?;
        debug!(id = %id, "starting client transaction");

        if request.method() == Some(&Method::Invite) {
            let (transaction, handle) = ClientInviteTransaction::new(
                id,
                request,
                transport,
                callbacks,
                self.settings.clone(),
            )?;
            self.register(handle.clone());
            tokio::spawn(transaction.run());
            Ok(handle)
        } else {
            let (transaction, handle) = ClientNonInviteTransaction::new(
                id,
                request,
                transport,
                callbacks,
                self.settings.clone(),
            )?;
            self.register(handle.clone());
            tokio::spawn(transaction.run());
            Ok(handle)
        }
    }

    /// Single concurrent-safe lookup; the handle is cloned out so the lock
    /// is gone before anyone sends on it.
    pub fn find(&self, id: &TransactionKey) -> Option<TransactionHandle> {
        self.transactions
            .lock()
            .expect("transaction table lock poisoned")
            .get(id)
            .cloned()
    }

    /// Removes a mapping; called from termination callbacks.
    pub fn remove(&self, id: &TransactionKey) {
        let removed = self
            .transactions
            .lock()
            .expect("transaction table lock poisoned")
            .remove(id);
        if removed.is_some() {
            debug!(id = %id, "removed transaction");
        }
    }

    pub fn len(&self) -> usize {
        self.transactions
            .lock()
            .expect("transaction table lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn register(&self, handle: TransactionHandle) {
        let previous = self
            .transactions
            .lock()
            .expect("transaction table lock poisoned")
            .insert(handle.id().clone(), handle);
        if let Some(previous) = previous {
            // Branches are required to be unique; colliding ones mean a
            // misbehaving peer. The newer transaction wins.
            warn!(id = %previous.id(), "replaced transaction with duplicate key");
        }
    }
}
