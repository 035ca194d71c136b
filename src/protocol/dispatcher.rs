use crate::error::{ProtocolError, Result};
use crate::protocol::envelope::{Envelope, ProcedureId};
use crate::protocol::peer::NodeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type HandlerFn = dyn Fn(&NodeId, &Envelope) -> Result<Option<Envelope>> + Send + Sync + 'static;

/// Envelope dispatcher keyed by procedure id.
///
/// A handler may return a reply envelope, which the caller delivers back to
/// the sending peer.
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<ProcedureId, Box<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register<F>(&self, procedure: ProcedureId, handler: F) -> Result<()>
    where
        F: Fn(&NodeId, &Envelope) -> Result<Option<Envelope>> + Send + Sync + 'static,
    {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ProtocolError::LockPoisoned)?;

        handlers.insert(procedure, Box::new(handler));
        Ok(())
    }

    pub fn handles(&self, procedure: &ProcedureId) -> bool {
        self.handlers
            .read()
            .map(|handlers| handlers.contains_key(procedure))
            .unwrap_or(false)
    }

    pub fn dispatch(&self, from: &NodeId, envelope: &Envelope) -> Result<Option<Envelope>> {
        let procedure = envelope.procedure_id();

        let handlers = self
            .handlers
            .read()
            .map_err(|_| ProtocolError::LockPoisoned)?;

        handlers
            .get(&procedure)
            .ok_or_else(|| ProtocolError::UnexpectedMessage(format!("no handler for {procedure}")))
            .and_then(|handler| handler(from, envelope))
    }
}
