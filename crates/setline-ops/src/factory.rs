//! Session sources for resource operations.
//!
//! Every operation opens a fresh session and closes it before returning;
//! factories never pool or reuse sessions.

use std::sync::Arc;

use setline_session::{
    ClearObserver, ConfigSession, DeviceFacts, DryRunSession, LineSink, OperationContext, Session,
    SessionError, SshTransportConfig, TracingClearObserver,
};

/// Opens one session per operation.
pub trait SessionFactory: Send + Sync {
    /// Opens a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connection`] when the device is unreachable.
    fn open(&self, ctx: &OperationContext) -> Result<Box<dyn ConfigSession>, SessionError>;
}

impl<F> SessionFactory for F
where
    F: Fn(&OperationContext) -> Result<Box<dyn ConfigSession>, SessionError> + Send + Sync,
{
    fn open(&self, ctx: &OperationContext) -> Result<Box<dyn ConfigSession>, SessionError> {
        self(ctx)
    }
}

/// Opens live sessions through the ssh subsystem.
pub struct SshSessionFactory {
    config: SshTransportConfig,
    observer: Arc<dyn ClearObserver>,
}

impl SshSessionFactory {
    /// Creates a factory for the configured device.
    #[must_use]
    pub fn new(config: SshTransportConfig) -> Self {
        Self {
            config,
            observer: Arc::new(TracingClearObserver),
        }
    }

    /// Routes clear failures of every session to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ClearObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl SessionFactory for SshSessionFactory {
    fn open(&self, ctx: &OperationContext) -> Result<Box<dyn ConfigSession>, SessionError> {
        let session = Session::connect(&self.config, ctx)?.with_observer(Arc::clone(&self.observer));
        Ok(Box::new(session))
    }
}

/// Opens dry-run sessions sharing one sink.
pub struct DryRunSessionFactory<K> {
    sink: K,
    facts: Option<DeviceFacts>,
}

impl<K: LineSink + Clone + Sync + 'static> DryRunSessionFactory<K> {
    /// Creates a factory writing to clones of `sink`.
    #[must_use]
    pub const fn new(sink: K) -> Self {
        Self { sink, facts: None }
    }

    /// Reports `facts` to capability checks instead of placeholders.
    #[must_use]
    pub fn with_facts(mut self, facts: DeviceFacts) -> Self {
        self.facts = Some(facts);
        self
    }
}

impl<K: LineSink + Clone + Sync + 'static> SessionFactory for DryRunSessionFactory<K> {
    fn open(&self, ctx: &OperationContext) -> Result<Box<dyn ConfigSession>, SessionError> {
        ctx.check()?;
        let sink = Box::new(self.sink.clone());
        let session = match &self.facts {
            Some(facts) => DryRunSession::with_facts(sink, facts.clone()),
            None => DryRunSession::new(sink),
        };
        Ok(Box::new(session))
    }
}
