use crate::{
    db::{
        cascade::{CascadeError, CascadeResolver},
        flush::{self, FlushError, FlushReport},
        instance::{EntityInstance, LocalId},
        pending::PendingSet,
        query::{
            FindOptions, Predicate, QueryError,
            execute::{self, QueryExecutor},
        },
        registry::{EntityRegistry, RegistryError},
        store::{MemoryStore, StoragePort},
    },
    error::{EngineError, ErrorClass, ErrorOrigin},
    obs::sink::{self, ExecKind, MetricsEvent, MetricsSink, with_metrics_sink},
    value::{RecordRef, Value},
};
use std::{
    cell::Cell,
    fmt,
    marker::PhantomData,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error as ThisError;

///
/// Driver
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Driver {
    /// In-process memory engine.
    Memory,
    /// Declared network engine; no such engine ships with this crate, so
    /// `open` rejects it instead of deferring the failure to the first
    /// flush.
    Network { host: String, port: u16 },
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Network { host, port } => write!(f, "network({host}:{port})"),
        }
    }
}

///
/// ConnectionConfig
///

#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    pub db_name: String,
    pub driver: Driver,
    /// Drop any existing rows at open.
    pub refresh: bool,
    /// Enable per-call execution traces on the session.
    pub debug: bool,
}

impl ConnectionConfig {
    /// Config for an in-memory database.
    #[must_use]
    pub fn memory(db_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            driver: Driver::Memory,
            refresh: false,
            debug: false,
        }
    }

    #[must_use]
    pub const fn refresh(mut self) -> Self {
        self.refresh = true;
        self
    }

    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
        self
    }
}

///
/// ConnectionError
/// Non-retriable locally; surfaced to the caller as-is.
///

#[derive(Debug, ThisError)]
pub enum ConnectionError {
    #[error("unsupported driver: {driver}")]
    UnsupportedDriver { driver: String },

    #[error("database name must not be empty")]
    InvalidConfig,

    #[error(transparent)]
    Schema(#[from] RegistryError),
}

impl ConnectionError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::UnsupportedDriver { .. } => ErrorClass::Unsupported,
            Self::InvalidConfig => ErrorClass::InvariantViolation,
            Self::Schema(err) => err.class(),
        }
    }
}

impl From<ConnectionError> for EngineError {
    fn from(err: ConnectionError) -> Self {
        Self::new(err.class(), ErrorOrigin::Session, err.to_string())
    }
}

///
/// PersistError
///

#[derive(Debug, ThisError)]
pub enum PersistError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Cascade(#[from] CascadeError),

    #[error("session is closed")]
    Closed,
}

impl From<PersistError> for EngineError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Registry(err) => err.into(),
            PersistError::Cascade(err) => err.into(),
            PersistError::Closed => closed_error(),
        }
    }
}

///
/// CloseError
///

#[derive(Debug, ThisError)]
pub enum CloseError {
    #[error("{count} pending instances would be discarded")]
    PendingRemain { count: usize },
}

fn closed_error() -> EngineError {
    EngineError::new(
        ErrorClass::Unsupported,
        ErrorOrigin::Session,
        "session is closed",
    )
}

///
/// Session
///
/// The boundary API: open, persist, flush, find, close. One session serves
/// one logical thread of control; the pending set is not guarded, so
/// concurrent callers must serialize access externally. The `Cell` marker
/// keeps the type `!Sync` to make that explicit.
///

pub struct Session<P: StoragePort = MemoryStore> {
    registry: Arc<EntityRegistry>,
    port: P,
    pending: PendingSet,
    debug: bool,
    metrics: Option<&'static dyn MetricsSink>,
    closed: bool,
    _confined: PhantomData<Cell<()>>,
}

impl<P: StoragePort> fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("pending", &self.pending.len())
            .field("debug", &self.debug)
            .field("metrics", &self.metrics.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Session<MemoryStore> {
    /// Open a session over the in-memory engine.
    pub fn open(
        registry: Arc<EntityRegistry>,
        config: ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        if config.driver != Driver::Memory {
            return Err(ConnectionError::UnsupportedDriver {
                driver: config.driver.to_string(),
            });
        }
        if config.db_name.is_empty() {
            return Err(ConnectionError::InvalidConfig);
        }

        let mut session = Self::with_port(registry, MemoryStore::new())?;
        if config.refresh {
            session.port.clear();
        }
        session.debug = config.debug;

        Ok(session)
    }
}

impl<P: StoragePort> Session<P> {
    /// Open a session over a caller-provided storage engine.
    pub fn with_port(registry: Arc<EntityRegistry>, port: P) -> Result<Self, ConnectionError> {
        registry.validate_relations()?;

        Ok(Self {
            registry,
            port,
            pending: PendingSet::new(),
            debug: false,
            metrics: None,
            closed: false,
            _confined: PhantomData,
        })
    }

    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    #[must_use]
    pub const fn metrics_sink(mut self, sink: &'static dyn MetricsSink) -> Self {
        self.metrics = Some(sink);
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        if self.debug {
            eprintln!("[loam] {args}");
        }
    }

    // ---------------------------------------------------------------------
    // Unit of work
    // ---------------------------------------------------------------------

    /// Register an instance (and its cascade-owned graph) for the next
    /// flush. Idempotent per instance; no storage side effect.
    pub fn persist(&mut self, instance: EntityInstance) -> Result<LocalId, PersistError> {
        if self.closed {
            return Err(PersistError::Closed);
        }

        let model = instance.model();
        self.registry.describe(model.entity_name)?;
        let root_id = instance.local_id();

        let pending = &mut self.pending;
        let run = || {
            sink::record(MetricsEvent::ExecStart {
                kind: ExecKind::Persist,
                entity: model.entity_name,
            });

            let expanded = CascadeResolver::new().expand(instance)?;
            let children = expanded.len().saturating_sub(1) as u64;
            if children > 0 {
                sink::record(MetricsEvent::CascadeExpanded {
                    entity: model.entity_name,
                    children,
                });
            }

            let mut inserted = 0u64;
            for item in expanded {
                if pending.insert(item) {
                    inserted += 1;
                }
            }

            sink::record(MetricsEvent::ExecFinish {
                kind: ExecKind::Persist,
                entity: model.entity_name,
                rows_touched: inserted,
            });

            Ok::<_, CascadeError>(())
        };
        match self.metrics {
            Some(sink) => with_metrics_sink(sink, run),
            None => run(),
        }?;

        self.trace(format_args!(
            "persist {} pending={}",
            model.entity_name,
            self.pending.len()
        ));

        Ok(root_id)
    }

    /// Remove one pending instance without writing it.
    pub fn detach(&mut self, local_id: LocalId) -> Option<EntityInstance> {
        self.pending.detach(local_id)
    }

    /// Write every pending instance in one atomic batch.
    pub fn flush(&mut self) -> Result<FlushReport, FlushError> {
        self.flush_inner(None)
    }

    /// Flush with a deadline; on expiry no partial write is visible.
    pub fn flush_within(&mut self, timeout: Duration) -> Result<FlushReport, FlushError> {
        self.flush_inner(Some(Instant::now() + timeout))
    }

    fn flush_inner(&mut self, deadline: Option<Instant>) -> Result<FlushReport, FlushError> {
        if self.closed {
            return Err(closed_error().into());
        }

        let pending = &mut self.pending;
        let port = &mut self.port;
        let first_entity = pending.first().map(|instance| instance.model().entity_name);
        let mut run = || {
            if let Some(entity) = first_entity {
                sink::record(MetricsEvent::ExecStart {
                    kind: ExecKind::Flush,
                    entity,
                });
            }

            let result = flush::execute(port, pending, deadline);
            if let Ok(report) = &result {
                for (entity, written) in &report.rows_by_entity {
                    sink::record(MetricsEvent::ExecFinish {
                        kind: ExecKind::Flush,
                        entity,
                        rows_touched: *written,
                    });
                }
            }

            result
        };
        let result = match self.metrics {
            Some(sink) => with_metrics_sink(sink, run),
            None => run(),
        };

        match &result {
            Ok(report) => {
                self.trace(format_args!("flush wrote {} rows", report.rows_written));
            }
            Err(err) => self.trace(format_args!("flush failed: {err}")),
        }

        result
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Find matching roots of one entity kind, with optional eager loads.
    pub fn find(
        &self,
        kind: &str,
        predicate: &Predicate,
        options: &FindOptions,
    ) -> Result<Vec<EntityInstance>, QueryError> {
        if self.closed {
            return Err(QueryError::Execute {
                source: closed_error(),
            });
        }

        let model = self.registry.describe(kind)?;
        let prepared = execute::prepare(&self.registry, model, predicate, options)?;

        let registry = &self.registry;
        let port = &self.port;
        let run = || {
            sink::record(MetricsEvent::ExecStart {
                kind: ExecKind::Find,
                entity: model.entity_name,
            });
            let matched = QueryExecutor::new(registry, port).execute(&prepared)?;
            sink::record(MetricsEvent::ExecFinish {
                kind: ExecKind::Find,
                entity: model.entity_name,
                rows_touched: matched.len() as u64,
            });

            Ok::<_, EngineError>(matched)
        };
        let matched = match self.metrics {
            Some(sink) => with_metrics_sink(sink, run),
            None => run(),
        }?;

        self.trace(format_args!("find {kind} matched {} roots", matched.len()));

        Ok(matched)
    }

    /// Re-evaluate a derived projection on read.
    ///
    /// The projected value mirrors a field of the instance's owner and is
    /// never stored, so there is no copy to drift out of sync. An absent or
    /// unresolvable owner projects to null.
    pub fn resolve_projection(
        &self,
        instance: &EntityInstance,
        name: &str,
    ) -> Result<Value, QueryError> {
        let model = instance.model();
        let Some(projection) = model.projection(name) else {
            return Err(QueryError::UnknownProjection {
                entity: model.entity_name.to_string(),
                projection: name.to_string(),
            });
        };
        let Some(relation) = model.relation(projection.relation) else {
            return Err(QueryError::Execute {
                source: EngineError::query_invariant(format!(
                    "projection '{name}' references relation '{}' missing from the model",
                    projection.relation
                )),
            });
        };

        match instance.get(relation.fk_field) {
            Some(Value::Ref(RecordRef::Persisted(id))) => {
                match self.port.get(relation.target, *id) {
                    Ok(owner) => Ok(owner
                        .fields
                        .get(projection.source_field)
                        .cloned()
                        .unwrap_or(Value::Null)),
                    Err(err) if err.is_not_found() => Ok(Value::Null),
                    Err(err) => Err(err.into()),
                }
            }
            Some(Value::Ref(RecordRef::Local(local_id))) => Ok(self
                .pending
                .find(*local_id)
                .and_then(|owner| owner.get(projection.source_field).cloned())
                .unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Close the session. A non-forced close refuses to discard pending
    /// instances; `force` drops them.
    pub fn close(&mut self, force: bool) -> Result<(), CloseError> {
        if !force && !self.pending.is_empty() {
            return Err(CloseError::PendingRemain {
                count: self.pending.len(),
            });
        }

        self.pending.clear();
        self.closed = true;
        self.trace(format_args!("session closed (force={force})"));

        Ok(())
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}
