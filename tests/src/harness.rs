//! Per-thread wiring of a database connection and a mediation context.

use std::rc::Rc;
use std::sync::Arc;

use keystone_mediator::{MediationConfig, MediationContext, TypeRegistry};
use keystone_store::{Connection, Database};
use tracing_subscriber::EnvFilter;

/// Install a test-friendly subscriber once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One thread's view of a database: its connection and its context, with
/// the connection acting as the context's unit of work.
pub struct Harness {
    pub db: Arc<Database>,
    pub conn: Rc<Connection>,
    pub ctx: MediationContext,
}

impl Harness {
    pub fn new(db: &Arc<Database>, types: &Arc<TypeRegistry>) -> Self {
        Self::with_config(db, types, MediationConfig::default())
    }

    pub fn with_config(db: &Arc<Database>, types: &Arc<TypeRegistry>, config: MediationConfig) -> Self {
        init_tracing();
        let conn = Rc::new(db.connect());
        let ctx = MediationContext::new(Arc::clone(types))
            .with_config(config)
            .with_unit_of_work(conn.clone());
        Self {
            db: Arc::clone(db),
            conn,
            ctx,
        }
    }

    /// A fresh database with `types` registered.
    pub fn fresh(types: &Arc<TypeRegistry>) -> Self {
        Self::new(&Database::new(), types)
    }
}
