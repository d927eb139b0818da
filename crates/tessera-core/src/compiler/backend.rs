//! Process-wide native code backend.
//!
//! A [`Backend`] is the configured host ISA every compilation unit generates
//! code for. Creating one probes the CPU, so the engine shares a single
//! instance: [`global`] initializes it at most once (concurrent first calls
//! are safe) and [`shutdown`] releases it at process exit. Tests and embedders
//! that want isolation create their own with [`Backend::host`] and inject it
//! into [`CodegenContext::new`](super::CodegenContext::new).

use std::fmt;
use std::sync::{Arc, Once};

use cranelift_codegen::isa::{OwnedTargetIsa, TargetIsa};
use cranelift_codegen::settings::{self, Configurable};
use parking_lot::Mutex;

use super::error::BackendError;

/// The host ISA shared by compilation units.
pub struct Backend {
    isa: OwnedTargetIsa,
}

impl Backend {
    /// Detects the host CPU and builds an ISA for it.
    ///
    /// Backend optimization is disabled: the compilation pipeline runs its
    /// own pass sequence before handing functions to the module.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Init`] if the host is not a supported target or
    /// the ISA flags are rejected.
    pub fn host() -> Result<Arc<Self>, BackendError> {
        let mut flag_builder = settings::builder();
        flag_builder
            .set("opt_level", "none")
            .map_err(|e| BackendError::Init(format!("opt_level: {e}")))?;
        let isa_builder =
            cranelift_native::builder().map_err(|e| BackendError::Init(format!("host ISA: {e}")))?;
        let isa = isa_builder
            .finish(settings::Flags::new(flag_builder))
            .map_err(|e| BackendError::Init(format!("ISA flags: {e}")))?;
        tracing::debug!(triple = %isa.triple(), "native backend initialized");
        Ok(Arc::new(Self { isa }))
    }

    /// Returns the target ISA.
    pub fn isa(&self) -> &dyn TargetIsa {
        &*self.isa
    }

    pub(crate) fn owned_isa(&self) -> OwnedTargetIsa {
        Arc::clone(&self.isa)
    }

    /// Returns the target triple, e.g. `x86_64-unknown-linux-gnu`.
    pub fn triple(&self) -> String {
        self.isa.triple().to_string()
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("triple", &self.triple())
            .finish_non_exhaustive()
    }
}

enum Slot {
    Empty,
    Ready(Arc<Backend>),
    Failed(String),
    Released,
}

static INIT: Once = Once::new();
static GLOBAL: Mutex<Slot> = parking_lot::const_mutex(Slot::Empty);

/// Returns the process-wide backend, creating it on first use.
///
/// # Errors
///
/// Returns [`BackendError::Init`] if creation failed (the failure is sticky)
/// or [`BackendError::ShutDown`] after [`shutdown`].
pub fn global() -> Result<Arc<Backend>, BackendError> {
    INIT.call_once(|| {
        let mut slot = GLOBAL.lock();
        if matches!(*slot, Slot::Empty) {
            *slot = match Backend::host() {
                Ok(backend) => Slot::Ready(backend),
                Err(e) => {
                    tracing::error!(error = %e, "native backend initialization failed");
                    Slot::Failed(e.to_string())
                }
            };
        }
    });
    match &*GLOBAL.lock() {
        Slot::Ready(backend) => Ok(Arc::clone(backend)),
        Slot::Failed(reason) => Err(BackendError::Init(reason.clone())),
        Slot::Released => Err(BackendError::ShutDown),
        Slot::Empty => Err(BackendError::Init("backend not initialized".into())),
    }
}

/// Releases the process-wide backend.
///
/// Contexts already holding the backend keep it alive until they are dropped;
/// later calls to [`global`] fail.
///
/// # Errors
///
/// Returns [`BackendError::AlreadyShutDown`] on the second and later calls.
pub fn shutdown() -> Result<(), BackendError> {
    let mut slot = GLOBAL.lock();
    match std::mem::replace(&mut *slot, Slot::Released) {
        Slot::Released => Err(BackendError::AlreadyShutDown),
        Slot::Ready(backend) => {
            let holders = Arc::strong_count(&backend) - 1;
            if holders > 0 {
                tracing::warn!(holders, "native backend shut down while contexts are alive");
            }
            Ok(())
        }
        Slot::Empty | Slot::Failed(_) => Ok(()),
    }
}
