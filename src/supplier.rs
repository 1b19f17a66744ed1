//! Interfaces to the collaborators that feed the symbolization core:
//! a supplier of decoded symbol tables plus two report-metadata services.
//! Hosts implement these against whatever storage or RPC backend they have;
//! the core only ever awaits them, one request at a time.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering::Relaxed};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::breakpad::SymbolTable;

/// Identifies one build of one module: the debug file name together with
/// its 33-character Breakpad identifier. Two keys with the same identifier
/// denote the same build.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ModuleKey {
    pub name: String,
    pub ident: String,
}

impl ModuleKey {
    pub fn new(name: impl Into<String>, ident: impl Into<String>) -> Self {
        ModuleKey {
            name: name.into(),
            ident: ident.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ident, self.name)
    }
}

/// A stack frame that already knows which module it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnnotatedFrame {
    pub address: u64,
    pub module: ModuleKey,
}

/// Opaque per-request state handed to every collaborator call.
///
/// The core never inspects it. Hosts set the cancellation flag from wherever
/// they detect an abandoned request, and their service implementations poll
/// it to cut work short.
#[derive(Clone, Debug, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    cancelled: AtomicBool,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Relaxed)
    }
}

/// Resolves module keys to decoded symbol tables.
pub trait Supplier: Send + Sync {
    /// Narrow `modules` to those this supplier can actually serve. Suppliers
    /// without that knowledge return the input unchanged.
    fn filter_available_modules(&self, ctx: &Context, modules: Vec<ModuleKey>) -> Vec<ModuleKey>;

    /// Asynchronously resolve one module to its symbol table.
    fn table_for_module(
        &self,
        ctx: &Context,
        module: &ModuleKey,
    ) -> BoxFuture<'static, anyhow::Result<Arc<dyn SymbolTable>>>;
}

/// Produces pre-extracted, module-annotated frames for a metadata key of a
/// stored crash report.
pub trait AnnotatedFrameService: Send + Sync {
    fn annotated_frames(
        &self,
        ctx: &Context,
        report_id: &str,
        key: &str,
    ) -> BoxFuture<'static, anyhow::Result<Vec<AnnotatedFrame>>>;
}

/// Looks up the module list recorded for a product release.
pub trait ModuleInfoService: Send + Sync {
    fn modules_for_product(
        &self,
        ctx: &Context,
        product: &str,
        version: &str,
    ) -> BoxFuture<'static, anyhow::Result<Vec<ModuleKey>>>;
}
