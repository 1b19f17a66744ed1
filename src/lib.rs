//! Symbolization for textual crash-report artifacts.
//!
//! This crate turns the raw instruction addresses found in hand-captured
//! crash dumps into function names, with file and line information where
//! the symbol data has it. It understands four kinds of input:
//!
//!  - Apple crash, sample, and hang reports (several report versions),
//!    which are rewritten in place,
//!  - the machine output of `minidump_stackwalk -m`,
//!  - `logcat` excerpts with native Android frames,
//!  - loose whitespace-separated address fragments,
//!
//! plus two service-backed inputs that list a product's modules or replay
//! frames stored under a crash-report metadata key.
//!
//! Symbol data comes from Breakpad symbol files, decoded by
//! [`BreakpadSymbolTable`]. Where that data lives is the host's business:
//! the core asks a [`Supplier`] for each module a parser declares and
//! renders with whatever tables come back. Frames whose module or symbol
//! cannot be resolved print their raw address; rendering never fails.
//!
//! A parser instance serves one request and is not shared. Decoded symbol
//! tables are immutable and may be cached and shared across requests freely.
//!
//! # Example
//!
//! A host implements [`Supplier`] over wherever its symbol files live; here
//! they are already in memory:
//!
//! ```
//! use std::sync::Arc;
//!
//! use futures_util::{future::BoxFuture, FutureExt};
//! use crash_report_symbolicate::{
//!     BreakpadSymbolTable, Context, ModuleKey, Parser, Supplier, SymbolTable,
//! };
//!
//! struct OneModuleSupplier(Arc<dyn SymbolTable>);
//!
//! impl Supplier for OneModuleSupplier {
//!     fn filter_available_modules(
//!         &self,
//!         _ctx: &Context,
//!         modules: Vec<ModuleKey>,
//!     ) -> Vec<ModuleKey> {
//!         modules
//!     }
//!
//!     fn table_for_module(
//!         &self,
//!         _ctx: &Context,
//!         module: &ModuleKey,
//!     ) -> BoxFuture<'static, anyhow::Result<Arc<dyn SymbolTable>>> {
//!         let table = self.0.clone();
//!         let found = module.name == table.module_name();
//!         async move {
//!             if found {
//!                 Ok(table)
//!             } else {
//!                 Err(anyhow::anyhow!("no symbols on file"))
//!             }
//!         }
//!         .boxed()
//!     }
//! }
//!
//! # futures_util::future::FutureExt::now_or_never(async {
//! let table = BreakpadSymbolTable::parse(
//!     "MODULE mac x86 73C5EC60C2EA7343C2495AB71C16B32B0 Demo\nPUBLIC 100 0 main\n",
//! )
//! .unwrap();
//! let supplier = OneModuleSupplier(Arc::new(table));
//!
//! let parser = Parser::fragment(
//!     ModuleKey::new("Demo", "73C5EC60C2EA7343C2495AB71C16B32B0"),
//!     0x1000,
//! );
//! let output = parser
//!     .symbolize(&Context::new(), &supplier, "0x1100")
//!     .await
//!     .unwrap();
//! assert_eq!(output, "0x00001100 [Demo +\t 0x100] main\n");
//! # }).unwrap();
//! ```

pub mod address;
pub mod breakpad;
mod error;
pub mod parser;
mod supplier;

pub use breakpad::{BreakpadSymbolTable, Symbol, SymbolTable};
pub use error::Error;
pub use parser::{
    AndroidParser, AppleParser, CrashKeyParser, ListedFrame, ListingParser, ModuleInfoParser,
    ModuleRequirements, Parser, StackwalkParser,
};
pub use supplier::{
    AnnotatedFrame, AnnotatedFrameService, Context, ModuleInfoService, ModuleKey, Supplier,
};
