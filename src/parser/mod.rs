//! Crash-report parsers.
//!
//! Every input format runs through the same three phases: `ingest` raw text,
//! declare the modules whose symbol tables are needed, then `render` the
//! symbolized output against whichever of those tables resolved. Rendering
//! is total: a frame whose table or symbol is missing prints its raw address
//! instead.
//!
//! The formats are closed over by the [`Parser`] enum; the listing-style ones
//! (fragment, Android, crash-key) are built by composing a [`ListingParser`]
//! with a format-specific extraction closure.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::breakpad::SymbolTable;
use crate::error::Error;
use crate::supplier::{Context, ModuleKey, Supplier};

mod android;
mod apple;
mod crash_key;
mod fragment;
mod module_info;
mod stackwalk;

pub use android::AndroidParser;
pub use apple::AppleParser;
pub use crash_key::CrashKeyParser;
pub use module_info::ModuleInfoParser;
pub use stackwalk::StackwalkParser;

/// The module-declaration phase of the parser contract, shared by every
/// format. Callable only after a successful `ingest`.
pub trait ModuleRequirements {
    /// The modules whose symbol tables are needed to render. May be empty.
    fn required_modules(&self) -> Vec<ModuleKey>;

    /// Whether the host should intersect `required_modules` with what its
    /// supplier can serve before fetching. Set by parsers that over-report,
    /// such as Apple's full binary-image list.
    fn filter_modules(&self) -> bool {
        false
    }
}

/// A frame recorded by a [`ListingParser`].
///
/// A frame with a placeholder cannot be symbolized; the placeholder text is
/// printed verbatim in place of a function name.
#[derive(Clone, Debug, Default)]
pub struct ListedFrame {
    /// The address as it appeared in the input.
    pub raw_address: u64,
    /// The address relative to the module base, used for lookup.
    pub address: u64,
    pub module: ModuleKey,
    pub placeholder: Option<String>,
}

type ParseFn = Box<dyn FnOnce(&mut ListingParser, &str) -> Result<(), Error> + Send>;

/// Shared scaffold for parsers that extract a thread/frame list and emit a
/// canonical listing rather than rewriting their input.
///
/// The extraction itself is a closure supplied at construction; it calls
/// [`ListingParser::push_frame`] for each frame it finds. Frames for one
/// thread must arrive in stack order, threads in any order.
pub struct ListingParser {
    parse_fn: Option<ParseFn>,
    threads: BTreeMap<u32, Vec<ListedFrame>>,
    /// Modules referenced by at least one real frame, keyed by name.
    modules: HashMap<String, ModuleKey>,
}

impl ListingParser {
    pub fn new(parse_fn: ParseFn) -> Self {
        ListingParser {
            parse_fn: Some(parse_fn),
            threads: BTreeMap::new(),
            modules: HashMap::new(),
        }
    }

    pub fn push_frame(&mut self, thread: u32, frame: ListedFrame) {
        if frame.placeholder.is_none() && !self.modules.contains_key(&frame.module.name) {
            self.modules
                .insert(frame.module.name.clone(), frame.module.clone());
        }
        self.threads.entry(thread).or_default().push(frame);
    }

    pub fn ingest(&mut self, input: &str) -> Result<(), Error> {
        let parse_fn = self
            .parse_fn
            .take()
            .ok_or_else(|| Error::Parse("input already ingested".into()))?;
        parse_fn(self, input)
    }

    pub fn render(self, tables: &[Arc<dyn SymbolTable>]) -> String {
        let table_map: HashMap<&str, &Arc<dyn SymbolTable>> =
            tables.iter().map(|t| (t.module_name(), t)).collect();

        let show_thread_headers = self.threads.len() > 1;
        let mut out = String::new();
        for (thread, frames) in &self.threads {
            if show_thread_headers {
                let _ = writeln!(out, "Thread {thread}");
            }
            for frame in frames {
                let mut sep = "";
                let mut locator = String::new();
                let function = match &frame.placeholder {
                    Some(placeholder) => placeholder.clone(),
                    None => {
                        let symbol = table_map
                            .get(frame.module.name.as_str())
                            .and_then(|t| t.symbol_for_address(frame.address));
                        match symbol.as_ref().and_then(|s| s.file_line()) {
                            Some(file_line) => {
                                sep = "-";
                                locator = file_line;
                            }
                            None => {
                                sep = "+";
                                locator = format!("{:#x}", frame.address);
                            }
                        }
                        symbol.map(|s| s.function).unwrap_or_default()
                    }
                };
                let _ = writeln!(
                    out,
                    "0x{:08x} [{} {}\t {}] {}",
                    frame.raw_address, frame.module.name, sep, locator, function
                );
            }
        }
        out
    }
}

impl ModuleRequirements for ListingParser {
    fn required_modules(&self) -> Vec<ModuleKey> {
        self.modules.values().cloned().collect()
    }
}

/// One crash-report parser, tagged by input format.
///
/// `required_modules` and `render` may only be called after `ingest`
/// succeeded; `render` consumes the parser, so it runs at most once.
pub enum Parser {
    Apple(AppleParser),
    Stackwalk(StackwalkParser),
    Fragment(ListingParser),
    Android(AndroidParser),
    CrashKey(CrashKeyParser),
    ModuleInfo(ModuleInfoParser),
}

impl Parser {
    /// Apple crash, sample, and hang reports. Rewrites the report in place.
    pub fn apple() -> Self {
        Parser::Apple(AppleParser::new())
    }

    /// The machine format of `minidump_stackwalk -m`.
    pub fn stackwalk() -> Self {
        Parser::Stackwalk(StackwalkParser::new())
    }

    /// Whitespace-separated addresses against one known module loaded at
    /// `base_address`.
    pub fn fragment(module: ModuleKey, base_address: u64) -> Self {
        Parser::Fragment(fragment::listing(module, base_address))
    }

    /// A `logcat` excerpt with native frames. `version` overrides the build
    /// version scraped from the log.
    pub fn android(
        ctx: Context,
        service: Arc<dyn crate::ModuleInfoService>,
        version: Option<String>,
    ) -> Self {
        Parser::Android(AndroidParser::new(ctx, service, version))
    }

    /// Frames stored under a metadata key of an archived crash report.
    pub fn crash_key(
        ctx: Context,
        service: Arc<dyn crate::AnnotatedFrameService>,
        report_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Parser::CrashKey(CrashKeyParser::new(ctx, service, report_id, key))
    }

    /// The module list recorded for a product release.
    pub fn module_info(
        ctx: Context,
        service: Arc<dyn crate::ModuleInfoService>,
        product: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Parser::ModuleInfo(ModuleInfoParser::new(ctx, service, product, version))
    }

    /// Parse raw input into internal state. Suspends only for parsers that
    /// consult a collaborating service.
    pub async fn ingest(&mut self, input: &str) -> Result<(), Error> {
        match self {
            Parser::Apple(p) => p.ingest(input),
            Parser::Stackwalk(p) => p.ingest(input),
            Parser::Fragment(p) => p.ingest(input),
            Parser::Android(p) => p.ingest(input).await,
            Parser::CrashKey(p) => p.ingest(input).await,
            Parser::ModuleInfo(p) => p.ingest(input).await,
        }
    }

    pub fn required_modules(&self) -> Vec<ModuleKey> {
        match self {
            Parser::Apple(p) => p.required_modules(),
            Parser::Stackwalk(p) => p.required_modules(),
            Parser::Fragment(p) => p.required_modules(),
            Parser::Android(p) => p.required_modules(),
            Parser::CrashKey(p) => p.required_modules(),
            Parser::ModuleInfo(p) => p.required_modules(),
        }
    }

    pub fn filter_modules(&self) -> bool {
        match self {
            Parser::Apple(p) => p.filter_modules(),
            Parser::Stackwalk(p) => p.filter_modules(),
            Parser::Fragment(p) => p.filter_modules(),
            Parser::Android(p) => p.filter_modules(),
            Parser::CrashKey(p) => p.filter_modules(),
            Parser::ModuleInfo(p) => p.filter_modules(),
        }
    }

    /// Produce the symbolized output. Never fails: unresolved frames degrade
    /// to their raw addresses, and tables may be any subset of the ones
    /// declared by `required_modules`.
    pub fn render(self, tables: &[Arc<dyn SymbolTable>]) -> String {
        match self {
            Parser::Apple(p) => p.render(tables),
            Parser::Stackwalk(p) => p.render(tables),
            Parser::Fragment(p) => p.render(tables),
            Parser::Android(p) => p.render(tables),
            Parser::CrashKey(p) => p.render(tables),
            Parser::ModuleInfo(p) => p.render(tables),
        }
    }

    /// Run the whole request: ingest, declare modules, resolve each one
    /// through `supplier` in turn, render.
    ///
    /// A module the supplier cannot produce is logged and skipped; the
    /// affected frames degrade at render time. Hosts that cache tables or
    /// want different failure behavior drive the phases themselves instead.
    pub async fn symbolize(
        mut self,
        ctx: &Context,
        supplier: &dyn Supplier,
        input: &str,
    ) -> Result<String, Error> {
        self.ingest(input).await?;

        let mut required = self.required_modules();
        if self.filter_modules() {
            required = supplier.filter_available_modules(ctx, required);
        }

        let mut tables = Vec::with_capacity(required.len());
        for module in required {
            match supplier.table_for_module(ctx, &module).await {
                Ok(table) => tables.push(table),
                Err(e) => log::info!("no symbol table for {module}: {e:#}"),
            }
        }

        Ok(self.render(&tables))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::Arc;

    use crate::breakpad::{Symbol, SymbolTable};

    /// A symbol table with a fixed address map, for exercising renderers
    /// without symbol-file fixtures.
    pub struct FakeTable {
        pub name: String,
        pub symbols: HashMap<u64, Symbol>,
    }

    impl FakeTable {
        pub fn new(name: &str, symbols: &[(u64, &str, Option<(&str, u32)>)]) -> Arc<dyn SymbolTable> {
            Arc::new(FakeTable {
                name: name.to_string(),
                symbols: symbols
                    .iter()
                    .map(|(addr, function, file_line)| {
                        (
                            *addr,
                            Symbol {
                                function: function.to_string(),
                                file: file_line.map(|(file, _)| file.to_string()),
                                line: file_line.map(|(_, line)| line).unwrap_or_default(),
                            },
                        )
                    })
                    .collect(),
            })
        }
    }

    impl SymbolTable for FakeTable {
        fn module_name(&self) -> &str {
            &self.name
        }

        fn identifier(&self) -> &str {
            &self.name
        }

        fn symbol_for_address(&self, address: u64) -> Option<Symbol> {
            self.symbols.get(&address).cloned()
        }
    }
}
