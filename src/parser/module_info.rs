//! Adapter over [`ModuleInfoService`]: lists the modules recorded for a
//! product release, one tab-aligned line per module. Needs no symbol tables
//! at all.

use std::sync::Arc;

use crate::breakpad::SymbolTable;
use crate::error::Error;
use crate::parser::ModuleRequirements;
use crate::supplier::{Context, ModuleInfoService, ModuleKey};

pub struct ModuleInfoParser {
    ctx: Context,
    service: Arc<dyn ModuleInfoService>,
    product: String,
    version: String,
    modules: Vec<ModuleKey>,
}

impl ModuleInfoParser {
    pub fn new(
        ctx: Context,
        service: Arc<dyn ModuleInfoService>,
        product: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        ModuleInfoParser {
            ctx,
            service,
            product: product.into(),
            version: version.into(),
            modules: Vec::new(),
        }
    }

    pub async fn ingest(&mut self, _input: &str) -> Result<(), Error> {
        self.modules = self
            .service
            .modules_for_product(&self.ctx, &self.product, &self.version)
            .await
            .map_err(Error::Service)?;
        Ok(())
    }

    pub fn render(self, _tables: &[Arc<dyn SymbolTable>]) -> String {
        self.modules
            .iter()
            .map(|m| format!("\"{}\"\t\t{}", m.name, m.ident))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ModuleRequirements for ModuleInfoParser {
    fn required_modules(&self) -> Vec<ModuleKey> {
        Vec::new()
    }
}
