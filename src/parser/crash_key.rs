//! Adapter over [`AnnotatedFrameService`]: symbolizes the stack stored under
//! one metadata key of an archived crash report. The raw input text plays no
//! part; the frames arrive from the service already annotated with their
//! modules.

use std::sync::Arc;

use crate::breakpad::SymbolTable;
use crate::error::Error;
use crate::parser::{ListedFrame, ListingParser, ModuleRequirements};
use crate::supplier::{AnnotatedFrameService, Context, ModuleKey};

pub struct CrashKeyParser {
    ctx: Context,
    service: Arc<dyn AnnotatedFrameService>,
    report_id: String,
    key: String,
    listing: Option<ListingParser>,
}

impl CrashKeyParser {
    pub fn new(
        ctx: Context,
        service: Arc<dyn AnnotatedFrameService>,
        report_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        CrashKeyParser {
            ctx,
            service,
            report_id: report_id.into(),
            key: key.into(),
            listing: None,
        }
    }

    pub async fn ingest(&mut self, _input: &str) -> Result<(), Error> {
        let frames = self
            .service
            .annotated_frames(&self.ctx, &self.report_id, &self.key)
            .await
            .map_err(Error::Service)?;

        let mut listing = ListingParser::new(Box::new(move |parser, _input| {
            for frame in frames {
                parser.push_frame(
                    0,
                    ListedFrame {
                        raw_address: frame.address,
                        address: frame.address,
                        module: frame.module,
                        placeholder: None,
                    },
                );
            }
            Ok(())
        }));
        listing.ingest("")?;
        self.listing = Some(listing);
        Ok(())
    }

    pub fn render(self, tables: &[Arc<dyn SymbolTable>]) -> String {
        self.listing.map(|l| l.render(tables)).unwrap_or_default()
    }
}

impl ModuleRequirements for CrashKeyParser {
    fn required_modules(&self) -> Vec<ModuleKey> {
        self.listing
            .as_ref()
            .map(|l| l.required_modules())
            .unwrap_or_default()
    }
}
