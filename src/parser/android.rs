//! Parser for `logcat` excerpts carrying native stack frames.
//!
//! Only official release builds log a usable build version, and only
//! `libchromeview.so` has symbols on the crash server, so every other
//! frame is carried through as literal text. The version resolves to a
//! module list via the [`ModuleInfoService`] collaborator.

use std::sync::Arc;

use regex::Regex;

use crate::address::parse_address;
use crate::breakpad::SymbolTable;
use crate::error::Error;
use crate::parser::{ListedFrame, ListingParser, ModuleRequirements};
use crate::supplier::{Context, ModuleInfoService, ModuleKey};

const PRODUCT: &str = "Chrome_Android";
const CHROME_MODULE: &str = "libchromeview.so";

struct ScrapedFrame {
    module_path: String,
    address: u64,
    /// The inline symbol name in parentheses, when the log had one.
    symbol: String,
}

pub struct AndroidParser {
    ctx: Context,
    service: Arc<dyn ModuleInfoService>,
    /// A version supplied by the caller; supersedes anything scraped.
    version_override: Option<String>,
    listing: Option<ListingParser>,
    frame_re: Regex,
    version_dotted_re: Regex,
    version_plain_re: Regex,
}

impl AndroidParser {
    pub fn new(
        ctx: Context,
        service: Arc<dyn ModuleInfoService>,
        version_override: Option<String>,
    ) -> Self {
        // 0I/DEBUG   ( 2636):     #23  pc 0002b5ec  /system/lib/libdvm.so (dvmInterpret(Thread*, Method const*, JValue*)+184)
        let frame_re =
            Regex::new(r"(.*)#([0-9]+)[ \t]+(..)[ \t]+([0-9a-f]{8})[ \t]+([^\r\n \t]*)( \((.*)\))?")
                .unwrap();
        // W/google-breakpad(27887): 27.0.1453.105
        let version_dotted_re =
            Regex::new(r"google\-breakpad(?:\([0-9]+\))*: (([0-9]+\.)+[0-9]+)$").unwrap();
        // W/google-breakpad(27887): 1453106
        let version_plain_re =
            Regex::new(r"google\-breakpad(?:\([0-9]+\))*: (([0-9]+\.)*[0-9]+)$").unwrap();

        AndroidParser {
            ctx,
            service,
            version_override,
            listing: None,
            frame_re,
            version_dotted_re,
            version_plain_re,
        }
    }

    pub async fn ingest(&mut self, input: &str) -> Result<(), Error> {
        let mut dotted_version: Option<String> = None;
        let mut plain_version: Option<String> = None;
        let mut frames: Vec<ScrapedFrame> = Vec::new();

        for line in input.split('\n') {
            if let Some(caps) = self.version_dotted_re.captures(line) {
                dotted_version.get_or_insert_with(|| caps[1].to_string());
            } else if let Some(caps) = self.version_plain_re.captures(line) {
                plain_version.get_or_insert_with(|| caps[1].to_string());
            } else if let Some(caps) = self.frame_re.captures(line) {
                let number = &caps[2];
                if number.parse::<u64>().is_err() {
                    return Err(Error::Parse(format!(
                        "bad frame number {number:?} in line: {line}"
                    )));
                }
                let address = parse_address(&caps[4]).map_err(|e| Error::Parse(e.to_string()))?;
                frames.push(ScrapedFrame {
                    module_path: caps[5].to_string(),
                    address,
                    symbol: caps
                        .get(7)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                });
            }
        }

        let version = self
            .version_override
            .clone()
            .or(dotted_version)
            .or(plain_version)
            .ok_or_else(|| Error::Parse("no build version found in the log".into()))?;

        let chrome_module = self.resolve_chrome_module(&version).await?;

        let mut listing = ListingParser::new(Box::new(move |parser, _input| {
            for frame in frames {
                if frame.module_path.ends_with(CHROME_MODULE) {
                    parser.push_frame(
                        0,
                        ListedFrame {
                            raw_address: frame.address,
                            address: frame.address,
                            module: chrome_module.clone(),
                            placeholder: None,
                        },
                    );
                } else {
                    parser.push_frame(
                        0,
                        ListedFrame {
                            raw_address: frame.address,
                            address: frame.address,
                            placeholder: Some(format!("[{}] {}", frame.module_path, frame.symbol)),
                            ..Default::default()
                        },
                    );
                }
            }
            Ok(())
        }));
        listing.ingest("")?;
        self.listing = Some(listing);
        Ok(())
    }

    async fn resolve_chrome_module(&self, version: &str) -> Result<ModuleKey, Error> {
        let modules = self
            .service
            .modules_for_product(&self.ctx, PRODUCT, version)
            .await
            .map_err(Error::Service)?;
        if modules.is_empty() {
            return Err(Error::Service(anyhow::anyhow!(
                "no modules returned for {PRODUCT} {version}"
            )));
        }
        modules
            .into_iter()
            .find(|m| m.name == CHROME_MODULE)
            .ok_or_else(|| {
                Error::Service(anyhow::anyhow!(
                    "{CHROME_MODULE} missing from the {PRODUCT} {version} module list"
                ))
            })
    }

    pub fn render(self, tables: &[Arc<dyn SymbolTable>]) -> String {
        self.listing.map(|l| l.render(tables)).unwrap_or_default()
    }
}

impl ModuleRequirements for AndroidParser {
    fn required_modules(&self) -> Vec<ModuleKey> {
        let Some(listing) = &self.listing else {
            return Vec::new();
        };
        listing
            .required_modules()
            .into_iter()
            .filter(|m| !m.name.is_empty() && !m.ident.is_empty())
            .collect()
    }
}
