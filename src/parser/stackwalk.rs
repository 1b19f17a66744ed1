//! Parser for the machine-readable output of `minidump_stackwalk -m`:
//! pipe-delimited records, with a single blank line dividing the Crash and
//! Module header section from the frame rows.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::address::parse_address;
use crate::breakpad::SymbolTable;
use crate::error::Error;
use crate::parser::ModuleRequirements;
use crate::supplier::ModuleKey;

// Minimum field counts for the record shapes we consume.
const CRASH_FIELDS: usize = 4;
const MODULE_FIELDS: usize = 8;
const FRAME_FIELDS: usize = 7;

struct CrashRecord {
    /// `<exception name> @ <exception address>`, as printed in the thread
    /// header of the crashed thread.
    info: String,
    thread: u32,
}

struct Frame {
    /// Empty for frames the stackwalker could not attribute to a module.
    module: String,
    address: u64,
}

#[derive(Default)]
pub struct StackwalkParser {
    /// Module name to identifier, from the header's Module records.
    modules: HashMap<String, String>,
    /// Module names actually referenced by a frame.
    used_modules: HashSet<String>,
    crash: Option<CrashRecord>,
    threads: BTreeMap<u32, Vec<Frame>>,
}

impl StackwalkParser {
    pub fn new() -> Self {
        StackwalkParser::default()
    }

    pub fn ingest(&mut self, input: &str) -> Result<(), Error> {
        let mut in_frames = false;
        for line in input.lines() {
            if line.is_empty() {
                if in_frames {
                    return Err(Error::Parse(
                        "unexpected blank line inside the frame section".into(),
                    ));
                }
                in_frames = true;
                continue;
            }

            let fields: Vec<&str> = line.split('|').collect();
            if in_frames {
                self.parse_frame(&fields, line)?;
            } else {
                match fields[0] {
                    "Crash" => self.parse_crash(&fields, line)?,
                    "Module" => self.parse_module(&fields, line)?,
                    // OS, CPU, and any future header records.
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn parse_crash(&mut self, fields: &[&str], line: &str) -> Result<(), Error> {
        if fields.len() < CRASH_FIELDS {
            return Err(field_count_error("crash record", CRASH_FIELDS, fields.len(), line));
        }
        self.crash = Some(CrashRecord {
            info: format!("{} @ {}", fields[1], fields[2]),
            thread: numeric_field(fields[3], "crashed thread id", line)?,
        });
        Ok(())
    }

    fn parse_module(&mut self, fields: &[&str], line: &str) -> Result<(), Error> {
        if fields.len() < MODULE_FIELDS {
            return Err(field_count_error("module record", MODULE_FIELDS, fields.len(), line));
        }
        self.modules
            .insert(fields[1].to_string(), fields[4].to_string());
        Ok(())
    }

    fn parse_frame(&mut self, fields: &[&str], line: &str) -> Result<(), Error> {
        if fields.len() < FRAME_FIELDS {
            return Err(field_count_error("stack frame", FRAME_FIELDS, fields.len(), line));
        }
        let thread = numeric_field(fields[0], "thread id", line)?;
        let address = parse_address(fields[6])
            .map_err(|e| Error::Parse(format!("{e} in stack frame {line:?}")))?;
        let module = fields[2].to_string();
        if !module.is_empty() {
            self.used_modules.insert(module.clone());
        }
        self.threads
            .entry(thread)
            .or_default()
            .push(Frame { module, address });
        Ok(())
    }

    pub fn render(self, tables: &[Arc<dyn SymbolTable>]) -> String {
        let table_map: HashMap<&str, &Arc<dyn SymbolTable>> =
            tables.iter().map(|t| (t.module_name(), t)).collect();

        let mut out = String::new();
        let mut first = true;
        for (thread, frames) in &self.threads {
            if !first {
                out.push('\n');
            }
            first = false;

            let _ = write!(out, "Thread {thread}");
            if let Some(crash) = &self.crash {
                if crash.thread == *thread {
                    let _ = write!(out, " ( * CRASHED * {} )", crash.info);
                }
            }
            out.push('\n');

            for (i, frame) in frames.iter().enumerate() {
                let symbol = table_map
                    .get(frame.module.as_str())
                    .and_then(|t| t.symbol_for_address(frame.address));
                match symbol {
                    Some(symbol) => {
                        let locator = symbol
                            .file_line()
                            .unwrap_or_else(|| format!("{:#x}", frame.address));
                        let _ = writeln!(
                            out,
                            "{i}\t [{}\t -\t {locator}] {}",
                            frame.module, symbol.function
                        );
                    }
                    None => {
                        let _ = writeln!(out, "{i}\t [{}\t +\t {:#x}]", frame.module, frame.address);
                    }
                }
            }
        }
        out
    }
}

impl ModuleRequirements for StackwalkParser {
    fn required_modules(&self) -> Vec<ModuleKey> {
        self.used_modules
            .iter()
            .map(|name| ModuleKey {
                name: name.clone(),
                ident: self.modules.get(name).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

fn field_count_error(kind: &str, expected: usize, actual: usize, line: &str) -> Error {
    Error::Parse(format!(
        "wrong number of fields for a {kind}, expected {expected}, got {actual}: {line:?}"
    ))
}

fn numeric_field(value: &str, what: &str, line: &str) -> Result<u32, Error> {
    value
        .parse()
        .map_err(|_| Error::Parse(format!("bad {what} {value:?} in {line:?}")))
}
