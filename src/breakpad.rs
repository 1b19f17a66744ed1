//! Decoder for the Breakpad symbol-file text format produced by `dump_syms`,
//! and the symbol lookup it supports.
//!
//! The format is line oriented; the leading token of each line selects the
//! record kind. `STACK` and `INFO` records are skipped: unwind data plays no
//! part in symbolization.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::address::parse_address;
use crate::error::Error;

/// Lookup interface over one module's symbols.
///
/// Implementations must be immutable once constructed; lookups may run from
/// any number of threads at once.
pub trait SymbolTable: Send + Sync {
    /// The debug file name this table describes.
    fn module_name(&self) -> &str;

    /// The unique debug identifier of the module build.
    fn identifier(&self) -> &str;

    /// Resolve a program counter relative to the module's base address.
    /// Returns `None` when the address falls outside every known symbol.
    fn symbol_for_address(&self, address: u64) -> Option<Symbol>;
}

/// A resolved function name with optional source information.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Symbol {
    /// The function's name. Never empty.
    pub function: String,
    /// Source file path, when line records cover the address.
    pub file: Option<String>,
    /// 1-based source line. Meaningless unless `file` is set.
    pub line: u32,
}

impl Symbol {
    /// `basename(file):line`, or `None` when there is no file information.
    pub fn file_line(&self) -> Option<String> {
        self.file
            .as_ref()
            .map(|file| format!("{}:{}", basename(file), self.line))
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[derive(Debug)]
struct FuncRecord {
    address: u64,
    size: u64,
    name: String,
    /// LINE records as encountered, not sorted.
    lines: Vec<LineRecord>,
}

#[derive(Debug)]
struct LineRecord {
    address: u64,
    size: u64,
    line: u32,
    file: u32,
}

#[derive(Debug)]
struct PublicRecord {
    address: u64,
    name: String,
}

/// An in-memory Breakpad symbol file.
#[derive(Debug, Default)]
pub struct BreakpadSymbolTable {
    os: String,
    arch: String,
    ident: String,
    module: String,
    files: HashMap<u32, String>,
    /// FUNC records, sorted by address once parsing completes.
    funcs: Vec<FuncRecord>,
    /// PUBLIC records, likewise sorted.
    publics: Vec<PublicRecord>,
}

impl BreakpadSymbolTable {
    /// Decode symbol-file text. The text is not retained.
    pub fn parse(data: &str) -> Result<Self, Error> {
        let mut table = BreakpadSymbolTable::default();
        // Whether a LINE record may attach to `funcs.last()`. Any other
        // record kind in between breaks the association.
        let mut in_func = false;
        for line in data.lines() {
            let record = line.split(' ').next().unwrap_or_default();
            match record {
                "MODULE" => {
                    in_func = false;
                    table.parse_module(line)?;
                }
                "FILE" => {
                    in_func = false;
                    table.parse_file(line)?;
                }
                "FUNC" => {
                    table.parse_func(line)?;
                    in_func = true;
                }
                "PUBLIC" => {
                    in_func = false;
                    table.parse_public(line)?;
                }
                "STACK" | "INFO" => in_func = false,
                _ => {
                    if !in_func {
                        return Err(Error::MalformedSymbolFile(format!(
                            "unrecognized line {line:?}"
                        )));
                    }
                    table.parse_line_record(line)?;
                }
            }
        }

        table.funcs.sort_by_key(|f| f.address);
        table.publics.sort_by_key(|p| p.address);

        log::debug!(
            "decoded symbol file for {}: {} files, {} funcs, {} publics",
            table.module,
            table.files.len(),
            table.funcs.len(),
            table.publics.len()
        );
        Ok(table)
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn file(&self, number: u32) -> Option<&str> {
        self.files.get(&number).map(String::as_str)
    }

    fn parse_module(&mut self, line: &str) -> Result<(), Error> {
        if !self.ident.is_empty() {
            return Err(Error::MalformedSymbolFile(
                "more than one MODULE record".into(),
            ));
        }
        // The module name is the line remainder and may contain spaces.
        let tokens: Vec<&str> = line.splitn(5, ' ').collect();
        let [_, os, arch, ident, module] = tokens[..] else {
            return Err(Error::MalformedSymbolFile(
                "MODULE record with too few fields".into(),
            ));
        };
        self.os = os.to_string();
        self.arch = arch.to_string();
        self.ident = ident.to_string();
        self.module = module.to_string();
        Ok(())
    }

    fn parse_file(&mut self, line: &str) -> Result<(), Error> {
        let tokens: Vec<&str> = line.splitn(3, ' ').collect();
        let [_, number, path] = tokens[..] else {
            return Err(Error::MalformedSymbolFile(
                "FILE record with too few fields".into(),
            ));
        };
        let number = dec_field(number, "FILE number")?;
        if self.files.contains_key(&number) {
            return Err(Error::MalformedSymbolFile(format!(
                "duplicate FILE number {number}"
            )));
        }
        self.files.insert(number, path.to_string());
        Ok(())
    }

    fn parse_func(&mut self, line: &str) -> Result<(), Error> {
        let tokens: Vec<&str> = line.splitn(5, ' ').collect();
        let [_, address, size, _param_size, name] = tokens[..] else {
            return Err(Error::MalformedSymbolFile(
                "FUNC record with too few fields".into(),
            ));
        };
        self.funcs.push(FuncRecord {
            address: hex_field(address, "FUNC address")?,
            size: hex_field(size, "FUNC size")?,
            name: name.to_string(),
            lines: Vec::new(),
        });
        Ok(())
    }

    fn parse_public(&mut self, line: &str) -> Result<(), Error> {
        let tokens: Vec<&str> = line.splitn(4, ' ').collect();
        let [_, address, _param_size, name] = tokens[..] else {
            return Err(Error::MalformedSymbolFile(
                "PUBLIC record with too few fields".into(),
            ));
        };
        self.publics.push(PublicRecord {
            address: hex_field(address, "PUBLIC address")?,
            name: name.to_string(),
        });
        Ok(())
    }

    fn parse_line_record(&mut self, line: &str) -> Result<(), Error> {
        let tokens: Vec<&str> = line.splitn(4, ' ').collect();
        let [address, size, line_number, file] = tokens[..] else {
            return Err(Error::MalformedSymbolFile(
                "LINE record with too few fields".into(),
            ));
        };
        let record = LineRecord {
            address: hex_field(address, "LINE address")?,
            size: hex_field(size, "LINE size")?,
            line: dec_field(line_number, "LINE line")?,
            file: dec_field(file, "LINE file number")?,
        };
        match self.funcs.last_mut() {
            Some(func) => {
                func.lines.push(record);
                Ok(())
            }
            None => Err(Error::MalformedSymbolFile(
                "LINE record without a preceding FUNC".into(),
            )),
        }
    }
}

fn hex_field(value: &str, what: &str) -> Result<u64, Error> {
    parse_address(value).map_err(|_| Error::MalformedSymbolFile(format!("{what}: {value:?}")))
}

fn dec_field<T: FromStr>(value: &str, what: &str) -> Result<T, Error> {
    value
        .parse()
        .map_err(|_| Error::MalformedSymbolFile(format!("{what}: {value:?}")))
}

impl SymbolTable for BreakpadSymbolTable {
    fn module_name(&self) -> &str {
        &self.module
    }

    fn identifier(&self) -> &str {
        &self.ident
    }

    fn symbol_for_address(&self, address: u64) -> Option<Symbol> {
        // FUNC records carry exact extents, so they are consulted first.
        let idx = self.funcs.partition_point(|f| f.address <= address);
        if idx > 0 {
            let func = &self.funcs[idx - 1];
            if address - func.address < func.size {
                let mut symbol = Symbol {
                    function: func.name.clone(),
                    ..Default::default()
                };
                for line in &func.lines {
                    if address >= line.address && address - line.address < line.size {
                        symbol.file = self.files.get(&line.file).cloned();
                        symbol.line = line.line;
                        break;
                    }
                }
                return Some(symbol);
            }
        }

        // PUBLIC records have no size; the last one at or before the address
        // is the best available match.
        let idx = self.publics.partition_point(|p| p.address <= address);
        if idx > 0 {
            return Some(Symbol {
                function: self.publics[idx - 1].name.clone(),
                ..Default::default()
            });
        }

        None
    }
}

impl fmt::Display for BreakpadSymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ident.is_empty() {
            return write!(f, "unknown");
        }
        write!(
            f,
            "{} ({} {}) <{}>",
            self.module, self.os, self.arch, self.ident
        )
    }
}
