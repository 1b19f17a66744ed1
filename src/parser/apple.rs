//! Parser for Apple crash, sample, and hang reports.
//!
//! Unlike the listing parsers, this one preserves the report: symbolization
//! rewrites matched spans of each line and leaves everything else byte for
//! byte as it arrived. The `Report Version:` header selects which line
//! pattern applies and whether frames name modules by bundle ID or by the
//! binary's file name.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::address::{breakpad_uuid, parse_address};
use crate::breakpad::SymbolTable;
use crate::error::Error;
use crate::parser::ModuleRequirements;
use crate::supplier::ModuleKey;

const REPORT_VERSION: &str = "Report Version:";
const BINARY_IMAGES: &str = "Binary Images:";
const SAMPLE_ANALYSIS: &str = "Sample analysis of process";

/// How a dialect's frame lines refer to modules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ModuleNaming {
    /// Reverse-DNS bundle ID, e.g. `com.google.Chrome.framework`.
    BundleId,
    /// The binary's file name, e.g. `Google Chrome Framework`.
    BreakpadName,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dialect {
    /// Report versions 6, 9, 10, 11.
    Crash,
    /// Report version 7 (10.7 sample/hang).
    HangV7,
    /// Report version 18 (10.9 sample).
    HangV18,
}

impl Dialect {
    fn module_naming(self) -> ModuleNaming {
        match self {
            Dialect::Crash => ModuleNaming::BundleId,
            Dialect::HangV7 | Dialect::HangV18 => ModuleNaming::BreakpadName,
        }
    }
}

/// One entry of the `Binary Images:` section.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BinaryImage {
    base_address: u64,
    bundle_name: String,
    raw_ident: String,
    image_path: String,
}

impl BinaryImage {
    fn breakpad_name(&self) -> &str {
        self.image_path.rsplit('/').next().unwrap_or(&self.image_path)
    }

    fn breakpad_uuid(&self) -> String {
        breakpad_uuid(&self.raw_ident)
    }
}

type Span = (usize, usize);

/// Byte spans of the rewritable parts of one frame line.
struct FrameSpans {
    address: Span,
    module: Span,
    function: Span,
    file_line: Span,
}

pub struct AppleParser {
    dialect: Option<Dialect>,
    /// Binary images keyed by bundle name. Duplicates keep the last entry.
    images: HashMap<String, BinaryImage>,
    lines: Vec<String>,
    binary_image_re: Regex,
    crash_frame_re: Regex,
    hang_v7_re: Regex,
    hang_v18_re: Regex,
}

impl AppleParser {
    pub fn new() -> Self {
        // Binary image entries look like:
        // 0x520ce000 - 0x520ceff7 +com.google.Chrome.canary 17.0.959.0 (959.0) <8BC87704-1B47-6F0C-70DE-17F7A99A1E45> /Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary
        let binary_image_re = Regex::new(
            r"\s*0x([0-9a-fA-F]+)\s*-\s*0x[0-9a-fA-F]+\s+\+?([A-Za-z0-9_\-+.]+) [^<]* <([0-9a-fA-F\-]+)> (.*)",
        )
        .unwrap();

        // 4   com.google.Chrome.framework		0x528b225b ChromeMain + 8239323
        let crash_frame_re =
            Regex::new(r"(\d+[ ]+([^\s]+)\s+0x([0-9a-fA-F]+)) ((.*) \+ (.*))").unwrap();

        // |    +                           ! 2207 RunCurrentEventLoopInMode  (in HIToolbox) + 318  [0x9b9a5723]|
        // |   +         1411 ???  (in Google Chrome Framework)  load address 0xbe000 + 0x5de5eb  [0x69c5eb]|
        let hang_v7_re = Regex::new(concat!(
            r"\s+\+?\s+([!:|+]\s+)*\d+\s+(.*)  ",
            r"\(in ([^)]*)\)",
            r"(  load address 0x[0-9a-fA-F]+ \+ 0x[0-9a-fA-F]+| \+ \d+)  ",
            r"\[(0x[0-9a-fA-F]+)\]",
        ))
        .unwrap();

        // |    43 ??? (Google Chrome Framework + 8050864) [0x8248b0]|
        let hang_v18_re =
            Regex::new(r"\s+\d+ ((.+)( \+ \d+)?) \((.+) \+ \d+\) \[(0x[0-9a-fA-F]+)\]").unwrap();

        AppleParser {
            dialect: None,
            images: HashMap::new(),
            lines: Vec::new(),
            binary_image_re,
            crash_frame_re,
            hang_v7_re,
            hang_v18_re,
        }
    }

    pub fn ingest(&mut self, input: &str) -> Result<(), Error> {
        let lines: Vec<String> = input.split('\n').map(str::to_owned).collect();

        let mut version: Option<u32> = None;
        for (i, line) in lines.iter().enumerate() {
            if line.starts_with(REPORT_VERSION) {
                let mut parts = line.split(':');
                parts.next();
                let value = parts.next().unwrap_or_default();
                if parts.next().is_some() {
                    return Err(Error::Parse(format!("malformed {REPORT_VERSION} line")));
                }
                version = Some(value.trim().parse().map_err(|e| {
                    Error::Parse(format!("malformed {REPORT_VERSION} value: {e}"))
                })?);
                continue;
            }

            if line.ends_with(BINARY_IMAGES) {
                self.parse_binary_images(&lines[i + 1..])?;
            }
        }

        self.dialect = Some(match version.unwrap_or_default() {
            6 | 9 | 10 | 11 => Dialect::Crash,
            7 => Dialect::HangV7,
            18 => Dialect::HangV18,
            other => return Err(Error::UnknownReportVersion(other)),
        });
        self.lines = lines;
        Ok(())
    }

    /// The section runs until a blank line, a `Sample analysis` trailer, or
    /// the end of the report.
    fn parse_binary_images(&mut self, lines: &[String]) -> Result<(), Error> {
        self.images = HashMap::new();
        for line in lines {
            if line.is_empty() || line.starts_with(SAMPLE_ANALYSIS) {
                break;
            }
            let caps = self
                .binary_image_re
                .captures(line)
                .ok_or_else(|| Error::Parse(format!("invalid binary image: {line}")))?;
            let base_address = parse_address(&caps[1])
                .map_err(|e| Error::Parse(format!("binary image base address: {e}")))?;
            let image = BinaryImage {
                base_address,
                bundle_name: caps[2].to_string(),
                raw_ident: caps[3].to_string(),
                image_path: caps[4].to_string(),
            };
            self.images.insert(image.bundle_name.clone(), image);
        }
        Ok(())
    }

    fn frame_spans(&self, dialect: Dialect, line: &str) -> Option<FrameSpans> {
        let span = |m: &regex::Captures<'_>, i: usize| m.get(i).map(|g| (g.start(), g.end()));
        match dialect {
            Dialect::Crash => {
                let caps = self.crash_frame_re.captures(line)?;
                Some(FrameSpans {
                    module: span(&caps, 2)?,
                    address: span(&caps, 3)?,
                    function: span(&caps, 5)?,
                    file_line: span(&caps, 6)?,
                })
            }
            Dialect::HangV7 => {
                let caps = self.hang_v7_re.captures(line)?;
                Some(FrameSpans {
                    function: span(&caps, 2)?,
                    module: span(&caps, 3)?,
                    address: span(&caps, 5)?,
                    file_line: span(&caps, 5)?,
                })
            }
            Dialect::HangV18 => {
                let caps = self.hang_v18_re.captures(line)?;
                Some(FrameSpans {
                    function: span(&caps, 2)?,
                    module: span(&caps, 4)?,
                    address: span(&caps, 5)?,
                    file_line: span(&caps, 5)?,
                })
            }
        }
    }

    pub fn render(mut self, tables: &[Arc<dyn SymbolTable>]) -> String {
        let mut lines = std::mem::take(&mut self.lines);
        let Some(dialect) = self.dialect else {
            return lines.join("\n");
        };

        let table_map: HashMap<&str, &Arc<dyn SymbolTable>> =
            tables.iter().map(|t| (t.module_name(), t)).collect();

        // Frame lines of the hang dialects carry the binary's file name
        // rather than its bundle ID.
        let by_breakpad_name: HashMap<&str, &BinaryImage> =
            match dialect.module_naming() {
                ModuleNaming::BreakpadName => self
                    .images
                    .values()
                    .map(|image| (image.breakpad_name(), image))
                    .collect(),
                ModuleNaming::BundleId => HashMap::new(),
            };

        for line in &mut lines {
            let Some(spans) = self.frame_spans(dialect, line) else {
                continue;
            };

            let Ok(absolute) = parse_address(&line[spans.address.0..spans.address.1]) else {
                continue;
            };

            let module_name = &line[spans.module.0..spans.module.1];
            let image = match dialect.module_naming() {
                ModuleNaming::BundleId => self.images.get(module_name),
                ModuleNaming::BreakpadName => by_breakpad_name.get(module_name).copied(),
            };
            let Some(image) = image else { continue };

            let Some(table) = table_map.get(image.breakpad_name()) else {
                continue;
            };
            let Some(symbol) =
                table.symbol_for_address(absolute.wrapping_sub(image.base_address))
            else {
                continue;
            };

            // Apply in decreasing start order so earlier spans stay valid.
            // The stable sort keeps the file/line splice after the function
            // splice when their spans coincide, so it wins the region.
            let file_line = symbol.file_line().unwrap_or_default();
            let mut splices = [
                (spans.function, symbol.function),
                (spans.file_line, file_line),
            ];
            splices.sort_by(|a, b| b.0 .0.cmp(&a.0 .0));
            for ((start, end), value) in splices {
                splice(line, start, end, &value);
            }
        }

        lines.join("\n")
    }
}

/// Replace `line[start..end]` with `value`, refusing splices that no longer
/// fit the line (possible only when earlier splices overlapped this one).
fn splice(line: &mut String, start: usize, end: usize, value: &str) {
    if start > end
        || end > line.len()
        || !line.is_char_boundary(start)
        || !line.is_char_boundary(end)
    {
        return;
    }
    line.replace_range(start..end, value);
}

impl Default for AppleParser {
    fn default() -> Self {
        AppleParser::new()
    }
}

impl ModuleRequirements for AppleParser {
    /// Every image in the report, whether or not any frame references it.
    fn required_modules(&self) -> Vec<ModuleKey> {
        self.images
            .values()
            .map(|image| ModuleKey::new(image.breakpad_name(), image.breakpad_uuid()))
            .collect()
    }

    fn filter_modules(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::parser::testing::FakeTable;

    fn ingested(input: &str) -> AppleParser {
        let mut parser = AppleParser::new();
        parser.ingest(input).unwrap();
        parser
    }

    #[test]
    fn report_version_values() {
        let cases = [
            ("6", true),
            ("7", true),
            ("9", true),
            ("10", true),
            ("11", true),
            ("18", true),
            ("0x8", false),
            ("foo", false),
        ];
        for (version, accepted) in cases {
            let mut parser = AppleParser::new();
            let result = parser.ingest(&format!("Report Version:     {version}"));
            assert_eq!(result.is_ok(), accepted, "version {version:?}");
            if !accepted {
                assert!(matches!(result, Err(Error::Parse(_))));
            }
        }

        let mut parser = AppleParser::new();
        assert!(matches!(
            parser.ingest("Report Version: 8"),
            Err(Error::UnknownReportVersion(8))
        ));
        let mut parser = AppleParser::new();
        assert!(matches!(
            parser.ingest("no version header at all"),
            Err(Error::UnknownReportVersion(0))
        ));
    }

    const CRASH_V9: &str = "\
Process:         Google Chrome [79194]
Identifier:      com.google.Chrome
Report Version:  9

Thread 0 Crashed:
0   com.google.Chrome.framework   0x528b225b ChromeMain + 8239323
1   com.google.Chrome             0x0004a8a5 main + 24
2   libSystem.B.dylib             0x90001234 start + 54

Binary Images:
 0x4a000 -  0x4afff +com.google.Chrome 20.0.1132.42 (1132.42) <cf4d75d8804d775084d363a5cbbf7702> /Applications/Google Chrome.app/Contents/MacOS/Google Chrome
0x528b0000 - 0x530f1fff +com.google.Chrome.framework 20.0.1132.42 (1132.42) <26A6C8D5-C994-73CA-195E-55656E111C97> /Applications/Google Chrome.app/Contents/Versions/20.0.1132.42/Google Chrome Framework.framework/Google Chrome Framework
";

    #[test]
    fn binary_images_are_extracted() {
        let parser = ingested(CRASH_V9);
        let chrome = &parser.images["com.google.Chrome"];
        assert_eq!(chrome.base_address, 0x4a000);
        assert_eq!(chrome.breakpad_name(), "Google Chrome");
        assert_eq!(chrome.breakpad_uuid(), "CF4D75D8804D775084D363A5CBBF77020");

        let framework = &parser.images["com.google.Chrome.framework"];
        assert_eq!(framework.base_address, 0x528b0000);
        assert_eq!(framework.breakpad_name(), "Google Chrome Framework");
        assert_eq!(
            framework.breakpad_uuid(),
            "26A6C8D5C99473CA195E55656E111C970"
        );
    }

    #[test]
    fn required_modules_list_every_image() {
        let parser = ingested(CRASH_V9);
        assert!(parser.filter_modules());
        let mut required = parser.required_modules();
        required.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            required,
            vec![
                ModuleKey::new("Google Chrome", "CF4D75D8804D775084D363A5CBBF77020"),
                ModuleKey::new(
                    "Google Chrome Framework",
                    "26A6C8D5C99473CA195E55656E111C970"
                ),
            ]
        );
    }

    #[test]
    fn invalid_binary_image_is_fatal() {
        let report = "\
Report Version:  9

Binary Images:
this is not an image line
";
        let mut parser = AppleParser::new();
        assert!(matches!(parser.ingest(report), Err(Error::Parse(_))));
    }

    #[test]
    fn crash_frames_rewrite_in_place() {
        let parser = ingested(CRASH_V9);
        let tables = vec![FakeTable::new(
            "Google Chrome Framework",
            &[(0x225b, "ChromeMain()", Some(("chrome/app/chrome_main.cc", 30)))],
        )];
        let output = parser.render(&tables);

        // The matched frame is rewritten; everything else is untouched.
        assert!(output.contains(
            "0   com.google.Chrome.framework   0x528b225b ChromeMain() + chrome_main.cc:30"
        ));
        assert!(output.contains("1   com.google.Chrome             0x0004a8a5 main + 24"));
        assert!(output.contains("2   libSystem.B.dylib             0x90001234 start + 54"));
        assert!(output.contains("Process:         Google Chrome [79194]"));
        assert!(output.contains("<cf4d75d8804d775084d363a5cbbf7702>"));
    }

    #[test]
    fn symbol_without_file_blanks_the_offset() {
        let parser = ingested(CRASH_V9);
        let tables = vec![FakeTable::new(
            "Google Chrome Framework",
            &[(0x225b, "ChromeMain()", None)],
        )];
        let output = parser.render(&tables);
        assert!(output.contains("0x528b225b ChromeMain() + \n"));
    }

    #[test]
    fn miss_leaves_report_identical() {
        let parser = ingested(CRASH_V9);
        let output = parser.render(&[]);
        assert_eq!(output, CRASH_V9);
    }

    const HANG_V18: &str = "\
Date/Time:       2013-10-20 17:33:12 -0700
Report Version:  18

    43 ??? (Google Chrome Framework + 149643) [0x8248b0]
    18 ??? (libsystem_kernel.dylib + 70130) [0x9d0011f2]

Binary Images:
  0x800000 -   0xbfffff  com.google.Chrome.framework 20.0.1132.42 (1132.42) <26A6C8D5-C994-73CA-195E-55656E111C97> /Applications/Google Chrome.app/Contents/Versions/20.0.1132.42/Google Chrome Framework.framework/Google Chrome Framework
0x9d000000 - 0x9d1fffff  libsystem_kernel.dylib 2050.18.24 (2050.18.24) <C0535565-35D1-31A7-A744-63D9F10F12A4> /usr/lib/system/libsystem_kernel.dylib
";

    #[test]
    fn v18_hang_frames_rewrite_function_and_address() {
        let parser = ingested(HANG_V18);
        let tables = vec![FakeTable::new(
            "Google Chrome Framework",
            &[(0x248b0, "ChromeMain()", Some(("chrome/app/chrome_main.cc", 30)))],
        )];
        let output = parser.render(&tables);
        assert!(
            output.contains("    43 ChromeMain() (Google Chrome Framework + 149643) [chrome_main.cc:30]"),
            "unexpected output: {output}"
        );
        // No table for the kernel library: untouched.
        assert!(output.contains("    18 ??? (libsystem_kernel.dylib + 70130) [0x9d0011f2]"));
    }

    const HANG_V7: &str = "\
Report Version:  7

        1069       ChromeMain  (in Google Chrome Framework) + 0  [0x93780]
   +         1411 ???  (in Google Chrome Framework)  load address 0x90000 + 0x5de5eb  [0x69c5eb]

Binary Images:
   0x90000 -   0xbffff  com.google.Chrome.framework 20.0.1132.42 (1132.42) <26A6C8D5-C994-73CA-195E-55656E111C97> /Applications/Google Chrome.app/Contents/Versions/20.0.1132.42/Google Chrome Framework.framework/Google Chrome Framework
";

    #[test]
    fn v7_hang_frames_rewrite_function_and_address() {
        let parser = ingested(HANG_V7);
        let tables = vec![FakeTable::new(
            "Google Chrome Framework",
            &[(0x3780, "ChromeMain()", Some(("chrome/app/chrome_main.cc", 30)))],
        )];
        let output = parser.render(&tables);
        assert!(
            output.contains("        1069       ChromeMain()  (in Google Chrome Framework) + 0  [chrome_main.cc:30]"),
            "unexpected output: {output}"
        );
    }

    #[test]
    fn v7_tree_marker_frames_match() {
        let report = "\
Report Version:  7

    +                           ! 2207 RunCurrentEventLoopInMode  (in HIToolbox) + 318  [0x9b9a5723]

Binary Images:
0x9b900000 - 0x9bbfffff  com.apple.HIToolbox 1.9 (1.9) <C0535565-35D1-31A7-A744-63D9F10F12A4> /System/Library/Frameworks/Carbon.framework/Frameworks/HIToolbox.framework/HIToolbox
";
        let parser = ingested(report);
        let tables = vec![FakeTable::new(
            "HIToolbox",
            &[(0xa5723, "RunLoop()", Some(("toolbox/run_loop.cc", 12)))],
        )];
        let output = parser.render(&tables);
        assert!(
            output.contains(
                "    +                           ! 2207 RunLoop()  (in HIToolbox) + 318  [run_loop.cc:12]"
            ),
            "unexpected output: {output}"
        );
    }

    #[test]
    fn v10_and_v11_use_the_crash_dialect() {
        for version in [6, 10, 11] {
            let report = format!(
                "Report Version:  {version}\n\
                 \n\
                 0   com.example.App               0x00001010 DoWork + 16\n\
                 \n\
                 Binary Images:\n\
                 0x1000 - 0x1fff +com.example.App 1.0 (1) <11111111111111111111111111111111> /Applications/App.app/Contents/MacOS/App\n"
            );
            let mut parser = AppleParser::new();
            parser.ingest(&report).unwrap();
            let tables = vec![FakeTable::new("App", &[(0x10, "DoWork()", None)])];
            let output = parser.render(&tables);
            assert!(
                output.contains("0x00001010 DoWork() + "),
                "version {version}: {output}"
            );
        }
    }

    #[test]
    fn splices_in_reverse_order_keep_unrelated_text() {
        let mut line = String::from("0  module  0xabc  OldName + 1234");
        let name_span = line.find("OldName").unwrap();
        let offset_span = line.find("1234").unwrap();
        // Later span first, so the earlier one stays valid.
        splice(&mut line, offset_span, offset_span + 4, "file.cc:9");
        splice(&mut line, name_span, name_span + "OldName".len(), "NewName()");
        assert_eq!(line, "0  module  0xabc  NewName() + file.cc:9");
    }

    #[test]
    fn splice_refuses_out_of_range_spans() {
        let mut line = String::from("short");
        splice(&mut line, 2, 99, "x");
        assert_eq!(line, "short");
    }

    #[test]
    fn duplicate_bundle_names_keep_the_last_image() {
        let report = "\
Report Version:  9

Binary Images:
0x1000 - 0x1fff +com.example.App 1.0 (1) <11111111111111111111111111111111> /old/App
0x2000 - 0x2fff +com.example.App 1.0 (1) <22222222222222222222222222222222> /new/App
";
        let parser = ingested(report);
        assert_eq!(parser.images["com.example.App"].base_address, 0x2000);
    }

    #[test]
    fn binary_images_stop_at_sample_trailer() {
        let report = "\
Report Version:  9

Binary Images:
0x1000 - 0x1fff +com.example.App 1.0 (1) <11111111111111111111111111111111> /App
Sample analysis of process 123 written to file
";
        let parser = ingested(report);
        assert_eq!(parser.images.len(), 1);
    }
}
