//! Loose address fragments: whitespace-separated tokens symbolized against a
//! single module whose identity and base address are supplied up front.

use crate::address::parse_address;
use crate::parser::{ListedFrame, ListingParser};
use crate::supplier::ModuleKey;

/// Build the listing parser for one fragment input. Tokens that parse as hex
/// addresses become frames on thread 0; anything else is printed verbatim.
pub(super) fn listing(module: ModuleKey, base_address: u64) -> ListingParser {
    ListingParser::new(Box::new(move |parser, input| {
        for token in input.split_whitespace() {
            match parse_address(token) {
                Ok(absolute) => parser.push_frame(
                    0,
                    ListedFrame {
                        raw_address: absolute,
                        address: absolute.wrapping_sub(base_address),
                        module: module.clone(),
                        placeholder: None,
                    },
                ),
                Err(_) => parser.push_frame(
                    0,
                    ListedFrame {
                        placeholder: Some(token.to_string()),
                        ..Default::default()
                    },
                ),
            }
        }
        Ok(())
    }))
}
