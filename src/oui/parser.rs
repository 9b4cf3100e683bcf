//! Parser for the IEEE `oui.txt` MA-L registry export.
//!
//! Each assignment in the export looks like:
//!
//! ```text
//! 00-50-56   (hex)		VMware, Inc.
//! 005056     (base 16)		VMware, Inc.
//! 				3401 Hillview Avenue
//! 				PALO ALTO CA 94304
//! 				US
//! ```

use regex::Regex;

use super::types::VendorRecord;

lazy_static::lazy_static! {
    static ref HEX_LINE: Regex =
        Regex::new(r"^([0-9A-F]{2}-[0-9A-F]{2}-[0-9A-F]{2})\s*\(hex\)\s+(.+)$").expect("valid hex line pattern");
    static ref BASE16_LINE: Regex =
        Regex::new(r"^([0-9A-F]{6})\s*\(base 16\)\s+(.+)$").expect("valid base 16 line pattern");
}

/// Fields collected for the assignment currently being read.
#[derive(Debug, Default)]
struct PartialRecord {
    prefix: String,
    prefix_hex: Option<String>,
    vendor_name: String,
    address_lines: Vec<String>,
}

impl PartialRecord {
    fn finish(self) -> Option<VendorRecord> {
        if self.prefix.is_empty() || self.vendor_name.is_empty() {
            return None;
        }
        Some(VendorRecord::new(
            &self.prefix,
            self.prefix_hex.as_deref(),
            &self.vendor_name,
            &self.address_lines.join(" "),
        ))
    }
}

enum ParserState {
    Idle,
    InRecord(PartialRecord),
}

/// Parse the raw registry text into vendor records, in input order.
pub fn parse_registry(content: &str) -> Vec<VendorRecord> {
    let mut records = Vec::new();
    let mut state = ParserState::Idle;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(caps) = HEX_LINE.captures(line) {
            if let ParserState::InRecord(partial) = state {
                records.extend(partial.finish());
            }
            state = ParserState::InRecord(PartialRecord {
                prefix: caps[1].to_string(),
                vendor_name: caps[2].trim().to_string(),
                ..Default::default()
            });
            continue;
        }

        if let Some(caps) = BASE16_LINE.captures(line) {
            // A base 16 line with no hex line before it has nothing to attach to
            if let ParserState::InRecord(partial) = &mut state {
                partial.prefix_hex = Some(caps[1].to_string());
                // The base 16 line sometimes carries the fuller organization name
                let name = caps[2].trim();
                if name.chars().count() > partial.vendor_name.chars().count() {
                    partial.vendor_name = name.to_string();
                }
            }
            continue;
        }

        if let ParserState::InRecord(partial) = &mut state {
            partial.address_lines.push(line.to_string());
        }
    }

    if let ParserState::InRecord(partial) = state {
        records.extend(partial.finish());
    }

    tracing::info!("Parsed {} OUI records", records.len());
    records
}
