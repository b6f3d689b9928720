// Licensed under the Apache-2.0 license

//! Layout extraction from a build-generated header.
//!
//! Only lines of the form
//!
//! ```text
//! [declaration words] IDENTIFIER = 0xHEX[uUlL...] [;] [// comment]
//! ```
//!
//! are understood. Any other assignment to a symbol the layout needs is an
//! error rather than something to skip over, so a header that drifts from
//! this shape fails loudly instead of producing a shifted image.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use winnow::ascii::{hex_digit1, space0};
use winnow::combinator::{alt, opt, preceded};
use winnow::token::{one_of, rest, take_while};
use winnow::{Parser, Result as PResult};

use super::{FlashLayout, FlashRegion, LayoutResolver, Resolution, SymbolMap};
use crate::error::{read_input_text, BuildError, Result};

// identifier ::= [A-Za-z_][A-Za-z0-9_]*
fn identifier<'s>(i: &mut &'s str) -> PResult<&'s str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(i)
}

// hex_literal ::= ("0x" | "0X") hex_digit+
fn hex_literal(i: &mut &str) -> PResult<u64> {
    preceded(
        alt(("0x", "0X")),
        hex_digit1.try_map(|digits: &str| u64::from_str_radix(digits, 16)),
    )
    .parse_next(i)
}

// value ::= hex_literal [uUlL]* [";"] ["//" any*]
fn assigned_value(i: &mut &str) -> PResult<u64> {
    let value = preceded(space0, hex_literal).parse_next(i)?;
    (
        take_while(0.., ['u', 'U', 'l', 'L']),
        space0,
        opt(';'),
        space0,
        opt(("//", rest)),
    )
        .parse_next(i)?;
    Ok(value)
}

fn is_comment(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("//") || line.starts_with("/*") || line.starts_with('*')
}

/// Scans `text` for the `required` symbols and returns their values.
///
/// Each symbol must be assigned at least once. Repeating a definition with
/// the same value is allowed; a different value is [`BuildError::DuplicateSymbol`].
pub fn scan_symbols(text: &str, path: &Path, required: &[&str]) -> Result<BTreeMap<String, u64>> {
    let mut found: BTreeMap<String, (u64, usize)> = BTreeMap::new();

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        if is_comment(line) {
            continue;
        }
        // Assignments inside a trailing comment are not definitions.
        let code = line.split_once("//").map_or(line, |(code, _)| code);
        let Some((lhs, rhs)) = code.split_once('=') else {
            continue;
        };
        // `==` is a comparison, not an assignment.
        if rhs.starts_with('=') {
            continue;
        }
        let Some(name) = lhs.split_whitespace().last() else {
            continue;
        };
        if identifier.parse(name).is_err() || !required.contains(&name) {
            continue;
        }

        let value = assigned_value
            .parse(rhs)
            .map_err(|_| BuildError::MalformedSymbol {
                symbol: name.to_string(),
                path: path.to_path_buf(),
                line: line_number,
            })?;

        match found.get(name) {
            Some(&(first, _)) if first != value => {
                return Err(BuildError::DuplicateSymbol {
                    symbol: name.to_string(),
                    path: path.to_path_buf(),
                    line: line_number,
                    first,
                    second: value,
                });
            }
            Some(_) => {}
            None => {
                debug!("{}:{line_number}: {name} = {value:#x}", path.display());
                found.insert(name.to_string(), (value, line_number));
            }
        }
    }

    if let Some(missing) = required.iter().find(|s| !found.contains_key(**s)) {
        return Err(BuildError::SymbolNotFound {
            symbol: missing.to_string(),
            path: path.to_path_buf(),
        });
    }
    Ok(found.into_iter().map(|(k, (v, _))| (k, v)).collect())
}

/// Layout whose region addresses come from a generated header.
pub struct SymbolLayout {
    header: PathBuf,
    map: SymbolMap,
}

impl SymbolLayout {
    pub fn new(header: impl Into<PathBuf>, map: SymbolMap) -> Self {
        Self {
            header: header.into(),
            map,
        }
    }

    fn required_symbols(&self) -> Vec<&str> {
        let mut symbols = vec![self.map.flash_base_symbol.as_str()];
        symbols.extend(self.map.origin_symbol.as_deref());
        symbols.extend(self.map.regions.iter().map(|r| r.start_symbol.as_str()));
        symbols.sort_unstable();
        symbols.dedup();
        symbols
    }

    /// Builds a layout from already extracted symbol values.
    fn layout_from_symbols(&self, symbols: &BTreeMap<String, u64>) -> Result<FlashLayout> {
        let lookup = |name: &str| {
            symbols
                .get(name)
                .copied()
                .ok_or_else(|| BuildError::SymbolNotFound {
                    symbol: name.to_string(),
                    path: self.header.clone(),
                })
        };
        let flash_base = lookup(self.map.flash_base_symbol.as_str())?;
        let flash_end = self.map.flash_end_address.unwrap_or(u64::MAX);
        let origin = match &self.map.origin_symbol {
            Some(symbol) => lookup(symbol.as_str())?,
            None => flash_base,
        };
        if origin < flash_base || origin >= flash_end {
            return Err(BuildError::AddressOutOfRange {
                region: self.map.origin_symbol.clone().unwrap_or_default(),
                address: origin,
                start: flash_base,
                end: flash_end,
            });
        }

        let starts = self
            .map
            .regions
            .iter()
            .map(|r| lookup(r.start_symbol.as_str()))
            .collect::<Result<Vec<_>>>()?;

        let mut regions = Vec::with_capacity(self.map.regions.len());
        for (i, (entry, &start)) in self.map.regions.iter().zip(&starts).enumerate() {
            if start < origin {
                return Err(BuildError::AddressOutOfRange {
                    region: entry.name.clone(),
                    address: start,
                    start: origin,
                    end: flash_end,
                });
            }
            let size = match (entry.size, starts.get(i + 1)) {
                (Some(size), _) => size,
                (None, Some(&next)) if next >= start => next - start,
                (None, Some(&next)) => {
                    return Err(BuildError::OffsetOverlap {
                        region: self.map.regions[i + 1].name.clone(),
                        offset: next.saturating_sub(origin),
                        end: start - origin,
                    })
                }
                (None, None) => {
                    return Err(BuildError::InvalidConfig {
                        path: PathBuf::from(&self.map.name),
                        reason: format!("last region {} needs a fixed size", entry.name),
                    })
                }
            };
            let mut region = FlashRegion::new(entry.name.clone(), start - origin, size);
            region.reserved = entry.reserved;
            region.describes = entry.describes.clone();
            regions.push(region);
        }

        FlashLayout::new(
            self.map.name.clone(),
            origin,
            self.map.flash_end_address,
            regions,
        )
    }
}

impl LayoutResolver for SymbolLayout {
    fn resolve(&self) -> Result<Resolution> {
        let text = read_input_text(&self.header)?;
        let symbols = scan_symbols(&text, &self.header, &self.required_symbols())?;
        Ok(Resolution::new(self.layout_from_symbols(&symbols)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcu_config_stm32f4::flash::{UPDATE_IMAGE, UPDATE_IMAGE_SYMBOLS};

    const HEADER: &str = r#"
namespace FlashLayout
{
// Flash boundaries
constexpr std::uintptr_t FLASH_BASE_ADDR  = 0x08000000;
constexpr std::size_t    FLASH_TOTAL_SIZE = 1024 * 1024;

constexpr std::uintptr_t NEW_BOOTLOADER2_START = 0x08090000;
constexpr std::size_t    NEW_BOOTLOADER2_SIZE  = 64 * 1024;
constexpr std::uintptr_t NEW_BOOTLOADER2_METADATA_START = 0x0809FC00UL; // metadata

constexpr std::uintptr_t NEW_APP_START = 0x080A0000;
constexpr std::size_t    NEW_APP_SIZE = NEW_APP_TOTAL_SIZE - NEW_APP_RESERVED_SIZE;
constexpr std::uintptr_t NEW_APP_METADATA_START = 0x080FFC00;
} // namespace FlashLayout
"#;

    fn header_path() -> &'static Path {
        Path::new("flash_layout.hpp")
    }

    #[test]
    fn test_identifier_and_value_grammar() {
        assert_eq!(identifier.parse("NEW_APP_START").ok(), Some("NEW_APP_START"));
        assert!(identifier.parse("9LIVES").is_err());
        assert_eq!(assigned_value.parse(" 0x080A0000;").ok(), Some(0x080A_0000));
        assert_eq!(assigned_value.parse(" 0X1fu ; // note").ok(), Some(0x1F));
        assert_eq!(assigned_value.parse("0x10ULL").ok(), Some(0x10));
        assert!(assigned_value.parse(" 64 * 1024;").is_err());
        assert!(assigned_value.parse(" 0x10 + 4;").is_err());
        assert!(assigned_value.parse(" 0x;").is_err());
    }

    #[test]
    fn test_scan_required_symbols() {
        let symbols = scan_symbols(
            HEADER,
            header_path(),
            &["FLASH_BASE_ADDR", "NEW_BOOTLOADER2_METADATA_START", "NEW_APP_START"],
        )
        .unwrap();
        assert_eq!(symbols["FLASH_BASE_ADDR"], 0x0800_0000);
        assert_eq!(symbols["NEW_BOOTLOADER2_METADATA_START"], 0x0809_FC00);
        assert_eq!(symbols["NEW_APP_START"], 0x080A_0000);
        assert_eq!(symbols.len(), 3);
    }

    #[test]
    fn test_missing_symbol() {
        match scan_symbols(HEADER, header_path(), &["NEW_APP_CERT_START"]) {
            Err(BuildError::SymbolNotFound { symbol, .. }) => assert_eq!(symbol, "NEW_APP_CERT_START"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_required_symbol() {
        match scan_symbols(HEADER, header_path(), &["NEW_APP_SIZE"]) {
            Err(BuildError::MalformedSymbol { symbol, line, .. }) => {
                assert_eq!(symbol, "NEW_APP_SIZE");
                assert_eq!(line, 13);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_conflicting_definitions() {
        let text = "constexpr auto A = 0x10;\nconstexpr auto A = 0x10;\nconstexpr auto A = 0x20;\n";
        match scan_symbols(text, header_path(), &["A"]) {
            Err(BuildError::DuplicateSymbol { first, second, line, .. }) => {
                assert_eq!((first, second, line), (0x10, 0x20, 3));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_comparisons_and_comments_ignored() {
        let text = "if (A == 0x5)\n// A = 0x6\n * A = 0x7\nA = 0x8;\n";
        let symbols = scan_symbols(text, header_path(), &["A"]).unwrap();
        assert_eq!(symbols["A"], 0x8);
    }

    #[test]
    fn test_assignment_in_trailing_comment_ignored() {
        let text = "static_assert(true); // NEW_APP_START = 0x080B0000\n";
        match scan_symbols(text, header_path(), &["NEW_APP_START"]) {
            Err(BuildError::SymbolNotFound { symbol, .. }) => assert_eq!(symbol, "NEW_APP_START"),
            other => panic!("unexpected result: {other:?}"),
        }

        let text = "constexpr auto NEW_APP_START = 0x080A0000; // was NEW_APP_START = 0x080B0000\n";
        let symbols = scan_symbols(text, header_path(), &["NEW_APP_START"]).unwrap();
        assert_eq!(symbols["NEW_APP_START"], 0x080A_0000);
    }

    #[test]
    fn test_layout_matches_preset() {
        let layout = SymbolLayout::new(header_path(), SymbolMap::from(&UPDATE_IMAGE_SYMBOLS));
        let symbols =
            scan_symbols(HEADER, header_path(), &layout.required_symbols()).unwrap();
        let resolved = layout.layout_from_symbols(&symbols).unwrap();
        let preset = FlashLayout::from_spec(&UPDATE_IMAGE).unwrap();

        assert_eq!(resolved.flash_base_address, preset.flash_base_address);
        for region in resolved.regions() {
            let expected = preset.require(&region.name).unwrap();
            assert_eq!(region.start_offset, expected.start_offset, "{}", region.name);
        }
        // Without the certificate slot the secondary bootloader runs up to
        // its metadata.
        assert_eq!(resolved.require("boot_sec").unwrap().size, 0xFC00);
        assert_eq!(resolved.require("app").unwrap().size, 0x5_FC00);
        assert_eq!(resolved.image_size(), preset.image_size());
    }

    #[test]
    fn test_overlapping_symbols() {
        let text = HEADER.replace("0x0809FC00UL", "0x080A0100UL");
        let layout = SymbolLayout::new(header_path(), SymbolMap::from(&UPDATE_IMAGE_SYMBOLS));
        let symbols = scan_symbols(&text, header_path(), &layout.required_symbols()).unwrap();
        assert!(matches!(
            layout.layout_from_symbols(&symbols),
            Err(BuildError::OffsetOverlap { .. })
        ));
    }

    #[test]
    fn test_region_below_origin() {
        let text = HEADER.replace("NEW_APP_START = 0x080A0000", "NEW_APP_START = 0x08070000");
        let layout = SymbolLayout::new(header_path(), SymbolMap::from(&UPDATE_IMAGE_SYMBOLS));
        let symbols = scan_symbols(&text, header_path(), &layout.required_symbols()).unwrap();
        assert!(matches!(
            layout.layout_from_symbols(&symbols),
            Err(BuildError::AddressOutOfRange { region, .. }) if region == "app"
        ));
    }
}
