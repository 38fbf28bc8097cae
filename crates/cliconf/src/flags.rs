//! Flag tokenizer.
//!
//! Splits argv into a flag map and the positional remainder. The tokenizer
//! has no schema beyond the set of boolean flag names: every other flag takes
//! a value.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::error::{ParamCause, ParamDef, ParamError, ParamErrors};

/// Flag name to raw value, in the order flags first appeared on the command line.
pub type FlagMap = IndexMap<String, String>;

const BOOL_TRUE: &str = "true";
const BOOL_FALSE: &str = "false";

/// Tokenize `src` into flag values and remaining positional arguments.
///
/// - Flag parsing stops at the first argument that does not start with `-`;
///   that argument and everything after it are returned as remaining args.
/// - `--` ends flag parsing and is itself dropped. A bare `-` is positional.
/// - `--name` and `-name` are equivalent.
/// - `--name=value` sets the value directly, `--name value` consumes the next
///   argument, unless `name` is in `booleans`.
/// - A boolean flag is `true` when it is last or followed by another flag. The
///   next argument is consumed only when it is exactly `true` or `false`
///   (ignoring case). Any other next argument is left alone and the flag is
///   not recorded at all, so it resolves to its unset value.
///
/// A value flag at the end of argv without a value fails immediately.
pub fn parse_flags<S: AsRef<str>>(
    src: &[S],
    booleans: &HashSet<String>,
) -> Result<(FlagMap, Vec<String>), ParamErrors> {
    let mut flags = FlagMap::new();
    let mut i = 0usize;

    while i < src.len() {
        let arg = src[i].as_ref();
        if arg == "--" {
            i += 1;
            break;
        }
        if arg == "-" || !arg.starts_with('-') {
            break;
        }
        let name = strip_dashes(arg);
        i += 1;

        if booleans.contains(name) {
            let Some(next) = src.get(i).map(AsRef::as_ref) else {
                flags.insert(name.to_string(), BOOL_TRUE.to_string());
                continue;
            };
            if next.starts_with('-') {
                flags.insert(name.to_string(), BOOL_TRUE.to_string());
                continue;
            }
            let lower = next.to_ascii_lowercase();
            if lower == BOOL_TRUE || lower == BOOL_FALSE {
                flags.insert(name.to_string(), lower);
                i += 1;
            }
            continue;
        }

        if let Some((key, value)) = name.split_once('=') {
            flags.insert(key.to_string(), value.to_string());
            continue;
        }

        let Some(value) = src.get(i) else {
            return Err(ParamErrors::from(vec![ParamError::new(
                ParamDef::flag(name),
                ParamCause::NoValue,
            )]));
        };
        flags.insert(name.to_string(), value.as_ref().to_string());
        i += 1;
    }

    let remaining = src[i..].iter().map(|s| s.as_ref().to_string()).collect();
    Ok((flags, remaining))
}

fn strip_dashes(arg: &str) -> &str {
    let arg = arg.strip_prefix('-').unwrap_or(arg);
    arg.strip_prefix('-').unwrap_or(arg)
}
