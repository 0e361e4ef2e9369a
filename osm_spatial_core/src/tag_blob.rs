/*
This file is part of the Building Aggregration Tool
Copyright (C) 2022 Novel-T

The Building Aggregration Tool is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/
//! Parser for the `other_tags` wire format (spec §4.2, §6, §9).
//!
//! The grammar is `"key"=>"value"(,"key"=>"value")*`. Quote and comma
//! characters inside values are not escaped by the producer; this module
//! implements the naive split-and-trim behavior the spec mandates for
//! compatibility, plus an explicitly opt-in stricter variant (§9 design
//! note: "a stricter parser is an optional enhancement that must be
//! opt-in").

use std::collections::HashMap;

/// Splits `blob` by `,`, then each part by the literal `=>`, stripping one
/// leading/trailing `"` from key and value. Parts without `=>` are
/// silently skipped. This is wired into the tag expander's default path.
pub fn parse(blob: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();

    for part in blob.split(',') {
        let Some((key, value)) = part.split_once("=>") else {
            continue;
        };
        map.insert(trim_one_quote(key), trim_one_quote(value));
    }

    map
}

fn trim_one_quote(s: &str) -> String {
    let s = s.strip_prefix('"').unwrap_or(s);
    let s = s.strip_suffix('"').unwrap_or(s);
    s.to_string()
}

/// A stricter parser that respects quoting: commas and `=>` that occur
/// inside a quoted value do not split the pair. Not used by any of the
/// three passes by default — callers must opt in explicitly, per the
/// spec's compatibility requirement that the naive parser remain the
/// default behavior.
pub fn parse_strict(blob: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut chars = blob.chars().peekable();

    loop {
        let Some(key) = read_quoted(&mut chars) else {
            break;
        };
        skip_ws(&mut chars);
        if chars.peek() == Some(&'=') {
            chars.next();
            if chars.peek() == Some(&'>') {
                chars.next();
            }
        } else {
            continue;
        }
        skip_ws(&mut chars);
        let Some(value) = read_quoted(&mut chars) else {
            break;
        };
        map.insert(key, value);

        skip_ws(&mut chars);
        if chars.peek() == Some(&',') {
            chars.next();
        }
    }

    map
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars>) {
    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
        chars.next();
    }
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<String> {
    skip_ws(chars);
    if chars.peek() != Some(&'"') {
        return None;
    }
    chars.next();

    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if c == '"' {
            chars.next();
            return Some(out);
        }
        if c == '\\' {
            chars.next();
            if let Some(&escaped) = chars.peek() {
                out.push(escaped);
                chars.next();
            }
            continue;
        }
        out.push(c);
        chars.next();
    }

    None
}
