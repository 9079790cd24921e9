// Copyright 2021 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Crate-private utilities.

/// A wrapper around [`str`] references whose [`PartialEq`] and [`Eq`]
/// implementations are ASCII-case-insensitive.
pub struct Caseless<'a>(pub &'a str);

impl PartialEq for Caseless<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(other.0)
    }
}

impl Eq for Caseless<'_> {}

/// Splits presentation-format text into whitespace-separated fields.
/// A double-quoted field (with `\` escapes inside it) is kept together
/// with its quotes, so that whitespace within character-strings
/// survives. Returns `None` if a quote is left unterminated.
pub fn split_fields(text: &str) -> Option<Vec<&str>> {
    let bytes = text.as_bytes();
    let mut fields = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let mut quoted = false;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 1,
                b'"' => quoted = !quoted,
                b if b.is_ascii_whitespace() && !quoted => break,
                _ => (),
            }
            i += 1;
        }
        if quoted {
            return None;
        }
        fields.push(&text[start..i.min(bytes.len())]);
    }
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_fields_keeps_quoted_whitespace() {
        assert_eq!(
            split_fields("  a\t\"b  c\"  d ").unwrap(),
            ["a", "\"b  c\"", "d"],
        );
        assert_eq!(split_fields("\"a\\\" b\"").unwrap(), ["\"a\\\" b\""]);
        assert!(split_fields("\"open").is_none());
    }
}
