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

//! Reading and writing of zone files, the canonical durable form of a
//! zone.
//!
//! Zone files are read in the line-oriented subset of the
//! [RFC 1035 § 5] format that [`write`] produces, plus the conveniences
//! commonly found in hand-written files:
//!
//! * `;` comments and blank lines;
//! * the `$ORIGIN` and `$TTL` directives;
//! * records split across lines with parentheses;
//! * an omitted owner (a line starting with whitespace) meaning the
//!   previous record's owner;
//! * an omitted TTL meaning the `$TTL` value or, without one, the
//!   previous record's TTL.
//!
//! `$INCLUDE` is not supported. Each record is handed to
//! [`Record::parse`], so RDATA is checked as lightly as it is
//! elsewhere.
//!
//! [`write`] replaces a zone file atomically: the new file is written
//! beside the old one, synced, and renamed over it.
//!
//! [RFC 1035 § 5]: https://datatracker.ietf.org/doc/html/rfc1035#section-5

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::name::Name;
use crate::rr::{Record, Ttl, Type};
use crate::zone::Contents;

pub mod error;
pub use error::{Error, ErrorKind};

/// A result type for zone file operations.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// READING                                                            //
////////////////////////////////////////////////////////////////////////

/// Reads the zone file at `path` into contents for the zone `apex`.
/// Returns the contents and the file's modification time.
pub fn read(path: &Path, apex: &Name) -> Result<(Contents, SystemTime)> {
    let file = File::open(path)?;
    let mtime = file.metadata()?.modified()?;
    let contents = parse(BufReader::new(file), apex)?;
    Ok((contents, mtime))
}

/// Parses a zone file from `reader` into contents for the zone `apex`.
/// The origin starts out as the apex.
pub fn parse<R: BufRead>(reader: R, apex: &Name) -> Result<Contents> {
    let mut parser = Parser::new(apex);
    let mut logical = String::new();
    let mut logical_start = 0;
    let mut depth = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let number = index + 1;
        if depth == 0 {
            logical.clear();
            logical_start = number;
        }
        let stripped =
            strip_line(&line, &mut depth).map_err(|kind| Error::syntax(number, kind))?;
        logical.push_str(&stripped);
        logical.push(' ');
        if depth == 0 {
            parser
                .parse_line(&logical)
                .map_err(|kind| Error::syntax(logical_start, kind))?;
        }
    }

    if depth != 0 {
        Err(Error::syntax(logical_start, ErrorKind::EofBeforeCloseParen))
    } else {
        Ok(parser.contents)
    }
}

/// The state carried from line to line while parsing.
struct Parser {
    contents: Contents,
    origin: Name,
    default_ttl: Option<Ttl>,
    previous_owner: Option<Name>,
    previous_ttl: Option<Ttl>,
}

impl Parser {
    fn new(apex: &Name) -> Self {
        Self {
            contents: Contents::new(apex.clone()),
            origin: apex.clone(),
            default_ttl: None,
            previous_owner: None,
            previous_ttl: None,
        }
    }

    /// Parses a logical line, with comments and parentheses already
    /// stripped.
    fn parse_line(&mut self, line: &str) -> std::result::Result<(), ErrorKind> {
        let text = line.trim();
        if text.is_empty() {
            Ok(())
        } else if text.starts_with('$') {
            self.parse_directive(text)
        } else {
            let blank_owner = line.starts_with(|c: char| c.is_ascii_whitespace());
            self.parse_record(text, blank_owner)
        }
    }

    fn parse_directive(&mut self, text: &str) -> std::result::Result<(), ErrorKind> {
        let mut fields = text.split_ascii_whitespace();
        let directive = fields.next().unwrap_or_default();
        let argument = fields.next();
        if directive.eq_ignore_ascii_case("$ORIGIN") {
            let argument = argument.ok_or(ErrorKind::BadDirective("$ORIGIN needs a name"))?;
            self.origin =
                Name::parse_relative(argument, &self.origin).map_err(ErrorKind::InvalidName)?;
        } else if directive.eq_ignore_ascii_case("$TTL") {
            let argument = argument.ok_or(ErrorKind::BadDirective("$TTL needs a TTL"))?;
            let ttl = argument.parse().map_err(ErrorKind::BadDirective)?;
            self.default_ttl = Some(ttl);
        } else if directive.eq_ignore_ascii_case("$INCLUDE") {
            return Err(ErrorKind::IncludeNotSupported);
        } else {
            return Err(ErrorKind::UnknownDirective(directive.to_owned()));
        }
        if fields.next().is_some() {
            return Err(ErrorKind::BadDirective("trailing data after directive"));
        }
        Ok(())
    }

    fn parse_record(&mut self, text: &str, blank_owner: bool) -> std::result::Result<(), ErrorKind> {
        let default_ttl = self.default_ttl.or(self.previous_ttl);
        let record = if blank_owner {
            let owner = self
                .previous_owner
                .as_ref()
                .ok_or(ErrorKind::EmptyOwnerWithNoPrevious)?;
            Record::parse(&format!("{} {}", owner, text), &self.origin, default_ttl)
        } else {
            Record::parse(text, &self.origin, default_ttl)
        }
        .map_err(ErrorKind::InvalidRecord)?;

        self.contents
            .add_record(&record)
            .map_err(|_| ErrorKind::OutOfZone(record.owner.clone()))?;
        self.previous_ttl = Some(record.ttl);
        self.previous_owner = Some(record.owner);
        Ok(())
    }
}

/// Removes the comment from a physical line and replaces parentheses
/// with spaces, tracking the parenthesis depth across lines.
fn strip_line(line: &str, depth: &mut usize) -> std::result::Result<String, ErrorKind> {
    let mut stripped = String::with_capacity(line.len());
    let mut quoted = false;
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                stripped.push(c);
                if let Some(escaped) = chars.next() {
                    stripped.push(escaped);
                }
                continue;
            }
            '"' => quoted = !quoted,
            ';' if !quoted => break,
            '(' if !quoted => {
                if *depth > 0 {
                    return Err(ErrorKind::NestedParens);
                }
                *depth += 1;
                stripped.push(' ');
                continue;
            }
            ')' if !quoted => {
                if *depth == 0 {
                    return Err(ErrorKind::UnmatchedCloseParen);
                }
                *depth -= 1;
                stripped.push(' ');
                continue;
            }
            _ => (),
        }
        stripped.push(c);
    }
    Ok(stripped)
}

////////////////////////////////////////////////////////////////////////
// WRITING                                                            //
////////////////////////////////////////////////////////////////////////

/// Writes `contents` to `stream` as a zone file, one record per line
/// with absolute owner names. The apex SOA record comes first.
pub fn format(contents: &Contents, stream: &mut impl Write) -> io::Result<()> {
    let apex = contents.apex_name();
    write!(stream, ";; Zone {}", apex)?;
    if let Some(serial) = contents.serial() {
        write!(stream, ", serial {}", serial)?;
    }
    writeln!(stream)?;
    writeln!(stream, "$ORIGIN {}", apex)?;

    if let Some(soa) = contents.soa() {
        for rdata in soa.rdatas.iter() {
            writeln!(stream, "{} {} {} {}", apex, soa.ttl, Type::SOA, rdata)?;
        }
    }
    for (owner, rrset) in contents.rrsets() {
        if owner == apex && rrset.rr_type == Type::SOA {
            continue;
        }
        for rdata in rrset.rdatas.iter() {
            writeln!(stream, "{} {} {} {}", owner, rrset.ttl, rrset.rr_type, rdata)?;
        }
    }
    Ok(())
}

/// Atomically replaces the zone file at `path` with `contents`.
/// Returns the modification time of the new file.
pub fn write(path: &Path, contents: &Contents) -> Result<SystemTime> {
    let tmp_path = temporary_path(path);
    if let Err(err) = write_synced(&tmp_path, contents) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        File::open(parent)?.sync_all()?;
    }
    Ok(fs::metadata(path)?.modified()?)
}

fn write_synced(path: &Path, contents: &Contents) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    format(contents, &mut writer)?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use lazy_static::lazy_static;
    use tempfile::TempDir;

    use super::*;
    use crate::rr::Serial;

    lazy_static! {
        static ref APEX: Name = "almanac.test.".parse().unwrap();
    }

    const ZONE_FILE: &str = r#"
$TTL 1h ; one hour
@   IN SOA ns1 hostmaster (
        2022010101 ; serial
        3600       ; refresh
        900        ; retry
        604800     ; expire
        300 )      ; minimum
    IN NS ns1
ns1 IN A 127.0.0.1
    300 IN AAAA ::1
txt TXT "a ; not a comment" "(not a paren)"
$ORIGIN sub.almanac.test.
host 60 A 192.0.2.1
"#;

    fn parse_str(text: &str) -> Result<Contents> {
        parse(Cursor::new(text), &APEX)
    }

    fn syntax_kind(result: Result<Contents>) -> (usize, ErrorKind) {
        match result {
            Err(Error::Syntax { line, kind }) => (line, kind),
            other => panic!("expected a syntax error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn parse_works() {
        let contents = parse_str(ZONE_FILE).unwrap();
        assert_eq!(contents.serial(), Some(Serial::from(2022010101)));
        assert_eq!(contents.soa().unwrap().ttl, Ttl::from(3600));
        assert!(contents.apex().rrset(Type::NS).is_some());

        let ns1 = contents
            .find_node(&"ns1.almanac.test.".parse().unwrap())
            .unwrap();
        assert_eq!(ns1.rrset(Type::A).unwrap().ttl, Ttl::from(3600));
        assert_eq!(ns1.rrset(Type::AAAA).unwrap().ttl, Ttl::from(300));

        let txt = contents
            .find_node(&"txt.almanac.test.".parse().unwrap())
            .unwrap();
        assert_eq!(
            txt.rrset(Type::TXT).unwrap().rdatas.iter().next().unwrap().as_str(),
            "\"a ; not a comment\" \"(not a paren)\""
        );

        let host = contents
            .find_node(&"host.sub.almanac.test.".parse().unwrap())
            .unwrap();
        assert_eq!(host.rrset(Type::A).unwrap().ttl, Ttl::from(60));
    }

    #[test]
    fn format_then_parse_preserves_contents() {
        let contents = parse_str(ZONE_FILE).unwrap();
        let mut text = Vec::new();
        format(&contents, &mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text
            .lines()
            .nth(2)
            .unwrap()
            .starts_with("almanac.test. 3600 SOA "));
        assert_eq!(parse_str(&text).unwrap(), contents);
    }

    #[test]
    fn write_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("almanac.test.zone");
        fs::write(&path, "stale").unwrap();
        let contents = parse_str(ZONE_FILE).unwrap();
        let mtime = write(&path, &contents).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), mtime);
        assert!(!temporary_path(&path).exists());

        let (read_back, read_mtime) = read(&path, &APEX).unwrap();
        assert_eq!(read_back, contents);
        assert_eq!(read_mtime, mtime);
    }

    #[test]
    fn write_failure_leaves_no_temporary_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("almanac.test.zone");
        fs::create_dir(&path).unwrap();
        let contents = parse_str(ZONE_FILE).unwrap();
        assert!(matches!(write(&path, &contents), Err(Error::Io(_))));
        assert!(!temporary_path(&path).exists());
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            syntax_kind(parse_str("  A 127.0.0.1")),
            (1, ErrorKind::EmptyOwnerWithNoPrevious)
        );
        assert_eq!(
            syntax_kind(parse_str("\n\nother.test. 60 A 127.0.0.1")),
            (3, ErrorKind::OutOfZone("other.test.".parse().unwrap()))
        );
        assert_eq!(
            syntax_kind(parse_str("$INCLUDE other.zone")),
            (1, ErrorKind::IncludeNotSupported)
        );
        assert_eq!(
            syntax_kind(parse_str("$GENERATE 1-2 x A 127.0.0.$")),
            (1, ErrorKind::UnknownDirective("$GENERATE".into()))
        );
        assert_eq!(
            syntax_kind(parse_str("@ 60 A 127.0.0.1 )")),
            (1, ErrorKind::UnmatchedCloseParen)
        );
        assert_eq!(
            syntax_kind(parse_str("@ 60 SOA ns hostmaster (\n1 2 3 4 5")),
            (1, ErrorKind::EofBeforeCloseParen)
        );
        assert!(matches!(
            syntax_kind(parse_str("@ A 127.0.0.1")).1,
            ErrorKind::InvalidRecord(_)
        ));
    }
}
