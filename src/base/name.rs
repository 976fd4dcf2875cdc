//! Domain names.

use std::{cmp::Ordering, fmt, hash, str::FromStr};

use super::wire::{ProtocolError, WireReader, WireWriter};

/// The maximum length of a label, in bytes.
pub const MAX_LABEL_LEN: usize = 63;

/// The maximum length of an encoded name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

//----------- Name -------------------------------------------------------------

/// An absolute domain name.
///
/// Names compare, hash and order case-insensitively.  Ordering follows the
/// DNSSEC canonical order (labels are compared right to left), which keeps the
/// records of a zone grouped by their position in the tree.
#[derive(Clone)]
pub struct Name {
    /// The labels, from leftmost to rightmost, excluding the root label.
    labels: Vec<Box<[u8]>>,
}

impl Name {
    /// The root name.
    pub const fn root() -> Self {
        Self { labels: Vec::new() }
    }

    /// Construct a name from a sequence of labels.
    pub fn from_labels<I, L>(labels: I) -> Result<Self, ParseNameError>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        let mut name = Self::root();
        for label in labels {
            name.push_label(label.as_ref())?;
        }
        Ok(name)
    }

    /// Append a label to the right of this name.
    fn push_label(&mut self, label: &[u8]) -> Result<(), ParseNameError> {
        if label.is_empty() {
            return Err(ParseNameError::EmptyLabel);
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(ParseNameError::LabelTooLong);
        }
        if self.wire_len() + label.len() + 1 > MAX_NAME_LEN {
            return Err(ParseNameError::NameTooLong);
        }
        self.labels.push(label.into());
        Ok(())
    }

    /// Whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// The labels of this name, from leftmost to rightmost.
    pub fn labels(&self) -> impl DoubleEndedIterator<Item = &[u8]> + ExactSizeIterator {
        self.labels.iter().map(|l| &**l)
    }

    /// The length of this name in uncompressed wire format.
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Whether this name is equal to or below `other`.
    pub fn ends_with(&self, other: &Name) -> bool {
        self.labels.len() >= other.labels.len()
            && self
                .labels
                .iter()
                .rev()
                .zip(other.labels.iter().rev())
                .all(|(l, r)| l.eq_ignore_ascii_case(r))
    }

    /// Prepend labels from text to `origin`.
    fn prepend(text: &str, origin: &Name) -> Result<Self, ParseNameError> {
        let mut name = Self::from_text(text)?;
        for label in &origin.labels {
            name.push_label(label)?;
        }
        Ok(name)
    }

    /// Resolve a possibly relative name against a zone origin.
    ///
    /// - `@` is the origin itself.
    /// - A name with a trailing dot is absolute.
    /// - A name that already ends in the origin is taken as written.
    /// - Anything else is relative to the origin.
    pub fn resolve(text: &str, origin: &Name) -> Result<Self, ParseNameError> {
        if text == "@" {
            return Ok(origin.clone());
        }
        if text.ends_with('.') {
            return text.parse();
        }
        let name: Name = text.parse()?;
        if name.ends_with(origin) {
            Ok(name)
        } else {
            Self::prepend(text, origin)
        }
    }

    /// Express this name relative to `origin`.
    ///
    /// The origin itself is written as `@`.  Returns [`None`] if this name is
    /// not at or below `origin`.
    pub fn relative_to(&self, origin: &Name) -> Option<String> {
        if !self.ends_with(origin) {
            return None;
        }
        let count = self.labels.len() - origin.labels.len();
        if count == 0 {
            return Some("@".into());
        }
        let mut out = String::new();
        for (i, label) in self.labels[..count].iter().enumerate() {
            if i != 0 {
                out.push('.');
            }
            write_label(&mut out, label);
        }
        Some(out)
    }

    /// This name as text without the trailing dot.
    pub fn to_fqdn_string(&self) -> String {
        let mut text = self.to_string();
        if text.len() > 1 {
            text.pop();
        }
        text
    }

    /// Parse labels from text, ignoring a single trailing dot.
    fn from_text(text: &str) -> Result<Self, ParseNameError> {
        let text = text.strip_suffix('.').unwrap_or(text);
        if text.is_empty() {
            return Ok(Self::root());
        }

        let mut name = Self::root();
        let mut label = Vec::new();
        let mut chars = text.bytes();
        while let Some(b) = chars.next() {
            match b {
                b'.' => {
                    name.push_label(&label)?;
                    label.clear();
                }
                b'\\' => {
                    let Some(next) = chars.next() else {
                        return Err(ParseNameError::BadEscape);
                    };
                    if next.is_ascii_digit() {
                        let (Some(d1), Some(d2)) = (chars.next(), chars.next()) else {
                            return Err(ParseNameError::BadEscape);
                        };
                        if !d1.is_ascii_digit() || !d2.is_ascii_digit() {
                            return Err(ParseNameError::BadEscape);
                        }
                        let value = u16::from(next - b'0') * 100
                            + u16::from(d1 - b'0') * 10
                            + u16::from(d2 - b'0');
                        let value = u8::try_from(value).map_err(|_| ParseNameError::BadEscape)?;
                        label.push(value);
                    } else {
                        label.push(next);
                    }
                }
                b if b.is_ascii_whitespace() => return Err(ParseNameError::InvalidChar),
                b => label.push(b),
            }
        }
        name.push_label(&label)?;
        Ok(name)
    }
}

//--- Wire format

impl Name {
    /// Parse a possibly compressed name.
    ///
    /// Every compression pointer must point strictly before the lowest offset
    /// visited so far; this bounds the number of jumps by the message size.
    /// Pointers back into the labels already read are reported as loops.
    pub fn parse(reader: &mut WireReader<'_>) -> Result<Self, ProtocolError> {
        let data = reader.data();
        let start = reader.position();
        let mut pos = start;
        let mut lowest = start;
        let mut resume = None;
        let mut visited = Vec::new();
        let mut name = Self::root();

        loop {
            visited.push(pos);
            let Some(&len) = data.get(pos) else {
                return Err(ProtocolError::TruncatedMessage { offset: pos });
            };

            match len & 0xC0 {
                0x00 if len == 0 => {
                    pos += 1;
                    break;
                }
                0x00 => {
                    let end = pos + 1 + usize::from(len);
                    let Some(label) = data.get(pos + 1..end) else {
                        return Err(ProtocolError::TruncatedMessage { offset: end });
                    };
                    name.push_label(label)
                        .map_err(|_| ProtocolError::malformed(pos, "name exceeds 255 bytes"))?;
                    pos = end;
                }
                0xC0 => {
                    let Some(&low) = data.get(pos + 1) else {
                        return Err(ProtocolError::TruncatedMessage { offset: pos + 1 });
                    };
                    let target = usize::from(u16::from_be_bytes([len & 0x3F, low]));
                    if visited.contains(&target) {
                        return Err(ProtocolError::CompressionLoop { offset: pos });
                    }
                    if target >= lowest {
                        return Err(ProtocolError::malformed(pos, "forward compression pointer"));
                    }
                    resume.get_or_insert(pos + 2);
                    lowest = target;
                    pos = target;
                }
                _ => return Err(ProtocolError::malformed(pos, "unsupported label type")),
            }
        }

        reader.set_position(resume.unwrap_or(pos));
        Ok(name)
    }

    /// Compose this name, compressing it against earlier names if allowed.
    pub fn compose(&self, writer: &mut WireWriter, compress: bool) {
        for i in 0..self.labels.len() {
            let suffix = &self.labels[i..];
            if compress {
                if let Some(offset) = writer.lookup_name(suffix) {
                    writer.put_u16(0xC000 | offset);
                    return;
                }
                writer.remember_name(suffix);
            }
            let label = &self.labels[i];
            writer.put_u8(label.len() as u8);
            writer.put_slice(label);
        }
        writer.put_u8(0);
    }

    /// Compose this name in canonical form: uncompressed and lowercase.
    pub fn compose_canonical(&self, buf: &mut Vec<u8>) {
        for label in &self.labels {
            buf.push(label.len() as u8);
            buf.extend(label.iter().map(u8::to_ascii_lowercase));
        }
        buf.push(0);
    }
}

//--- Parsing from strings

impl FromStr for Name {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

//--- Equality, ordering, hashing

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(&other.labels)
                .all(|(l, r)| l.eq_ignore_ascii_case(r))
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        let lower = |l: &[u8]| l.iter().map(u8::to_ascii_lowercase).collect::<Vec<_>>();
        for (l, r) in self.labels.iter().rev().zip(other.labels.iter().rev()) {
            match lower(l).cmp(&lower(r)) {
                Ordering::Equal => {}
                other => return other,
            }
        }
        self.labels.len().cmp(&other.labels.len())
    }
}

impl hash::Hash for Name {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        for label in &self.labels {
            state.write_u8(label.len() as u8);
            for b in label.iter() {
                state.write_u8(b.to_ascii_lowercase());
            }
        }
    }
}

//--- Formatting

fn write_label(out: &mut String, label: &[u8]) {
    for &b in label {
        match b {
            b'.' | b'\\' | b'"' | b'(' | b')' | b';' | b'@' | b'$' => {
                out.push('\\');
                out.push(b as char);
            }
            0x21..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03}")),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        let mut out = String::with_capacity(self.wire_len());
        for label in &self.labels {
            write_label(&mut out, label);
            out.push('.');
        }
        f.write_str(&out)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

//----------- ParseNameError ---------------------------------------------------

/// An error when parsing a domain name from text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseNameError {
    /// A label was empty (e.g. `foo..bar`).
    EmptyLabel,

    /// A label exceeded 63 bytes.
    LabelTooLong,

    /// The name exceeded 255 bytes.
    NameTooLong,

    /// An escape sequence was malformed.
    BadEscape,

    /// The name contained whitespace.
    InvalidChar,
}

impl std::error::Error for ParseNameError {}

impl fmt::Display for ParseNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EmptyLabel => "the name contains an empty label",
            Self::LabelTooLong => "a label exceeds 63 bytes",
            Self::NameTooLong => "the name exceeds 255 bytes",
            Self::BadEscape => "the name contains an invalid escape sequence",
            Self::InvalidChar => "the name contains whitespace",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn parse_and_display() {
        assert_eq!(name("www.example.com").to_string(), "www.example.com.");
        assert_eq!(name("www.example.com.").to_string(), "www.example.com.");
        assert_eq!(name(".").to_string(), ".");
        assert_eq!(name("a\\.b.example").labels().count(), 2);
        assert_eq!(name("a\\046b.example"), name("a\\.b.example"));

        assert_eq!("a..b".parse::<Name>(), Err(ParseNameError::EmptyLabel));
        let long = "x".repeat(64);
        assert_eq!(long.parse::<Name>(), Err(ParseNameError::LabelTooLong));
    }

    #[test]
    fn case_insensitive() {
        assert_eq!(name("WWW.Example.COM"), name("www.example.com"));
        assert!(name("www.EXAMPLE.com").ends_with(&name("example.com")));
        assert!(!name("www.example.net").ends_with(&name("example.com")));
    }

    #[test]
    fn canonical_order() {
        let mut names = vec![
            name("z.example.com"),
            name("example.com"),
            name("a.b.example.com"),
            name("b.example.com"),
        ];
        names.sort();
        assert_eq!(
            names,
            vec![
                name("example.com"),
                name("b.example.com"),
                name("a.b.example.com"),
                name("z.example.com"),
            ]
        );
    }

    #[test]
    fn resolve_against_origin() {
        let origin = name("example.com");
        assert_eq!(Name::resolve("@", &origin).unwrap(), origin);
        assert_eq!(
            Name::resolve("www", &origin).unwrap(),
            name("www.example.com")
        );
        assert_eq!(
            Name::resolve("www.example.com", &origin).unwrap(),
            name("www.example.com")
        );
        assert_eq!(
            Name::resolve("mail.example.net.", &origin).unwrap(),
            name("mail.example.net")
        );
        assert_eq!(
            Name::resolve("mail.example.net", &origin).unwrap(),
            name("mail.example.net.example.com")
        );
    }

    #[test]
    fn relative_names() {
        let origin = name("example.com");
        assert_eq!(name("www.example.com").relative_to(&origin).unwrap(), "www");
        assert_eq!(origin.relative_to(&origin).unwrap(), "@");
        assert_eq!(name("www.example.net").relative_to(&origin), None);
        assert_eq!(name("www.example.com").to_fqdn_string(), "www.example.com");
    }

    #[test]
    fn compressed_wire_format() {
        let mut writer = WireWriter::new();
        name("example.com").compose(&mut writer, true);
        name("www.example.com").compose(&mut writer, true);
        let data = writer.finish();
        // "example.com" is 13 bytes, "www" plus a pointer is 6 more.
        assert_eq!(data.len(), 13 + 6);

        let mut reader = WireReader::new(&data);
        assert_eq!(Name::parse(&mut reader).unwrap(), name("example.com"));
        assert_eq!(Name::parse(&mut reader).unwrap(), name("www.example.com"));
        assert!(reader.is_empty());
    }

    #[test]
    fn rejects_pointer_loops() {
        // A pointer to itself.
        let data = [0xC0, 0x00];
        let err = Name::parse(&mut WireReader::new(&data)).unwrap_err();
        assert_eq!(err, ProtocolError::CompressionLoop { offset: 0 });

        // Two labels that point back at each other.
        let data = [1, b'a', 0xC0, 0x04, 1, b'b', 0xC0, 0x00];
        let mut reader = WireReader::new(&data);
        reader.set_position(4);
        let err = Name::parse(&mut reader).unwrap_err();
        assert!(matches!(err, ProtocolError::CompressionLoop { .. }));
    }

    #[test]
    fn rejects_truncated_names() {
        let data = [3, b'w', b'w'];
        let err = Name::parse(&mut WireReader::new(&data)).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedMessage { .. }));
    }
}
