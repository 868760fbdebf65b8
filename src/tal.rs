//! Loading Trust Anchor Locator files.
//!
//! A TAL file is a UTF-8 text file: zero or more `#`-prefixed comment
//! lines, one or more fetch URIs (`rsync://` or `https://`), a blank
//! line, and a base64-encoded SubjectPublicKeyInfo block.

use std::{fmt, fs, io};
use std::path::{Path, PathBuf};
use bytes::Bytes;


//------------ TalUri -----------------------------------------------------------

/// A single fetch URI from a TAL file, tagged by scheme.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TalUri {
    Rsync(String),
    Https(String),
}

impl TalUri {
    pub fn as_str(&self) -> &str {
        match self {
            TalUri::Rsync(uri) | TalUri::Https(uri) => uri,
        }
    }

    fn parse(line: &str) -> Result<Self, TalError> {
        if line.starts_with("rsync://") {
            Ok(TalUri::Rsync(line.to_string()))
        }
        else if line.starts_with("https://") {
            Ok(TalUri::Https(line.to_string()))
        }
        else {
            Err(TalError::UnsupportedScheme(line.to_string()))
        }
    }
}

impl fmt::Display for TalUri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


//------------ Tal -------------------------------------------------------------

/// A parsed Trust Anchor Locator.
#[derive(Clone, Debug)]
pub struct Tal {
    /// The TAL's name, taken from its file name without the extension.
    pub name: String,

    /// The URIs to try, in file order.
    pub uris: Vec<TalUri>,

    /// The decoded SubjectPublicKeyInfo the fetched root certificate
    /// must match.
    pub spki: Bytes,
}

impl Tal {
    /// Parses a single TAL file.
    pub fn parse_file(path: &Path) -> Result<Self, TalError> {
        let content = fs::read_to_string(path).map_err(TalError::Io)?;
        let name = path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&name, &content)
    }

    fn parse(name: &str, content: &str) -> Result<Self, TalError> {
        let mut lines = content.lines().peekable();

        while let Some(line) = lines.peek() {
            if line.starts_with('#') {
                lines.next();
            }
            else {
                break;
            }
        }

        let mut uris = Vec::new();
        loop {
            match lines.next() {
                None => return Err(TalError::MissingSeparator),
                Some("") => break,
                Some(line) => uris.push(TalUri::parse(line)?),
            }
        }
        if uris.is_empty() {
            return Err(TalError::NoUris);
        }

        let spki_text: String = lines
            .flat_map(|line| line.chars())
            .filter(|c| !c.is_whitespace())
            .collect();
        if spki_text.is_empty() {
            return Err(TalError::MissingSpki);
        }
        let spki = base64::decode(&spki_text).map_err(TalError::BadBase64)?;

        Ok(Tal { name: name.to_string(), uris, spki: Bytes::from(spki) })
    }

    /// Lists the `.tal` files in `dir`, sorted by file name for
    /// deterministic processing order.
    pub fn scan_dir(dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "tal"))
            .collect();
        paths.sort();
        Ok(paths)
    }
}


//------------ TalError ---------------------------------------------------------

#[derive(Debug)]
pub enum TalError {
    Io(io::Error),
    NoUris,
    UnsupportedScheme(String),
    MissingSeparator,
    MissingSpki,
    BadBase64(base64::DecodeError),
}

impl fmt::Display for TalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TalError::Io(err) => write!(f, "failed to read TAL file: {}", err),
            TalError::NoUris => f.write_str("TAL has no fetch URIs"),
            TalError::UnsupportedScheme(line) => {
                write!(f, "unsupported URI scheme in line {:?}", line)
            }
            TalError::MissingSeparator => {
                f.write_str("missing blank line before the SPKI block")
            }
            TalError::MissingSpki => f.write_str("missing SubjectPublicKeyInfo block"),
            TalError::BadBase64(err) => {
                write!(f, "invalid base64 in SubjectPublicKeyInfo block: {}", err)
            }
        }
    }
}

impl std::error::Error for TalError {}


#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Tal, TalError> {
        Tal::parse("test", content)
    }

    #[test]
    fn happy_path_with_comment_and_crlf() {
        let tal = parse(
            "# a comment\r\nrsync://example.org/ta/ta.cer\r\n\r\nQUJD\r\n"
        ).unwrap();
        assert_eq!(tal.uris, vec![
            TalUri::Rsync("rsync://example.org/ta/ta.cer".into())
        ]);
        assert_eq!(&tal.spki[..], b"ABC");
    }

    #[test]
    fn multiple_uris_and_multiline_spki() {
        let tal = parse(
            "rsync://a.example/ta.cer\nhttps://b.example/ta.cer\n\nQUJD\nREVG\n"
        ).unwrap();
        assert_eq!(tal.uris.len(), 2);
        assert_eq!(&tal.spki[..], b"ABCDEF");
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let err = parse("ftp://example.org/ta.cer\n\nQUJD\n").unwrap_err();
        assert!(matches!(err, TalError::UnsupportedScheme(_)));
    }

    #[test]
    fn rejects_empty_uri_list() {
        let err = parse("\nQUJD\n").unwrap_err();
        assert!(matches!(err, TalError::NoUris));
    }

    #[test]
    fn rejects_missing_separator() {
        let err = parse("rsync://example.org/ta.cer\n").unwrap_err();
        assert!(matches!(err, TalError::MissingSeparator));
    }

    #[test]
    fn rejects_missing_spki() {
        let err = parse("rsync://example.org/ta.cer\n\n").unwrap_err();
        assert!(matches!(err, TalError::MissingSpki));
    }

    #[test]
    fn rejects_bad_base64() {
        let err = parse("rsync://example.org/ta.cer\n\n!!!not base64!!!\n")
            .unwrap_err();
        assert!(matches!(err, TalError::BadBase64(_)));
    }
}
