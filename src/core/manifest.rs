// ─── Bundle Manifest ───
// Per-bundle metadata published next to each bundle and used to validate
// cached copies.
//
// Wire format, one field per line, fixed order:
//
//   hash: <token>
//   version: <u32>
//   crc: <u32>
//
// `\r\n` line endings and trailing blank lines are accepted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::core::error::{LoaderError, LoaderResult};

const FIELDS: [&str; 3] = ["hash", "version", "crc"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestInfo {
    /// Opaque cache-validation token. Also names the cached copy on disk.
    pub hash: String,
    pub version: u32,
    /// CRC-32 of the bundle payload. Zero disables the integrity check.
    pub crc: u32,
}

impl ManifestInfo {
    pub fn parse(raw: &str) -> LoaderResult<Self> {
        let mut lines = raw.lines().map(|line| line.trim_end_matches('\r'));
        let mut values = [""; 3];

        for (slot, field) in values.iter_mut().zip(FIELDS) {
            let line = lines
                .next()
                .ok_or_else(|| LoaderError::ManifestParse(format!("missing field '{}'", field)))?;
            let (key, value) = line.split_once(": ").ok_or_else(|| {
                LoaderError::ManifestParse(format!("expected '{}: <value>', got '{}'", field, line))
            })?;
            if key != field {
                return Err(LoaderError::ManifestParse(format!(
                    "expected field '{}', got '{}'",
                    field, key
                )));
            }
            *slot = value.trim();
        }

        if let Some(extra) = lines.find(|line| !line.trim().is_empty()) {
            return Err(LoaderError::ManifestParse(format!(
                "unexpected trailing content '{}'",
                extra
            )));
        }

        let [hash, version, crc] = values;
        if !is_valid_token(hash) {
            return Err(LoaderError::ManifestParse(format!("invalid hash '{}'", hash)));
        }

        Ok(Self {
            hash: hash.to_string(),
            version: parse_number("version", version)?,
            crc: parse_number("crc", crc)?,
        })
    }

    /// Build the manifest a publisher emits for `bundle`: hex SHA-1 hash and CRC-32.
    pub fn describe(bundle: &[u8], version: u32) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(bundle);
        Self {
            hash: hex::encode(hasher.finalize()),
            version,
            crc: crc32fast::hash(bundle),
        }
    }

    /// Check `bundle` against the published CRC, skipping the check when it is zero.
    pub fn verify(&self, bundle_name: &str, bundle: &[u8]) -> LoaderResult<()> {
        if self.crc == 0 {
            return Ok(());
        }
        let actual = crc32fast::hash(bundle);
        if actual != self.crc {
            return Err(LoaderError::CrcMismatch {
                bundle: bundle_name.to_string(),
                expected: self.crc,
                actual,
            });
        }
        Ok(())
    }
}

impl FromStr for ManifestInfo {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ManifestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "hash: {}", self.hash)?;
        writeln!(f, "version: {}", self.version)?;
        writeln!(f, "crc: {}", self.crc)
    }
}

/// When a manifest was last fetched for a bundle; stored as `{bundle}age.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestAge {
    pub bundle_name: String,
    pub hash: String,
    pub version: u32,
    pub fetched_at: DateTime<Utc>,
}

impl ManifestAge {
    pub fn now(bundle_name: &str, manifest: &ManifestInfo) -> Self {
        Self {
            bundle_name: bundle_name.to_string(),
            hash: manifest.hash.clone(),
            version: manifest.version,
            fetched_at: Utc::now(),
        }
    }
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_number(field: &str, value: &str) -> LoaderResult<u32> {
    value
        .parse()
        .map_err(|e| LoaderError::ManifestParse(format!("invalid {} '{}': {}", field, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_published_manifest() {
        let manifest: ManifestInfo = "hash: abc\nversion: 3\ncrc: 123\n".parse().unwrap();
        assert_eq!(
            manifest,
            ManifestInfo {
                hash: "abc".into(),
                version: 3,
                crc: 123
            }
        );
    }

    #[test]
    fn parse_accepts_crlf_and_trailing_blank_lines() {
        let manifest = ManifestInfo::parse("hash: 9f2e-01\r\nversion: 12\r\ncrc: 0\r\n\r\n").unwrap();
        assert_eq!(manifest.hash, "9f2e-01");
        assert_eq!(manifest.version, 12);
        assert_eq!(manifest.crc, 0);
    }

    #[test]
    fn display_parses_back() {
        let samples = [
            ManifestInfo::describe(b"bundle bytes", 1),
            ManifestInfo {
                hash: "A_b-9".into(),
                version: u32::MAX,
                crc: 0,
            },
        ];
        for manifest in samples {
            assert_eq!(ManifestInfo::parse(&manifest.to_string()).unwrap(), manifest);
        }
    }

    #[test]
    fn rejects_malformed_payloads() {
        let cases = [
            "",
            "hash: abc\nversion: 3\n",
            "version: 3\nhash: abc\ncrc: 1\n",
            "hash=abc\nversion=3\ncrc=1\n",
            "hash: abc\nversion: three\ncrc: 1\n",
            "hash: abc\nversion: 3\ncrc: -1\n",
            "hash: \nversion: 3\ncrc: 1\n",
            "hash: ../etc\nversion: 3\ncrc: 1\n",
            "hash: abc\nversion: 3\ncrc: 1\nextra: 2\n",
            "<html>404</html>",
        ];
        for raw in cases {
            assert!(
                matches!(ManifestInfo::parse(raw), Err(LoaderError::ManifestParse(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn describe_hashes_payload() {
        let manifest = ManifestInfo::describe(b"abc", 7);
        assert_eq!(manifest.hash, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(manifest.crc, 0x3524_41c2);
        assert_eq!(manifest.version, 7);
    }

    #[test]
    fn verify_checks_crc_unless_zero() {
        let manifest = ManifestInfo::describe(b"payload", 1);
        assert!(manifest.verify("b", b"payload").is_ok());
        assert!(matches!(
            manifest.verify("b", b"tampered"),
            Err(LoaderError::CrcMismatch { .. })
        ));

        let unchecked = ManifestInfo {
            crc: 0,
            ..manifest
        };
        assert!(unchecked.verify("b", b"tampered").is_ok());
    }
}
