//! Layer 1: Identity atoms
//!
//! EntryId: `source_host:original_id:created_at`, with `created_at` in the
//! ISO-8601 basic form. Sibling ids append `~<12 hex>` to a base id.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::IdentifierError;
use super::time::Timestamp;

pub const ID_DELIMITER: char = ':';
pub const SIBLING_MARKER: char = '~';

/// Length of the checksum prefix carried by a sibling id.
pub const SIBLING_TAG_LEN: usize = 12;

/// Composite entry identifier.
///
/// Immutable once generated. Ordering is plain string order, which groups
/// ids by host and then by original id, and sorts each group by creation time
/// because the timestamp component is fixed width.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntryId(String);

/// Borrowed view of an id's components.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdParts<'a> {
    pub host: &'a str,
    pub original_id: &'a str,
    pub created_at: &'a str,
    pub sibling: Option<&'a str>,
}

/// Build the composite id for an entry. Pure and deterministic.
pub fn generate_id(
    host: &str,
    original_id: &str,
    created_at: Timestamp,
) -> Result<EntryId, IdentifierError> {
    EntryId::generate(host, original_id, created_at)
}

impl EntryId {
    pub fn generate(
        host: &str,
        original_id: &str,
        created_at: Timestamp,
    ) -> Result<Self, IdentifierError> {
        check_component("source_host", host)?;
        check_component("original_id", original_id)?;
        Ok(Self(format!(
            "{host}{ID_DELIMITER}{original_id}{ID_DELIMITER}{}",
            created_at.to_compact()
        )))
    }

    /// Parse and validate an id string.
    ///
    /// Accepted forms:
    /// - `host:original_id:YYYYMMDDTHHMMSS.fffffffffZ`
    /// - the above followed by `~` and 12 lowercase hex digits (sibling)
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        let malformed = |reason: &str| IdentifierError::Malformed {
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        let (base, tag) = match raw.split_once(SIBLING_MARKER) {
            Some((base, tag)) => (base, Some(tag)),
            None => (raw, None),
        };
        if let Some(tag) = tag
            && !is_sibling_tag(tag)
        {
            return Err(malformed("sibling suffix must be 12 lowercase hex digits"));
        }

        let parts: Vec<&str> = base.split(ID_DELIMITER).collect();
        let [host, original_id, created] = parts.as_slice() else {
            return Err(malformed("expected three `:`-separated components"));
        };
        if host.is_empty() {
            return Err(IdentifierError::Empty {
                component: "source_host",
            });
        }
        if original_id.is_empty() {
            return Err(IdentifierError::Empty {
                component: "original_id",
            });
        }
        Timestamp::parse_compact(created)
            .map_err(|_| malformed("created_at is not an ISO-8601 basic timestamp"))?;

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parts(&self) -> IdParts<'_> {
        let (base, sibling) = match self.0.split_once(SIBLING_MARKER) {
            Some((base, tag)) => (base, Some(tag)),
            None => (self.0.as_str(), None),
        };
        let mut it = base.splitn(3, ID_DELIMITER);
        IdParts {
            host: it.next().unwrap_or_default(),
            original_id: it.next().unwrap_or_default(),
            created_at: it.next().unwrap_or_default(),
            sibling,
        }
    }

    pub fn host(&self) -> &str {
        self.parts().host
    }

    /// Creation time embedded in the id.
    pub fn created_at(&self) -> Option<Timestamp> {
        Timestamp::parse_compact(self.parts().created_at).ok()
    }

    pub fn is_sibling(&self) -> bool {
        self.0.contains(SIBLING_MARKER)
    }

    /// The id with any sibling suffix removed.
    pub fn base(&self) -> EntryId {
        match self.0.split_once(SIBLING_MARKER) {
            Some((base, _)) => EntryId(base.to_string()),
            None => self.clone(),
        }
    }

    /// Sibling id for a preserved tied version of this entry.
    pub fn sibling(&self, tag: &str) -> Result<EntryId, IdentifierError> {
        if !is_sibling_tag(tag) {
            return Err(IdentifierError::Malformed {
                raw: format!("{}{SIBLING_MARKER}{tag}", self.0),
                reason: "sibling suffix must be 12 lowercase hex digits".into(),
            });
        }
        Ok(EntryId(format!("{}{SIBLING_MARKER}{tag}", self.base().0)))
    }
}

fn check_component(component: &'static str, value: &str) -> Result<(), IdentifierError> {
    if value.is_empty() {
        return Err(IdentifierError::Empty { component });
    }
    for delimiter in [ID_DELIMITER, SIBLING_MARKER] {
        if value.contains(delimiter) {
            return Err(IdentifierError::ReservedDelimiter {
                component,
                value: value.to_string(),
                delimiter,
            });
        }
    }
    Ok(())
}

fn is_sibling_tag(tag: &str) -> bool {
    tag.len() == SIBLING_TAG_LEN && tag.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl TryFrom<String> for EntryId {
    type Error = IdentifierError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        EntryId::parse(&raw)
    }
}

impl From<EntryId> for String {
    fn from(id: EntryId) -> String {
        id.0
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({:?})", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
