use serde_derive::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::model::reason::RevocationReason;

/// A decoded certificate revocation list (CRL)
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RevocationList {
    /// Issuer common name
    pub name: String,
    /// Raw signature bytes (not verified)
    pub signature: Vec<u8>,
    /// Issue date of this list
    #[serde(with = "time::serde::rfc3339")]
    pub this_update: OffsetDateTime,
    /// Date by which the next list will be issued
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_update: Option<OffsetDateTime>,
    /// Original encoded bytes
    pub raw: Vec<u8>,
    /// Where the list was fetched from, absent for file imports
    pub source_url: Option<Url>,
    /// Revoked certificates, in source order
    pub entries: Vec<RevocationEntry>,
}

/// A decoded revoked certificate entry
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RevocationEntry {
    /// Decimal serial number
    pub serial_number: String,
    pub reason: RevocationReason,
    #[serde(with = "time::serde::rfc3339")]
    pub revocation_date: OffsetDateTime,
}

/// Persisted revocation list record
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRevocationList {
    /// Store-assigned ID (0 until persisted)
    pub id: i64,
    /// Issuer common name (unique across lists)
    pub name: String,
    pub signature: Vec<u8>,
    #[serde(with = "time::serde::rfc3339")]
    pub this_update: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_update: Option<OffsetDateTime>,
    pub url: Option<String>,
    pub raw: Vec<u8>,
    /// Number of revoked entries stored for this list (populated on reads)
    #[serde(default)]
    pub revoked_count: u64,
}

/// Persisted revoked certificate record
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RevokedCertificate {
    /// Store-assigned ID (0 until persisted)
    pub id: i64,
    pub serial_number: String,
    #[serde(with = "time::serde::rfc3339")]
    pub revocation_date: OffsetDateTime,
    pub reason: RevocationReason,
    /// Owning revocation list ID
    pub revocation_list_id: i64,
    /// Owning revocation list name (populated on cross-list lookups)
    #[serde(default)]
    pub revoked_by: Option<String>,
}

impl RevocationList {
    /// Number of revoked entries
    pub fn revoked_count(&self) -> usize {
        self.entries.len()
    }
}

impl From<&RevocationList> for CertificateRevocationList {
    fn from(revocation_list: &RevocationList) -> Self {
        Self {
            id: 0,
            name: revocation_list.name.clone(),
            signature: revocation_list.signature.clone(),
            this_update: revocation_list.this_update,
            next_update: revocation_list.next_update,
            url: revocation_list.source_url.as_ref().map(|url| url.to_string()),
            raw: revocation_list.raw.clone(),
            revoked_count: 0,
        }
    }
}

impl RevokedCertificate {
    /// RevokedCertificate constructor (for a not-yet-persisted entry)
    ///
    /// # Arguments
    ///
    /// * `revocation_list_id` - Owning revocation list ID
    /// * `entry` - Decoded revocation entry
    ///
    /// # Returns
    ///
    /// A newly constructed [`RevokedCertificate`] object.
    ///
    pub fn new(revocation_list_id: i64, entry: &RevocationEntry) -> Self {
        Self {
            id: 0,
            serial_number: entry.serial_number.clone(),
            revocation_date: entry.revocation_date,
            reason: entry.reason,
            revocation_list_id,
            revoked_by: None,
        }
    }
}
