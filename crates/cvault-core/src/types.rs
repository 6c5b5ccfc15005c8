use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{VaultError, VaultResult};

/// Size of a per-file AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of a CBC initialization vector in bytes
pub const IV_SIZE: usize = 16;

/// Structured association behind an object-store key.
///
/// The string form is `{patient-event}name`, or `{patient}name` when the file
/// is not attached to an event. Both directions are lossless for names that
/// pass [`StorageKey::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageKey {
    pub patient_id: i64,
    pub event_id: Option<String>,
    pub original_name: String,
}

impl StorageKey {
    /// Build a key from an uploaded file name.
    ///
    /// Directory components are dropped from `original_name`, so a browser
    /// upload of `C:\scans\abc.txt` stores as `abc.txt`.
    pub fn new(patient_id: i64, event_id: Option<&str>, original_name: &str) -> VaultResult<Self> {
        let name = original_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();
        if name.is_empty() {
            return Err(VaultError::InvalidInput(format!(
                "file name {original_name:?} has no usable base name"
            )));
        }

        let event_id = match event_id {
            Some(ev) if ev.is_empty() => {
                return Err(VaultError::InvalidInput("event id is empty".into()))
            }
            Some(ev) if ev.contains('}') => {
                return Err(VaultError::InvalidInput(format!(
                    "event id {ev:?} contains a reserved '}}'"
                )))
            }
            other => other.map(str::to_string),
        };

        Ok(Self {
            patient_id,
            event_id,
            original_name: name.to_string(),
        })
    }

    /// Parse the string form produced by `Display`.
    pub fn parse(key: &str) -> Option<Self> {
        let rest = key.strip_prefix('{')?;
        let (assoc, name) = rest.split_once('}')?;
        if name.is_empty() {
            return None;
        }

        // Skip the first char so a negative patient id keeps its sign.
        let split_at = assoc
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '-')
            .map(|(i, _)| i);
        let (patient, event) = match split_at {
            Some(i) => (&assoc[..i], Some(assoc[i + 1..].to_string())),
            None => (assoc, None),
        };

        Some(Self {
            patient_id: patient.parse().ok()?,
            event_id: event,
            original_name: name.to_string(),
        })
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event_id {
            Some(ev) => write!(f, "{{{}-{}}}{}", self.patient_id, ev, self.original_name),
            None => write!(f, "{{{}}}{}", self.patient_id, self.original_name),
        }
    }
}

/// Caller-visible file name for a stored key: the association prefix is
/// stripped, and keys that do not follow the scheme are shown as-is.
pub fn display_name(storage_key: &str) -> String {
    StorageKey::parse(storage_key)
        .map(|k| k.original_name)
        .unwrap_or_else(|| storage_key.to_string())
}

/// A persisted association between an encrypted object and a clinical record.
///
/// Records are never updated in place; replacing a file means delete + save.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub storage_key: String,
    pub owner_id: String,
    pub patient_id: i64,
    pub event_id: Option<String>,
    /// Unix timestamp (seconds)
    pub uploaded_at: u64,
    /// Creation order within the store; listings sort on it
    #[serde(default)]
    pub sequence: u64,
    #[serde(with = "key_bytes")]
    pub encryption_key: [u8; KEY_SIZE],
    #[serde(with = "key_bytes")]
    pub encryption_iv: [u8; IV_SIZE],
    pub content_type: String,
}

impl FileRecord {
    pub fn display_name(&self) -> String {
        display_name(&self.storage_key)
    }
}

impl fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRecord")
            .field("id", &self.id)
            .field("storage_key", &self.storage_key)
            .field("owner_id", &self.owner_id)
            .field("patient_id", &self.patient_id)
            .field("event_id", &self.event_id)
            .field("uploaded_at", &self.uploaded_at)
            .field("sequence", &self.sequence)
            .field("encryption_key", &"[REDACTED]")
            .field("encryption_iv", &"[REDACTED]")
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Everything the metadata store needs to create a record; it assigns
/// `id`, `sequence` and `uploaded_at` itself.
#[derive(Clone)]
pub struct NewFileRecord {
    pub storage_key: String,
    pub owner_id: String,
    pub patient_id: i64,
    pub event_id: Option<String>,
    pub encryption_key: [u8; KEY_SIZE],
    pub encryption_iv: [u8; IV_SIZE],
    pub content_type: String,
}

impl NewFileRecord {
    pub fn into_record(self, id: String, sequence: u64, uploaded_at: u64) -> FileRecord {
        FileRecord {
            id,
            storage_key: self.storage_key,
            owner_id: self.owner_id,
            patient_id: self.patient_id,
            event_id: self.event_id,
            uploaded_at,
            sequence,
            encryption_key: self.encryption_key,
            encryption_iv: self.encryption_iv,
            content_type: self.content_type,
        }
    }
}

/// Metadata query by association
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFilter {
    ByOwner(String),
    ByEvent(String),
    ByPatient(i64),
    /// Live records stored under exactly this object key
    ByStorageKey(String),
}

impl FileFilter {
    pub fn matches(&self, record: &FileRecord) -> bool {
        match self {
            FileFilter::ByOwner(owner) => record.owner_id == *owner,
            FileFilter::ByEvent(event) => record.event_id.as_deref() == Some(event.as_str()),
            FileFilter::ByPatient(patient) => record.patient_id == *patient,
            FileFilter::ByStorageKey(key) => record.storage_key == *key,
        }
    }
}

/// Current time as Unix seconds
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Fixed-size byte arrays as base64 strings
mod key_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)?;
        decoded
            .try_into()
            .map_err(|v: Vec<u8>| D::Error::custom(format!("expected {N} bytes, got {}", v.len())))
    }
}
