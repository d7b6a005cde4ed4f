//! Fixed collection layout.
//!
//! The set of collections, their primary key fields and their secondary
//! indexes are decided at compile time and never change for a given
//! [`SCHEMA_VERSION`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::StoreError;

/// Version stamped into backups and checkpoint images.
pub const SCHEMA_VERSION: u32 = 1;

/// Secondary index declaration: lookups by `name` match on record field `field`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IndexDef {
    /// Name used by callers, e.g. `by_patientId`.
    pub name: &'static str,
    /// Record field whose value is indexed.
    pub field: &'static str,
}

/// Primary key and index layout of one collection.
#[derive(Clone, Copy, Debug)]
pub struct CollectionSchema {
    /// Field holding the unique string key.
    pub primary_key: &'static str,
    /// Non-unique secondary indexes.
    pub indexes: &'static [IndexDef],
}

impl CollectionSchema {
    /// Looks up an index declaration by name.
    pub fn index(&self, name: &str) -> Option<&'static IndexDef> {
        self.indexes.iter().find(|def| def.name == name)
    }
}

const SETTINGS: CollectionSchema = CollectionSchema {
    primary_key: "key",
    indexes: &[],
};

const PATIENTS: CollectionSchema = CollectionSchema {
    primary_key: "id",
    indexes: &[
        IndexDef {
            name: "by_name",
            field: "name",
        },
        IndexDef {
            name: "by_phone",
            field: "phone",
        },
    ],
};

const APPOINTMENTS: CollectionSchema = CollectionSchema {
    primary_key: "id",
    indexes: &[
        IndexDef {
            name: "by_date",
            field: "date",
        },
        IndexDef {
            name: "by_patientId",
            field: "patientId",
        },
    ],
};

const ENCOUNTERS: CollectionSchema = CollectionSchema {
    primary_key: "id",
    indexes: &[
        IndexDef {
            name: "by_patientId",
            field: "patientId",
        },
        IndexDef {
            name: "by_date",
            field: "date",
        },
    ],
};

const DRAFTS: CollectionSchema = CollectionSchema {
    primary_key: "key",
    indexes: &[],
};

/// The five collections every store carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionName {
    /// Single-value application preferences (professional profile, focused patient).
    Settings,
    /// Patient roster.
    Patients,
    /// Schedule entries.
    Appointments,
    /// Visit notes.
    Encounters,
    /// Per-screen autosave state.
    Drafts,
}

impl CollectionName {
    /// All collections, in backup/import order.
    pub const ALL: [CollectionName; 5] = [
        CollectionName::Settings,
        CollectionName::Patients,
        CollectionName::Appointments,
        CollectionName::Encounters,
        CollectionName::Drafts,
    ];

    /// Name used on disk and in backup documents.
    pub fn as_str(self) -> &'static str {
        match self {
            CollectionName::Settings => "settings",
            CollectionName::Patients => "patients",
            CollectionName::Appointments => "appointments",
            CollectionName::Encounters => "encounters",
            CollectionName::Drafts => "drafts",
        }
    }

    /// Layout of this collection.
    pub fn schema(self) -> &'static CollectionSchema {
        match self {
            CollectionName::Settings => &SETTINGS,
            CollectionName::Patients => &PATIENTS,
            CollectionName::Appointments => &APPOINTMENTS,
            CollectionName::Encounters => &ENCOUNTERS,
            CollectionName::Drafts => &DRAFTS,
        }
    }

    pub(crate) fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionName {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectionName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| StoreError::UnknownCollection(s.to_string()))
    }
}
