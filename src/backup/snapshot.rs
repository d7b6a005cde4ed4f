use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::backup::error::{BackupError, Result};
use crate::storage::{CollectionName, Record, SCHEMA_VERSION};

/// Identifier stamped into `meta.app` of every export.
pub const APP_IDENTIFIER: &str = "clinicdb";

/// Backup metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    /// Producing application.
    pub app: String,
    /// Export time, ISO-8601 in UTC with millisecond precision.
    pub exported_at: String,
    /// Schema version of the exported data.
    pub version: u32,
}

impl SnapshotMeta {
    /// Metadata for an export taken at `at`.
    pub fn at(at: OffsetDateTime) -> Result<Self> {
        let format =
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");
        Ok(Self {
            app: APP_IDENTIFIER.to_string(),
            exported_at: at.to_offset(time::UtcOffset::UTC).format(&format)?,
            version: SCHEMA_VERSION,
        })
    }
}

/// Whole-store backup document.
///
/// Serializes as `{"meta": {...}, "settings": [...], "patients": [...], ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Export metadata.
    pub meta: SnapshotMeta,
    /// `settings` records.
    #[serde(default)]
    pub settings: Vec<Record>,
    /// `patients` records.
    #[serde(default)]
    pub patients: Vec<Record>,
    /// `appointments` records.
    #[serde(default)]
    pub appointments: Vec<Record>,
    /// `encounters` records.
    #[serde(default)]
    pub encounters: Vec<Record>,
    /// `drafts` records.
    #[serde(default)]
    pub drafts: Vec<Record>,
}

impl Snapshot {
    /// Empty snapshot with the given metadata.
    pub fn new(meta: SnapshotMeta) -> Self {
        Self {
            meta,
            settings: Vec::new(),
            patients: Vec::new(),
            appointments: Vec::new(),
            encounters: Vec::new(),
            drafts: Vec::new(),
        }
    }

    /// Records of one collection.
    pub fn records(&self, collection: CollectionName) -> &[Record] {
        match collection {
            CollectionName::Settings => &self.settings,
            CollectionName::Patients => &self.patients,
            CollectionName::Appointments => &self.appointments,
            CollectionName::Encounters => &self.encounters,
            CollectionName::Drafts => &self.drafts,
        }
    }

    /// Mutable records of one collection.
    pub fn records_mut(&mut self, collection: CollectionName) -> &mut Vec<Record> {
        match collection {
            CollectionName::Settings => &mut self.settings,
            CollectionName::Patients => &mut self.patients,
            CollectionName::Appointments => &mut self.appointments,
            CollectionName::Encounters => &mut self.encounters,
            CollectionName::Drafts => &mut self.drafts,
        }
    }

    /// Total records across all collections.
    pub fn record_count(&self) -> usize {
        CollectionName::ALL
            .iter()
            .map(|name| self.records(*name).len())
            .sum()
    }
}

/// Collection lists extracted from a backup document after shape validation.
#[derive(Debug, Default)]
pub(crate) struct ImportPlan {
    pub(crate) collections: Vec<(CollectionName, Vec<Record>)>,
}

impl ImportPlan {
    /// Validates the shape of `document` without touching any store.
    ///
    /// Missing or null collection fields count as empty. Anything else that
    /// is not an array of objects rejects the whole document.
    pub(crate) fn from_value(document: Value) -> Result<Self> {
        let mut fields = match document {
            Value::Object(fields) => fields,
            other => {
                return Err(BackupError::malformed(format!(
                    "expected a JSON object at the top level, found {}",
                    type_name(&other)
                )))
            }
        };
        check_meta(&fields)?;

        let mut collections = Vec::with_capacity(CollectionName::ALL.len());
        for name in CollectionName::ALL {
            let records = match fields.remove(name.as_str()) {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items
                    .into_iter()
                    .enumerate()
                    .map(|(pos, item)| {
                        Record::try_from(item).map_err(|other| {
                            BackupError::malformed(format!(
                                "{name}[{pos}] must be an object, found {}",
                                type_name(&other)
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                Some(other) => {
                    return Err(BackupError::malformed(format!(
                        "'{name}' must be an array, found {}",
                        type_name(&other)
                    )))
                }
            };
            collections.push((name, records));
        }
        Ok(Self { collections })
    }

    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        if snapshot.meta.version > SCHEMA_VERSION {
            return Err(BackupError::UnsupportedVersion {
                found: u64::from(snapshot.meta.version),
                supported: SCHEMA_VERSION,
            });
        }
        let Snapshot {
            settings,
            patients,
            appointments,
            encounters,
            drafts,
            ..
        } = snapshot;
        Ok(Self {
            collections: vec![
                (CollectionName::Settings, settings),
                (CollectionName::Patients, patients),
                (CollectionName::Appointments, appointments),
                (CollectionName::Encounters, encounters),
                (CollectionName::Drafts, drafts),
            ],
        })
    }
}

fn check_meta(fields: &Map<String, Value>) -> Result<()> {
    let Some(Value::Object(meta)) = fields.get("meta") else {
        return Ok(());
    };
    match meta.get("version") {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Number(n)) => match n.as_u64().or_else(|| integral(n.as_f64()?)) {
            Some(found) if found > u64::from(SCHEMA_VERSION) => {
                Err(BackupError::UnsupportedVersion {
                    found,
                    supported: SCHEMA_VERSION,
                })
            }
            Some(_) => Ok(()),
            None => Err(BackupError::malformed(format!(
                "meta.version must be a non-negative integer, found {n}"
            ))),
        },
        Some(other) => Err(BackupError::malformed(format!(
            "meta.version must be a number, found {}",
            type_name(other)
        ))),
    }
}

/// Whole non-negative floats such as `1.0`, which some writers emit for
/// integers.
fn integral(value: f64) -> Option<u64> {
    (value.fract() == 0.0 && (0.0..=u64::MAX as f64).contains(&value)).then_some(value as u64)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Default file name for a backup taken on `date`: `clinic-backup-YYYY-MM-DD.json`.
pub fn backup_file_name(date: Date) -> Result<String> {
    let format = format_description!("[year]-[month]-[day]");
    Ok(format!("clinic-backup-{}.json", date.format(&format)?))
}
