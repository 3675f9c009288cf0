//! Explicit dataset registry.
//!
//! Datasets are keyed by `(animal id, date)` and injected by the caller; the
//! pipeline never discovers data by name on its own. The `ID{animal}_{ddmmyy}`
//! naming convention is only used to label datasets and to key files loaded
//! by the CLI.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use crate::types::RawRecord;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DatasetId {
    pub animal_id: String,
    pub date: NaiveDate,
}

impl DatasetId {
    pub fn new(animal_id: &str, date: NaiveDate) -> Self {
        Self {
            animal_id: animal_id.to_string(),
            date,
        }
    }

    /// Parse `ID{animal}_{ddmmyy}`, e.g. `ID4021_150324`.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix("ID")?;
        let (animal, date) = rest.rsplit_once('_')?;
        if animal.is_empty() || date.len() != 6 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(date, "%d%m%y").ok()?;
        Some(Self::new(animal, date))
    }
}

impl Display for DatasetId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "ID{}_{}", self.animal_id, self.date.format("%d%m%y"))
    }
}

/// In-memory mapping from dataset identity to its raw records
#[derive(Clone, Debug, Default)]
pub struct DatasetRegistry {
    entries: BTreeMap<DatasetId, Vec<RawRecord>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register records for an animal-day, appending to any already present.
    pub fn insert(&mut self, id: DatasetId, records: Vec<RawRecord>) {
        self.entries.entry(id).or_default().extend(records);
    }

    pub fn get(&self, id: &DatasetId) -> Option<&[RawRecord]> {
        self.entries.get(id).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DatasetId, &[RawRecord])> {
        self.entries.iter().map(|(id, records)| (id, records.as_slice()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &DatasetId> {
        self.entries.keys()
    }
}
