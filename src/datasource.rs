//! Named data sources loaded from a YAML file.
//!
//! ```yaml
//! sources:
//!   users:
//!     kind: excel
//!     path: data/Book.xlsx
//!     sheet: Data
//!   remote_users:
//!     kind: google_sheet
//!     credentials: keys/service-account.json
//!     spreadsheet_id: 1f5epAPxP_Yd3g1TunEMdtianpVAhKS0RG6BKRDSLtrk
//!     range: "Users!A1:D"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SheetError};
use crate::types::{Record, RecordSet};
use crate::{excel, google};

/// Where a set of records comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// A sheet in a local workbook.
    Excel { path: PathBuf, sheet: String },
    /// A range in a Google Sheets spreadsheet.
    GoogleSheet {
        credentials: PathBuf,
        spreadsheet_id: String,
        range: String,
    },
}

impl DataSource {
    /// Reads the source into records.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying reader unchanged.
    pub fn read(&self) -> Result<Vec<Record>> {
        Ok(self.read_table()?.records)
    }

    /// Reads the source, keeping header order.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying reader unchanged.
    pub fn read_table(&self) -> Result<RecordSet> {
        match self {
            Self::Excel { path, sheet } => excel::read_table(path, sheet),
            Self::GoogleSheet {
                credentials,
                spreadsheet_id,
                range,
            } => google::SheetsClient::new()?.read_table(credentials, spreadsheet_id, range),
        }
    }

    fn resolve_against(&mut self, base: &Path) {
        let path = match self {
            Self::Excel { path, .. } => path,
            Self::GoogleSheet { credentials, .. } => credentials,
        };
        if path.is_relative() {
            *path = base.join(&*path);
        }
    }
}

/// The `sources:` map of a data-source file.
#[derive(Debug, Default, Deserialize)]
pub struct DataSourceConfig {
    #[serde(default)]
    sources: BTreeMap<String, DataSource>,
}

impl DataSourceConfig {
    /// Loads a config file, resolving relative paths against its directory.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Io`] if the file cannot be read and
    /// [`SheetError::Config`] if it is not a valid config.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| SheetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_yaml(&content, base)
    }

    /// Parses config text, resolving relative paths against `base`.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Config`] if the YAML is invalid.
    pub fn from_yaml(yaml: &str, base: &Path) -> Result<Self> {
        let mut config: Self =
            serde_yaml_ng::from_str(yaml).map_err(|e| SheetError::Config(e.to_string()))?;
        for source in config.sources.values_mut() {
            source.resolve_against(base);
        }
        Ok(config)
    }

    /// Looks up a source by name.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::UnknownSource`] if no source has that name.
    pub fn source(&self, name: &str) -> Result<&DataSource> {
        self.sources
            .get(name)
            .ok_or_else(|| SheetError::UnknownSource(name.to_string()))
    }

    /// Returns the configured source names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}
