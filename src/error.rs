//! Error types for spreadsheet data access.

use std::path::PathBuf;

use thiserror::Error;

/// Broad failure category, used by callers to decide between retrying,
/// fixing their input, or escalating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A file or network resource could not be opened, read, or written.
    Io,
    /// A named sheet, header, column, or row does not exist, or the
    /// request is structurally invalid.
    Validation,
    /// Credential loading or authentication failed.
    Security,
}

/// Errors raised by the local and remote readers.
#[derive(Error, Debug)]
pub enum SheetError {
    /// The workbook file does not exist.
    #[error("Excel file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Reading or writing a file failed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A legacy workbook could not be parsed.
    #[error("Failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    /// An xlsx workbook could not be parsed or saved.
    #[error("Failed to read or write xlsx workbook: {0}")]
    Xlsx(#[from] umya_spreadsheet::XlsxError),

    /// The file extension is not a supported spreadsheet format.
    #[error("Unsupported Excel format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// The format can be read but not written back.
    #[error("Excel format is read-only, only .xlsx can be written: {}", .0.display())]
    ReadOnlyFormat(PathBuf),

    #[error("Sheet '{sheet}' not found in {file}")]
    SheetNotFound { sheet: String, file: String },

    #[error("Header row not found in sheet '{0}'")]
    HeaderRowMissing(String),

    /// One or more field keys do not match any header. Lists every key.
    #[error("Column(s) not found: [{}]", .0.join(", "))]
    ColumnsNotFound(Vec<String>),

    #[error("Row {0} not found")]
    RowNotFound(u32),

    /// A cell address lies beyond the last row or column of a worksheet.
    #[error("Cell ({row}, {col}) is outside the worksheet grid")]
    CellOutOfRange { row: u32, col: u32 },

    #[error("Invalid range: {0:?}")]
    InvalidRange(String),

    #[error("Invalid spreadsheet id: {0:?}")]
    InvalidSpreadsheetId(String),

    /// No data source with this name in the config file.
    #[error("Unknown data source: {0}")]
    UnknownSource(String),

    #[error("Invalid data source config: {0}")]
    Config(String),

    /// The service-account credential could not be loaded.
    #[error("Failed to load credentials: {0}")]
    Credential(String),

    /// The HTTPS transport could not be initialized.
    #[error("Failed to initialize secure transport: {0}")]
    Transport(String),

    /// The token endpoint rejected the credential.
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The Sheets API returned a non-success status.
    #[error("Sheets API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl SheetError {
    /// Returns the category this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::FileNotFound(_)
            | Self::Io { .. }
            | Self::Workbook(_)
            | Self::Xlsx(_)
            | Self::Http(_)
            | Self::Api { .. } => ErrorKind::Io,
            Self::UnsupportedFormat(_)
            | Self::ReadOnlyFormat(_)
            | Self::SheetNotFound { .. }
            | Self::HeaderRowMissing(_)
            | Self::ColumnsNotFound(_)
            | Self::RowNotFound(_)
            | Self::CellOutOfRange { .. }
            | Self::InvalidRange(_)
            | Self::InvalidSpreadsheetId(_)
            | Self::UnknownSource(_)
            | Self::Config(_) => ErrorKind::Validation,
            Self::Credential(_) | Self::Transport(_) | Self::Auth(_) => ErrorKind::Security,
        }
    }
}

/// Result type for spreadsheet operations.
pub type Result<T> = std::result::Result<T, SheetError>;
