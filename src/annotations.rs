use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto};
use log::{debug, info};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SUBJECT_COLUMN: &str = "Subject";
pub const FILENAME_COLUMN: &str = "Filename";
pub const ONSET_COLUMN: &str = "OnsetFrame";
pub const APEX_COLUMN: &str = "ApexFrame";
pub const OFFSET_COLUMN: &str = "OffsetFrame";

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("annotation file {path:?} has no column named {column:?}")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("annotation file {0:?} has no worksheet")]
    NoWorksheet(PathBuf),
    #[error("annotation file {0:?} has no header row")]
    NoHeader(PathBuf),
    #[error("unsupported annotation format: {0:?}")]
    UnsupportedFormat(PathBuf),
}

/// A raw spreadsheet value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Cell content as a trimmed string. Integral floats lose their `.0`.
    pub fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Int(i) => i.to_string(),
            Cell::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{}", *f as i64),
            Cell::Float(f) => f.to_string(),
            Cell::Text(s) => s.trim().to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::Int(i) => Cell::Int(*i),
            Data::Float(f) => Cell::Float(*f),
            Data::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

/// Parse a frame number.
///
/// Floats are truncated toward zero. Blank cells, non-numeric text such as
/// the `/` placeholder, and non-finite or out-of-range floats yield `None`.
/// Negative numbers are kept; they simply name a frame that does not exist.
pub fn parse_frame_index(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Empty => None,
        Cell::Int(i) => Some(*i),
        Cell::Float(f) if f.is_finite() && f.abs() < I64_FLOAT_LIMIT => {
            Some(f.trunc() as i64)
        }
        Cell::Float(_) => None,
        Cell::Text(s) => s.trim().parse().ok(),
    }
}

/// 2^63: the first float magnitude that no longer fits an `i64`.
const I64_FLOAT_LIMIT: f64 = 9_223_372_036_854_775_808.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Onset,
    Apex,
    Offset,
}

impl FrameType {
    pub const ALL: [FrameType; 3] = [FrameType::Onset, FrameType::Apex, FrameType::Offset];

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Onset => "onset",
            FrameType::Apex => "apex",
            FrameType::Offset => "offset",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One annotated video as read from the coding sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRow {
    pub subject: String,
    pub filename: String,
    pub onset: Option<i64>,
    pub apex: Option<i64>,
    pub offset: Option<i64>,
}

impl AnnotationRow {
    pub fn from_cells(
        subject: &Cell,
        filename: &Cell,
        onset: &Cell,
        apex: &Cell,
        offset: &Cell,
    ) -> Self {
        Self {
            subject: subject.text(),
            filename: filename.text(),
            onset: parse_frame_index(onset),
            apex: parse_frame_index(apex),
            offset: parse_frame_index(offset),
        }
    }

    /// The validated key frames, or `None` when any frame index is missing
    /// or the row names no video.
    pub fn key_frames(&self) -> Option<KeyFrames> {
        if self.filename.is_empty() {
            return None;
        }

        Some(KeyFrames {
            subject: self.subject.clone(),
            filename: self.filename.clone(),
            onset: self.onset?,
            apex: self.apex?,
            offset: self.offset?,
        })
    }
}

/// A row whose three frame indices are all known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFrames {
    pub subject: String,
    pub filename: String,
    pub onset: i64,
    pub apex: i64,
    pub offset: i64,
}

impl KeyFrames {
    pub fn frame(&self, frame_type: FrameType) -> i64 {
        match frame_type {
            FrameType::Onset => self.onset,
            FrameType::Apex => self.apex,
            FrameType::Offset => self.offset,
        }
    }

    /// `<src_root>/sub<NN>/<filename>`
    pub fn video_dir(&self, src_root: &Path) -> PathBuf {
        src_root
            .join(format!("sub{:0>2}", self.subject))
            .join(&self.filename)
    }

    /// Frames are stored as `img<N>.jpg` without zero padding.
    pub fn source_path(&self, src_root: &Path, frame_type: FrameType) -> PathBuf {
        self.video_dir(src_root)
            .join(format!("img{}.jpg", self.frame(frame_type)))
    }

    pub fn destination_name(&self, frame_type: FrameType) -> String {
        format!("{}_{}.jpg", self.filename, frame_type)
    }
}

/// Positions of the required columns within a header row.
struct Columns {
    subject: usize,
    filename: usize,
    onset: usize,
    apex: usize,
    offset: usize,
}

impl Columns {
    fn locate(path: &Path, header: &[String]) -> Result<Self, AnnotationError> {
        let find = |column: &'static str| {
            header
                .iter()
                .position(|h| h.trim() == column)
                .ok_or_else(|| AnnotationError::MissingColumn {
                    path: path.to_path_buf(),
                    column,
                })
        };

        Ok(Self {
            subject: find(SUBJECT_COLUMN)?,
            filename: find(FILENAME_COLUMN)?,
            onset: find(ONSET_COLUMN)?,
            apex: find(APEX_COLUMN)?,
            offset: find(OFFSET_COLUMN)?,
        })
    }

    fn row(&self, cells: &[Cell]) -> AnnotationRow {
        let at = |i: usize| cells.get(i).unwrap_or(&Cell::Empty);
        AnnotationRow::from_cells(
            at(self.subject),
            at(self.filename),
            at(self.onset),
            at(self.apex),
            at(self.offset),
        )
    }
}

/// Load the annotation rows in file order.
///
/// `.csv` files go through the `csv` reader, spreadsheet formats through
/// `calamine` (first worksheet only). The first row is the header.
pub fn load_annotations(path: &Path) -> Result<Vec<AnnotationRow>> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let rows = match ext.as_str() {
        "csv" => read_csv(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_workbook(path)?,
        _ => return Err(AnnotationError::UnsupportedFormat(path.to_path_buf()).into()),
    };

    info!("Loaded {} annotation rows from {:?}", rows.len(), path);
    Ok(rows)
}

fn read_csv(path: &Path) -> Result<Vec<AnnotationRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open annotation file: {:?}", path))?;

    let header: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read header of {:?}", path))?
        .iter()
        .map(str::to_string)
        .collect();
    let columns = Columns::locate(path, &header)?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed record {} in {:?}", idx + 1, path))?;
        let cells: Vec<Cell> = record.iter().map(Cell::from).collect();
        rows.push(columns.row(&cells));
    }

    debug!("Parsed {} csv records", rows.len());
    Ok(rows)
}

fn read_workbook(path: &Path) -> Result<Vec<AnnotationRow>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open annotation file: {:?}", path))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AnnotationError::NoWorksheet(path.to_path_buf()))?
        .with_context(|| format!("Failed to read first worksheet of {:?}", path))?;

    let mut sheet_rows = range.rows();
    let header: Vec<String> = sheet_rows
        .next()
        .ok_or_else(|| AnnotationError::NoHeader(path.to_path_buf()))?
        .iter()
        .map(|d| Cell::from(d).text())
        .collect();
    let columns = Columns::locate(path, &header)?;

    let rows = sheet_rows
        .map(|cells| {
            let cells: Vec<Cell> = cells.iter().map(Cell::from).collect();
            columns.row(&cells)
        })
        .collect::<Vec<_>>();

    debug!("Parsed {} worksheet rows", rows.len());
    Ok(rows)
}
