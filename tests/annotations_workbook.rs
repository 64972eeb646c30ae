//! Coding sheets read through the spreadsheet path.

use std::path::Path;

use casme_prep::annotations::{APEX_COLUMN, AnnotationError, AnnotationRow, load_annotations};
use rust_xlsxwriter::Workbook;

const HEADER: [&str; 6] = [
    "Subject",
    "Filename",
    "Estimated Emotion",
    "OnsetFrame",
    "ApexFrame",
    "OffsetFrame",
];

fn write_coding_sheet(path: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in HEADER.iter().enumerate() {
        sheet.write_string(0, col as u16, *name).unwrap();
    }

    // Numeric subject and frames, as exported by Excel
    sheet.write_number(1, 0, 1).unwrap();
    sheet.write_string(1, 1, "EP02_01f").unwrap();
    sheet.write_string(1, 2, "happiness").unwrap();
    sheet.write_number(1, 3, 46).unwrap();
    sheet.write_number(1, 4, 59).unwrap();
    sheet.write_number(1, 5, 86).unwrap();

    // Text subject with the `/` placeholder for a missing apex
    sheet.write_string(2, 0, "04").unwrap();
    sheet.write_string(2, 1, " EP12_01f ").unwrap();
    sheet.write_string(2, 2, "disgust").unwrap();
    sheet.write_number(2, 3, 1).unwrap();
    sheet.write_string(2, 4, "/").unwrap();
    sheet.write_number(2, 5, 80).unwrap();

    // Blank apex cell and a negative onset
    sheet.write_number(3, 0, 26).unwrap();
    sheet.write_string(3, 1, "EP18_50").unwrap();
    sheet.write_number(3, 3, -1).unwrap();
    sheet.write_number(3, 5, 12.0).unwrap();

    workbook.save(path).unwrap();
}

#[test]
fn workbook_rows_are_read_in_order() {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let path = tmp.path().join("CASME2-coding.xlsx");
    write_coding_sheet(&path);

    let rows = load_annotations(&path).unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[0],
        AnnotationRow {
            subject: "1".to_string(),
            filename: "EP02_01f".to_string(),
            onset: Some(46),
            apex: Some(59),
            offset: Some(86),
        }
    );
    assert_eq!(
        rows[1],
        AnnotationRow {
            subject: "04".to_string(),
            filename: "EP12_01f".to_string(),
            onset: Some(1),
            apex: None,
            offset: Some(80),
        }
    );
    assert_eq!(rows[2].onset, Some(-1));
    assert_eq!(rows[2].apex, None);
    assert_eq!(rows[2].offset, Some(12));
}

#[test]
fn numeric_subject_builds_padded_folder() {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let path = tmp.path().join("coding.xlsx");
    write_coding_sheet(&path);

    let rows = load_annotations(&path).unwrap();
    let frames = rows[0].key_frames().expect("first row is complete");

    assert_eq!(
        frames.video_dir(Path::new("raw")),
        Path::new("raw").join("sub01").join("EP02_01f")
    );
    assert!(rows[1].key_frames().is_none());
    assert!(rows[2].key_frames().is_none());
}

#[test]
fn workbook_without_apex_column_is_rejected() {
    let tmp = tempfile::tempdir().expect("Failed to create temp dir");
    let path = tmp.path().join("coding.xlsx");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, name) in ["Subject", "Filename", "OnsetFrame", "OffsetFrame"].iter().enumerate() {
        sheet.write_string(0, col as u16, *name).unwrap();
    }
    sheet.write_number(1, 0, 1).unwrap();
    workbook.save(&path).unwrap();

    let err = load_annotations(&path).unwrap_err();
    match err.downcast_ref::<AnnotationError>() {
        Some(AnnotationError::MissingColumn { column, .. }) => assert_eq!(*column, APEX_COLUMN),
        other => panic!("unexpected error: {:?}", other),
    }
}
