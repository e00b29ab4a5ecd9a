use std::path::Path;

use crate::error::{AppError, Result};

const ACCEPTED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

/// One row of the chart input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suburb {
    pub locality: String,
    pub state: String,
    pub post_code: String,
    pub property_type: String,
}

impl Suburb {
    /// `H` for houses, `U` for units, `None` for anything else.
    pub fn property_type_code(&self) -> Option<&'static str> {
        let pt = self.property_type.to_lowercase();
        if pt.contains("house") {
            Some("H")
        } else if pt.contains("unit") {
            Some("U")
        } else {
            None
        }
    }
}

/// Reject anything that is not a tabular file by extension.
pub fn check_extension(path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(AppError::InvalidInput(format!(
            "Input file must be .csv, .xlsx, or .xls. Got: .{ext}"
        )))
    }
}

/// Read suburbs from a CSV with a header row; the first four columns are
/// locality, state, post code and property type.
pub fn read_suburbs(path: &Path) -> Result<Vec<Suburb>> {
    check_extension(path)?;
    if !path.exists() {
        return Err(AppError::InvalidInput(format!(
            "Suburb file '{}' does not exist!",
            path.display()
        )));
    }
    let is_csv = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(AppError::InvalidInput(format!(
            "'{}' is a spreadsheet workbook; export it to .csv first",
            path.display()
        )));
    }

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut suburbs = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let field = |i: usize| row.get(i).unwrap_or("").trim().to_string();
        if row.len() < 4 {
            return Err(AppError::InvalidInput(format!(
                "row {} has {} columns, expected locality, state, post code, property type",
                suburbs.len() + 2,
                row.len()
            )));
        }
        suburbs.push(Suburb {
            locality: field(0),
            state: field(1),
            post_code: field(2),
            property_type: field(3),
        });
    }
    Ok(suburbs)
}
