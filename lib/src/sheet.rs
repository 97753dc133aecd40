use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use serde_json::{Map, Value};

use crate::delivery::Layout;
use crate::Error;

/// One data row of the send list, keyed by canonical column name.
#[derive(Clone, Debug)]
pub struct Row {
    /// 1-based line in the source sheet
    pub line: usize,
    pub fields: Map<String, Value>,
}

/// Read the send list from `path`.
///
/// `.csv` files are read directly and `sheet` is ignored. Anything else is
/// opened as a workbook and `sheet` must exist in it.
pub fn read_rows(path: &Path, sheet: &str, layout: Layout) -> Result<Vec<Row>, Error> {
    if !path.is_file() {
        return Err(Error::Sheet(format!("No such file: {}", path.display())));
    }

    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let grid = if is_csv {
        read_csv(path)?
    } else {
        read_workbook(path, sheet)?
    };

    let rows = rows_from_grid(grid, layout)?;
    log::debug!("Read {} row(s) from {}", rows.len(), path.display());

    Ok(rows)
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut grid = Vec::new();
    for record in reader.records() {
        grid.push(record?.iter().map(String::from).collect());
    }

    Ok(grid)
}

fn read_workbook(path: &Path, sheet: &str) -> Result<Vec<Vec<String>>, Error> {
    let mut workbook = open_workbook_auto(path)?;

    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(Error::Sheet(format!(
            "Sheet {:?} not found in {} (available: {})",
            sheet,
            path.display(),
            workbook.sheet_names().join(", ")
        )));
    }

    let range = workbook.worksheet_range(sheet)?;

    // The range starts at the first used cell, not at A1
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

    let mut grid = vec![Vec::new(); first_row];
    for row in range.rows() {
        grid.push(row.iter().map(cell_to_string).collect());
    }

    Ok(grid)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // f64 Display already drops a trailing ".0"
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}

/// Turn raw cells into rows: skip the layout's banner rows, take the next
/// row as the header, rename headers, and fill short rows with "".
fn rows_from_grid(grid: Vec<Vec<String>>, layout: Layout) -> Result<Vec<Row>, Error> {
    let header_idx = layout.skip_rows();

    let headers: Vec<String> = match grid.get(header_idx) {
        Some(cells) => cells
            .iter()
            .map(|cell| {
                let cell = cell.trim_start_matches('\u{feff}').trim();
                layout.canonical_header(cell).to_string()
            })
            .collect(),
        None => {
            return Err(Error::Sheet(format!(
                "Header row {} not found",
                header_idx + 1
            )))
        }
    };

    let mut rows = Vec::new();

    for (idx, cells) in grid.into_iter().enumerate().skip(header_idx + 1) {
        if cells.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }

        let mut fields = Map::new();
        for (col, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = cells.get(col).cloned().unwrap_or_default();
            fields.insert(header.clone(), Value::String(value));
        }

        rows.push(Row {
            line: idx + 1,
            fields,
        });
    }

    Ok(rows)
}
