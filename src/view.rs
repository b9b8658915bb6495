use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Workbook, Worksheet};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const MASTER_FILE: &str = "master.csv";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.fields {
            hasher.update(key.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        }
        format!("{:x}", hasher.finalize())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.push(k, v);
        }
        row
    }
}

pub fn view_path(views_root: &Path, league_id: u64, until: i32) -> PathBuf {
    views_root.join(format!("league_{league_id}_{until}.csv"))
}

pub fn master_path(views_root: &Path) -> PathBuf {
    views_root.join(MASTER_FILE)
}

pub fn list_views(views_root: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(views_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(Error::io(views_root, err)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| Error::io(views_root, err))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("league_") && name.ends_with(".csv") {
            out.push(entry.path());
        }
    }
    out.sort();
    Ok(out)
}

/// Overwrites `path`. The header is the first row's fields; later rows
/// missing a header field get an empty cell.
pub fn write_view(rows: &[Row], path: &Path) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;
    }
    let Some(first) = rows.first() else {
        fs::write(path, "").map_err(|err| Error::io(path, err))?;
        return Ok(());
    };

    let csv_err = |source: csv::Error| Error::Csv {
        path: path.to_path_buf(),
        source,
    };
    let header: Vec<&str> = first.keys().collect();
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(&header).map_err(csv_err)?;
    for row in rows {
        let record = header.iter().map(|key| row.get(key).unwrap_or(""));
        writer.write_record(record).map_err(csv_err)?;
    }
    writer.flush().map_err(|err| Error::io(path, err))?;
    debug!(path = %path.display(), rows = rows.len(), "view written");
    Ok(())
}

pub fn read_view(path: &Path) -> Result<Vec<Row>> {
    if !path.exists() {
        return Err(Error::NotFound {
            what: format!("view {}", path.display()),
        });
    }
    let corrupt = |err: csv::Error| Error::CacheCorrupt {
        path: path.to_path_buf(),
        message: err.to_string(),
    };
    let mut reader = csv::Reader::from_path(path).map_err(|source| Error::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let header = reader.headers().map_err(corrupt)?.clone();
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.map_err(corrupt)?;
        out.push(header.iter().zip(record.iter()).collect::<Row>());
    }
    Ok(out)
}

/// All rows of every view, exact duplicates dropped (first occurrence wins).
pub fn build_master(view_paths: &[PathBuf]) -> Result<Vec<Row>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut total = 0usize;
    for path in view_paths {
        let rows = read_view(path)?;
        total += rows.len();
        for row in rows {
            if seen.insert(row.content_hash()) {
                out.push(row);
            }
        }
    }
    info!(
        views = view_paths.len(),
        rows = total,
        unique = out.len(),
        "master table built"
    );
    Ok(out)
}

pub fn write_master(views_root: &Path) -> Result<(PathBuf, Vec<Row>)> {
    let views = list_views(views_root)?;
    let rows = build_master(&views)?;
    let path = master_path(views_root);
    write_view(&rows, &path)?;
    Ok((path, rows))
}

/// Inclusive numeric bounds on `field`. With no bound every row passes; with
/// any bound, rows whose field is missing or not a number are dropped.
pub fn apply_range_filter(
    rows: Vec<Row>,
    field: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Vec<Row> {
    if min.is_none() && max.is_none() {
        return rows;
    }
    rows.into_iter()
        .filter(|row| {
            let Some(value) = row.get(field).and_then(|v| v.trim().parse::<f64>().ok()) else {
                return false;
            };
            min.is_none_or(|min| value >= min) && max.is_none_or(|max| value <= max)
        })
        .collect()
}

pub fn export_xlsx(rows: &[Row], path: &Path) -> Result<usize> {
    let mut table: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
    if let Some(first) = rows.first() {
        let header: Vec<String> = first.keys().map(str::to_string).collect();
        for row in rows {
            table.push(
                header
                    .iter()
                    .map(|key| row.get(key).unwrap_or_default().to_string())
                    .collect(),
            );
        }
        table.insert(0, header);
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Players")?;
        write_rows(sheet, &table)?;
    }
    workbook.save(path)?;
    Ok(rows.len())
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet.write_string(row_idx as u32, col_idx as u16, value)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn push_overwrites_existing_field_in_place() {
        let mut r = row(&[("a", "1"), ("b", "2")]);
        r.push("a", "9");
        assert_eq!(r.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(r.get("a"), Some("9"));
    }

    #[test]
    fn hash_depends_on_every_field() {
        let a = row(&[("name", "X"), ("age", "20")]);
        let b = row(&[("name", "X"), ("age", "20")]);
        let c = row(&[("name", "X"), ("age", "20.0")]);
        assert_eq!(a.content_hash(), b.content_hash());
        assert_ne!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn range_filter_without_bounds_passes_everything() {
        let rows = vec![row(&[("age", "")]), row(&[("age", "30")])];
        assert_eq!(apply_range_filter(rows, "age", None, None).len(), 2);
    }

    #[test]
    fn view_path_uses_league_and_until() {
        assert_eq!(
            view_path(Path::new("views"), 47, 2024),
            PathBuf::from("views/league_47_2024.csv")
        );
    }
}
