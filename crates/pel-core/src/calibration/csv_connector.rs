//! CSV data loading for calibration (spec §5). Loads a table, extracts a
//! named column as `f64` samples, and applies a missing-value policy before
//! handing data to `fit`.

use crate::error::PelError;
use std::collections::HashMap;
use std::path::Path;

/// How to handle a missing (empty/unparseable) cell in a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    Drop,
    Mean,
    Median,
    ForwardFill,
    Fill(f64),
}

pub struct CsvTable {
    pub columns: HashMap<String, Vec<Option<f64>>>,
    pub row_count: usize,
}

/// Load a CSV file and parse every column as `Option<f64>` (`None` for an
/// empty or non-numeric cell). Columns that are never numeric anywhere
/// (e.g. a label column) are skipped.
pub fn load_csv(path: &Path) -> Result<CsvTable, PelError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut raw: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record?;
        raw.push(record.iter().map(str::to_string).collect());
    }

    let mut columns: HashMap<String, Vec<Option<f64>>> = HashMap::new();
    for (i, header) in headers.iter().enumerate() {
        let values: Vec<Option<f64>> = raw
            .iter()
            .map(|row| row.get(i).and_then(|cell| cell.trim().parse::<f64>().ok()))
            .collect();
        columns.insert(header.clone(), values);
    }

    Ok(CsvTable { columns, row_count: raw.len() })
}

/// Apply a missing-value policy and return the cleaned column as plain `f64`s.
pub fn apply_missing_value_policy(values: &[Option<f64>], policy: MissingValuePolicy) -> Vec<f64> {
    match policy {
        MissingValuePolicy::Drop => values.iter().filter_map(|v| *v).collect(),
        MissingValuePolicy::Mean => {
            let present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
            let mean = present.iter().sum::<f64>() / present.len().max(1) as f64;
            values.iter().map(|v| v.unwrap_or(mean)).collect()
        }
        MissingValuePolicy::Median => {
            let mut present: Vec<f64> = values.iter().filter_map(|v| *v).collect();
            present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let median = if present.is_empty() {
                0.0
            } else {
                present[present.len() / 2]
            };
            values.iter().map(|v| v.unwrap_or(median)).collect()
        }
        MissingValuePolicy::ForwardFill => {
            let mut last = 0.0;
            values
                .iter()
                .map(|v| {
                    if let Some(x) = v {
                        last = *x;
                    }
                    last
                })
                .collect()
        }
        MissingValuePolicy::Fill(fill_value) => values.iter().map(|v| v.unwrap_or(fill_value)).collect(),
    }
}

/// Extract a column by name after applying a missing-value policy.
pub fn extract_column(table: &CsvTable, column: &str, policy: MissingValuePolicy) -> Result<Vec<f64>, PelError> {
    let values = table
        .columns
        .get(column)
        .ok_or_else(|| PelError::Calibration(format!("column '{column}' not found in CSV")))?;
    Ok(apply_missing_value_policy(values, policy))
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierMethod {
    Iqr,
    ZScore,
}

/// Drop points more than `threshold` IQRs (or z-score units) from the center.
pub fn filter_outliers(data: &[f64], method: OutlierMethod, threshold: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    match method {
        OutlierMethod::Iqr => {
            let mut sorted = data.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let q1 = quantile(&sorted, 0.25);
            let q3 = quantile(&sorted, 0.75);
            let iqr = q3 - q1;
            let lower = q1 - threshold * iqr;
            let upper = q3 + threshold * iqr;
            data.iter().copied().filter(|v| *v >= lower && *v <= upper).collect()
        }
        OutlierMethod::ZScore => {
            let mean = data.iter().sum::<f64>() / data.len() as f64;
            let std = (data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / data.len() as f64).sqrt();
            if std == 0.0 {
                return data.to_vec();
            }
            data.iter().copied().filter(|v| ((v - mean) / std).abs() <= threshold).collect()
        }
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_csv(contents: &str) -> tempfile_path::TempCsv {
        tempfile_path::TempCsv::new(contents)
    }

    mod tempfile_path {
        use std::io::Write;
        use std::path::PathBuf;

        pub struct TempCsv {
            pub path: PathBuf,
        }

        impl TempCsv {
            pub fn new(contents: &str) -> Self {
                let path = std::env::temp_dir().join(format!("pel_calib_test_{}.csv", std::process::id()));
                let mut f = std::fs::File::create(&path).unwrap();
                f.write_all(contents.as_bytes()).unwrap();
                TempCsv { path }
            }
        }

        impl Drop for TempCsv {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn loads_numeric_column_and_extracts_values() {
        let tmp = write_temp_csv("churn,region\n0.05,east\n0.07,west\n0.06,east\n");
        let table = load_csv(&tmp.path).unwrap();
        let values = extract_column(&table, "churn", MissingValuePolicy::Drop).unwrap();
        assert_eq!(values, vec![0.05, 0.07, 0.06]);
    }

    #[test]
    fn missing_cells_are_dropped_by_default() {
        let tmp = write_temp_csv("x\n1.0\n\n3.0\n");
        let table = load_csv(&tmp.path).unwrap();
        let values = extract_column(&table, "x", MissingValuePolicy::Drop).unwrap();
        assert_eq!(values, vec![1.0, 3.0]);
    }

    #[test]
    fn missing_cells_filled_with_mean() {
        let tmp = write_temp_csv("x\n1.0\n\n3.0\n");
        let table = load_csv(&tmp.path).unwrap();
        let values = extract_column(&table, "x", MissingValuePolicy::Mean).unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn unknown_column_is_an_error() {
        let tmp = write_temp_csv("x\n1.0\n");
        let table = load_csv(&tmp.path).unwrap();
        assert!(extract_column(&table, "missing", MissingValuePolicy::Drop).is_err());
    }

    #[test]
    fn iqr_outlier_filtering_removes_extreme_point() {
        let data = vec![10.0, 11.0, 9.0, 10.5, 9.5, 1000.0];
        let cleaned = filter_outliers(&data, OutlierMethod::Iqr, 1.5);
        assert!(!cleaned.contains(&1000.0));
    }
}
