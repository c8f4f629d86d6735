use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::solution::Solution;
use super::OutputError;
use crate::discretization::DiscretizedModel;
use crate::physics::variables::Key;

/// Write column data with a header row. Shorter columns leave empty cells.
pub fn write_csv<P: AsRef<Path>>(path: P, headers: &[String], data: &[Vec<f64>]) -> io::Result<()> {
    if headers.len() != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Headers count ({}) doesn't match data columns ({})",
                headers.len(),
                data.len()
            ),
        ));
    }

    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "{}", headers.join(","))?;

    let n_rows = data.iter().map(Vec::len).max().unwrap_or(0);
    for i in 0..n_rows {
        let row: Vec<String> = data
            .iter()
            .map(|col| col.get(i).map(|v| format!("{v:.15e}")).unwrap_or_default())
            .collect();
        writeln!(file, "{}", row.join(","))?;
    }
    file.flush()
}

/// One column per requested quantity over the stored time points. Spatially
/// resolved quantities are written entry by entry as `name[i]`.
pub fn write_solution<P: AsRef<Path>>(
    path: P,
    model: &DiscretizedModel,
    solution: &Solution,
    keys: &[Key],
) -> Result<(), OutputError> {
    let mut headers = vec!["Time".to_string()];
    let mut columns = vec![solution.t.clone()];
    for &key in keys {
        let values = solution.variable(model, key)?;
        let width = values.first().map_or(0, |v| v.len());
        for i in 0..width {
            headers.push(if width == 1 {
                key.to_string()
            } else {
                format!("{key}[{i}]")
            });
            columns.push(values.iter().map(|v| v[i]).collect());
        }
    }
    write_csv(path, &headers, &columns)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn ragged_columns_leave_blanks() {
        let path = std::env::temp_dir().join("battery_fv_ragged.csv");
        let headers = ["x".to_string(), "y".to_string()];
        let data = vec![vec![1.0, 2.0], vec![3.0]];

        write_csv(&path, &headers, &data).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "x,y");
        assert!(lines[2].ends_with(','));
        fs::remove_file(&path).ok();
    }

    #[test]
    fn header_count_must_match() {
        let path = std::env::temp_dir().join("battery_fv_mismatch.csv");
        let err = write_csv(&path, &["x".to_string()], &[vec![], vec![]]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
