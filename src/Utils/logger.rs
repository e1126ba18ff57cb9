use csv::Writer;
use nalgebra::DVector;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

/// column titles: `arg` followed by `headers`, or `x0, x1, ...` when `headers` is empty
fn titles(headers: &[String], n: usize, arg: &str) -> Vec<String> {
    let mut headers_with_t = Vec::with_capacity(n + 1);
    headers_with_t.push(arg.to_string());
    if headers.is_empty() {
        headers_with_t.extend((0..n).map(|i| format!("x{}", i)));
    } else {
        headers_with_t.extend(headers.iter().cloned());
    }
    headers_with_t
}

fn row(t: f64, x: &DVector<f64>) -> Vec<String> {
    let mut row_data = Vec::with_capacity(x.len() + 1);
    row_data.push(t.to_string());
    row_data.extend(x.iter().map(|val| val.to_string()));
    row_data
}

/// Writes the solution as a tab separated table, one time point per line.
pub fn save_solution_to_file<P: AsRef<Path>>(
    t: &[f64],
    x: &[DVector<f64>],
    headers: &[String],
    filename: P,
    arg: &str,
) -> io::Result<()> {
    let mut file = File::create(filename)?;
    let n = x.first().map(|xi| xi.len()).unwrap_or(0);
    writeln!(file, "{}", titles(headers, n, arg).join("\t"))?;
    for (ti, xi) in t.iter().zip(x.iter()) {
        writeln!(file, "{}", row(*ti, xi).join("\t"))?;
    }
    Ok(())
}

/// Writes the solution as CSV, one time point per record.
pub fn save_solution_to_csv<P: AsRef<Path>>(
    t: &[f64],
    x: &[DVector<f64>],
    headers: &[String],
    filename: P,
    arg: &str,
) -> io::Result<()> {
    let file = File::create(filename)?;
    let mut writer = Writer::from_writer(file);
    let n = x.first().map(|xi| xi.len()).unwrap_or(0);
    writer.write_record(&titles(headers, n, arg))?;
    for (ti, xi) in t.iter().zip(x.iter()) {
        writer.write_record(&row(*ti, xi))?;
    }
    writer.flush()?;
    Ok(())
}
