use serde_json::Value;
use std::fs::File;
use std::io::{Error, Write};
use std::path::Path;

/// Writes a JSONL call log, one record per line.
pub fn write_call_log(path: &Path, records: &[Value]) -> Result<(), Error> {
    let mut file = File::create(path)?;
    for record in records {
        writeln!(file, "{record}")?;
    }
    Ok(())
}

/// Writes an account seed CSV from `(user_id, title, balance)` rows.
pub fn write_accounts_csv(path: &Path, rows: &[(&str, &str, &str)]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["user_id", "title", "balance"])?;
    for (user_id, title, balance) in rows {
        wtr.write_record([*user_id, *title, *balance])?;
    }

    wtr.flush()?;
    Ok(())
}
