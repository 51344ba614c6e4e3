use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io::Read;

/// A phone-number-to-user mapping row.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerRecord {
    pub user_id: String,
    pub phone_number: String,
}

/// An account row with its opening balance.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRecord {
    pub user_id: String,
    pub title: String,
    pub balance: Decimal,
}

/// An outstanding bill row.
#[derive(Debug, Clone, Deserialize)]
pub struct BillRecord {
    pub user_id: String,
    pub bill_type: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    pub due_date: NaiveDate,
}

impl BillRecord {
    /// Bills are due at midnight UTC on their due date.
    pub fn due_at(&self) -> DateTime<Utc> {
        self.due_date.and_time(NaiveTime::MIN).and_utc()
    }
}

/// Reads seed fixtures from a CSV source.
///
/// Handles well-formed CSV as well as rows with padding whitespace.
pub struct SeedReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SeedReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes rows.
    pub fn records<T: DeserializeOwned>(self) -> impl Iterator<Item = Result<T, csv::Error>> {
        self.reader.into_deserialize()
    }
}
