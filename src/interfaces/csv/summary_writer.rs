use crate::domain::account::BankAccount;
use std::io::Write;

/// Writes the closing account table as CSV.
pub struct SummaryWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SummaryWriter<W> {
    pub fn new(target: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(target),
        }
    }

    /// Writes a header row followed by one row per account.
    pub fn write_accounts(&mut self, accounts: &[BankAccount]) -> Result<(), csv::Error> {
        self.writer
            .write_record(["account_number", "user_id", "title", "balance", "status"])?;
        for account in accounts {
            let balance = account.balance.to_string();
            self.writer.write_record([
                account.account_number.as_str(),
                account.user_id.as_str(),
                account.title.as_str(),
                balance.as_str(),
                account.status.as_str(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
