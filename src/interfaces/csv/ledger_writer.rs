use crate::domain::savings::SavingsTransaction;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct LedgerRow<'a> {
    seq: u64,
    kind: &'static str,
    amount: i64,
    reference: &'a str,
    layaway: String,
    created_at: String,
}

impl<'a> From<&'a SavingsTransaction> for LedgerRow<'a> {
    fn from(entry: &'a SavingsTransaction) -> Self {
        Self {
            seq: entry.seq,
            kind: entry.kind.as_str(),
            amount: entry.amount,
            reference: entry.reference.as_deref().unwrap_or_default(),
            layaway: entry.layaway.map(|id| id.to_string()).unwrap_or_default(),
            created_at: entry.created_at.to_rfc3339(),
        }
    }
}

/// Writes ledger entries as CSV with a header row.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_entries<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a SavingsTransaction>,
    ) -> Result<()> {
        for entry in entries {
            self.writer.serialize(LedgerRow::from(entry))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
