//! CSV import of bulk deposits and CSV export of a savings ledger.

pub mod deposit_reader;
pub mod ledger_writer;
