use crate::domain::ids::UserId;
use crate::domain::money::Money;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::io::Read;

/// One row of a bulk deposit file: `user,amount,reference`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DepositRecord {
    pub user: UserId,
    pub amount: Money,
    pub reference: Option<String>,
}

/// Reads deposit rows from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over
/// `Result<DepositRecord>`, so a bad row surfaces as one error without
/// stopping the rest of the file.
pub struct DepositReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> DepositReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the rows in file order.
    pub fn deposits(self) -> impl Iterator<Item = Result<DepositRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(Error::from))
    }
}
