use color_eyre::eyre::{Result, eyre};
use csv::{ReaderBuilder, Trim};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One command row: `type,user,counterparty,transfer,amount`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CsvCommandRecord {
    #[serde(rename = "type")]
    pub command: CommandType,
    #[serde(rename = "user")]
    pub user_id: i64,
    pub counterparty: Option<i64>,
    #[serde(rename = "transfer")]
    pub transfer_id: Option<i64>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Open,
    Send,
    Request,
    Approve,
    Reject,
}

pub fn read_input<D: serde::de::DeserializeOwned>(
    file_path: &str,
) -> Result<impl Iterator<Item = Result<D>>> {
    let reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(file_path)
        .map_err(|e| eyre!("Could not read input file: {}", e))?;

    Ok(reader
        .into_deserialize()
        .map(|r| r.map_err(|ee| eyre!("Error parsing row: {}", ee))))
}
