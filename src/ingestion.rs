use std::io::Read;
use std::pin::Pin;

use futures::stream::{self, Stream};
use serde::Deserialize;

use crate::domain::{
    Account, CommandStream, Error, Money, Owner, PurseDirection, Role, TransactionStatus,
};
use crate::lifecycle::{
    DepositIntent, ExchangeIntent, Intent, PurseIntent, TransferIntent, WithdrawalIntent,
};

/// One replayable step.
#[derive(Debug, Clone)]
pub enum Command {
    /// Registers an owner, or adds a funded wallet to one.
    Seed(Owner),
    Create {
        owner: String,
        intent: Intent,
        reference: Option<String>,
    },
    Match {
        reference: String,
    },
    Respond {
        reference: String,
        status: TransactionStatus,
    },
}

pub struct CsvReader<R: Read> {
    reader: Option<csv::Reader<R>>,
}

impl<R: Read> CsvReader<R> {
    pub fn new(reader: R) -> Result<Self, Error> {
        let rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        Ok(Self { reader: Some(rdr) })
    }
}

/// Internal shape used only for CSV deserialization.
#[derive(Debug, Default, Deserialize)]
struct CsvRow {
    #[serde(rename = "type")]
    kind: String,
    owner: Option<String>,
    peer: Option<String>,
    currency: Option<String>,
    amount: Option<String>,
    target_currency: Option<String>,
    target_amount: Option<String>,
    channel: Option<String>,
    reference: Option<String>,
}

fn text(field: Option<String>) -> String {
    field.unwrap_or_default()
}

/// Blank amounts read as zero and are rejected by validation later.
fn amount(field: Option<String>) -> Result<Money, Error> {
    match field.as_deref().map(str::trim) {
        None | Some("") => Ok(Money::ZERO),
        Some(raw) => Money::from_decimal_str(raw)
            .ok_or_else(|| Error::Ingestion(format!("invalid amount: {raw}"))),
    }
}

fn required(field: Option<String>, name: &str, kind: &str) -> Result<String, Error> {
    field
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Ingestion(format!("{kind} row needs a {name}")))
}

impl TryFrom<CsvRow> for Command {
    type Error = Error;

    fn try_from(row: CsvRow) -> Result<Self, Self::Error> {
        let kind = row.kind.to_ascii_lowercase();

        let respond = |status| -> Result<Command, Error> {
            Ok(Command::Respond {
                reference: required(row.reference.clone(), "reference", &kind)?,
                status,
            })
        };
        match kind.as_str() {
            "complete" => return respond(TransactionStatus::Completed),
            "cancel" => return respond(TransactionStatus::Cancelled),
            "dispute" => return respond(TransactionStatus::Disputed),
            "match" => {
                return Ok(Command::Match {
                    reference: required(row.reference, "reference", &kind)?,
                });
            }
            _ => {}
        }

        let owner = required(row.owner, "owner", &kind)?;
        let intent = match kind.as_str() {
            "user" | "agent" => {
                let seeded = if kind == "user" {
                    Owner::user(&owner, &owner)
                } else {
                    Owner::agent(&owner, &owner, true)
                };
                let seeded = match row.currency {
                    Some(currency) if !currency.is_empty() => {
                        seeded.with_balance(&currency, amount(row.amount)?)
                    }
                    _ => seeded,
                };
                return Ok(Command::Seed(seeded));
            }
            "transfer" => Intent::Transfer(TransferIntent {
                base_amount: amount(row.amount)?,
                base_currency: text(row.currency),
                amount_sent: amount(row.target_amount)?,
                conv_currency: text(row.target_currency),
                payment_channel: text(row.channel),
                recipient_account: None,
            }),
            "withdrawal" => Intent::Withdrawal(WithdrawalIntent {
                base_amount: amount(row.amount)?,
                base_currency: text(row.currency),
                destination: Some(Account::new(
                    &owner,
                    &text(row.peer),
                    &text(row.channel),
                    Role::User,
                )),
            }),
            "deposit" => Intent::Deposit(DepositIntent {
                base_amount: amount(row.amount)?,
                base_currency: text(row.currency),
                payment_channel: text(row.channel),
            }),
            "exchange" => Intent::Exchange(ExchangeIntent {
                base_amount: amount(row.amount)?,
                base_currency: text(row.currency),
                exchange_amount: amount(row.target_amount)?,
                exchange_currency: text(row.target_currency),
                payment_channel: text(row.channel.clone()),
                agent_account: Some(Account::new(
                    &owner,
                    &text(row.peer),
                    &text(row.channel),
                    Role::Agent,
                )),
                ..Default::default()
            }),
            "crypto_exchange" => Intent::Exchange(ExchangeIntent {
                base_amount: amount(row.amount)?,
                base_currency: text(row.currency),
                exchange_amount: amount(row.target_amount)?,
                exchange_currency: text(row.target_currency),
                is_crypto_exchange: true,
                blockchain_channel: text(row.channel),
                wallet_address: text(row.peer),
                ..Default::default()
            }),
            "pay" | "request" => Intent::Purse(PurseIntent {
                recipient: text(row.peer),
                amount: amount(row.amount)?,
                currency: text(row.currency),
                direction: Some(if kind == "pay" {
                    PurseDirection::Pay
                } else {
                    PurseDirection::Request
                }),
            }),
            other => {
                return Err(Error::Ingestion(format!("Invalid command type: {other}")));
            }
        };

        Ok(Command::Create {
            owner,
            intent,
            reference: row.reference.filter(|r| !r.is_empty()),
        })
    }
}

impl<R: Read + Send + 'static> CommandStream for CsvReader<R> {
    type Command = Command;
    type Stream = Pin<Box<dyn Stream<Item = Result<Command, Error>> + Send>>;

    fn stream(&mut self) -> Self::Stream {
        // Take ownership of the reader so the stream owns all data and is 'static.
        let reader = match self.reader.take() {
            Some(r) => r,
            None => {
                // Already consumed; return an empty stream.
                return Box::pin(stream::iter(Vec::<Result<Command, Error>>::new()));
            }
        };

        // Header is line 1.
        let iter = reader
            .into_deserialize::<CsvRow>()
            .enumerate()
            .map(|(index, row_res)| {
                let line = index + 2;
                match row_res {
                    Ok(row) => Command::try_from(row)
                        .map_err(|e| Error::Ingestion(format!("line {line}: {e}"))),
                    Err(e) => Err(Error::Ingestion(format!(
                        "line {line}: CSV deserialization error: {e}"
                    ))),
                }
            });

        Box::pin(stream::iter(iter))
    }
}
