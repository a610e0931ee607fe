use std::collections::HashMap;

use futures::StreamExt;
use tracing::debug;

use crate::domain::{CommandStream, DeadLetterQueue, Error, KindName, Notifier, TransactionId};
use crate::engine::Engine;
use crate::ingestion::Command;
use crate::repository::MemoryRepository;

/// Drives an [`Engine`] over the in-memory store from a command stream.
/// Later rows address transactions by the reference their create row gave.
pub struct Replay<N, D>
where
    N: Notifier,
    D: DeadLetterQueue,
{
    engine: Engine<MemoryRepository, N, D>,
    references: HashMap<String, (TransactionId, KindName)>,
}

impl<N, D> Replay<N, D>
where
    N: Notifier,
    D: DeadLetterQueue,
{
    pub fn new(engine: Engine<MemoryRepository, N, D>) -> Self {
        Self {
            engine,
            references: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &Engine<MemoryRepository, N, D> {
        &self.engine
    }

    /// Applies every command. Failed commands go to the dead-letter queue and
    /// processing continues.
    pub async fn run<I>(&mut self, input: &mut I) -> Result<(), Error>
    where
        I: CommandStream<Command = Command>,
    {
        let mut commands = input.stream();

        while let Some(command) = commands.next().await {
            match command {
                Ok(command) => match self.apply(command).await {
                    Ok(()) => {}
                    Err(e) => self.engine.dlq().report(&e),
                },
                Err(e) => self.engine.dlq().report(&e),
            }
        }

        Ok(())
    }

    fn lookup(&self, reference: &str) -> Result<(TransactionId, KindName), Error> {
        self.references
            .get(reference)
            .copied()
            .ok_or_else(|| Error::Ingestion(format!("unknown transaction reference: {reference}")))
    }

    async fn apply(&mut self, command: Command) -> Result<(), Error> {
        match command {
            Command::Seed(owner) => {
                debug!(owner = %owner.id, role = %owner.role(), "seeding owner");
                self.engine.repository().seed(owner).await;
            }
            Command::Create {
                owner,
                intent,
                reference,
            } => {
                let tx = self.engine.create_transaction(&owner, intent).await?;
                if let Some(reference) = reference {
                    self.references.insert(reference, (tx.id, tx.kind_name()));
                }
            }
            Command::Match { reference } => {
                let (id, kind) = self.lookup(&reference)?;
                self.engine.match_counterparty(id, kind).await?;
            }
            Command::Respond { reference, status } => {
                let (id, kind) = self.lookup(&reference)?;
                self.engine.respond_to_transaction(id, kind, status).await?;
            }
        }
        Ok(())
    }
}
