//! An in-process chain: the runtime state, a transaction pool and block production.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use sh_runtime::{
    genesis_config_presets::GenesisConfig, BlockNumber, DevChain, EventRecord, Phase,
    RuntimeEvent, Transaction,
};
use shp_types::TickNumber;
use sp_runtime::{ApplyExtrinsicResult, DispatchError};
use tokio::{
    sync::{broadcast, oneshot},
    task::JoinHandle,
};

const LOG_TARGET: &str = "in-process-chain";

/// Capacity of the block notification channel. Subscribers lagging further behind miss
/// notifications.
const BLOCK_NOTIFICATION_BUFFER: usize = 1024;

/// When blocks are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealingMode {
    /// A block is produced as soon as a transaction is submitted.
    Instant,
    /// Blocks are only produced when asked for.
    Manual,
}

/// A block that was just imported.
#[derive(Debug, Clone)]
pub struct BlockNotification {
    pub block_number: BlockNumber,
    pub tick: TickNumber,
    pub events: Vec<EventRecord>,
}

/// What happened to a transaction once it made it into a block.
#[derive(Debug, Clone)]
pub struct ExtrinsicInclusion {
    pub block_number: BlockNumber,
    pub tick: TickNumber,
    pub result: ApplyExtrinsicResult,
    /// Events deposited while applying the extrinsic.
    pub events: Vec<RuntimeEvent>,
}

struct PendingTransaction {
    transaction: Transaction,
    watcher: oneshot::Sender<ExtrinsicInclusion>,
}

/// Handle to the chain. Clones share the same state.
#[derive(Clone)]
pub struct InProcessChain {
    state: Arc<Mutex<DevChain>>,
    pool: Arc<Mutex<Vec<PendingTransaction>>>,
    block_tx: broadcast::Sender<BlockNotification>,
    sealing: SealingMode,
}

impl InProcessChain {
    pub fn new(state: DevChain, sealing: SealingMode) -> Self {
        let (block_tx, _) = broadcast::channel(BLOCK_NOTIFICATION_BUFFER);
        Self {
            state: Arc::new(Mutex::new(state)),
            pool: Arc::new(Mutex::new(Vec::new())),
            block_tx,
            sealing,
        }
    }

    pub fn from_genesis(genesis: GenesisConfig, sealing: SealingMode) -> Result<Self, DispatchError> {
        Ok(Self::new(DevChain::from_genesis(genesis)?, sealing))
    }

    pub fn sealing(&self) -> SealingMode {
        self.sealing
    }

    /// Notifications of every block produced from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BlockNotification> {
        self.block_tx.subscribe()
    }

    /// Run `f` against the current state, e.g. a runtime API call.
    ///
    /// The state is locked while `f` runs, so `f` must not block.
    pub fn read<R>(&self, f: impl FnOnce() -> R) -> R {
        self.state.lock().execute_with(f)
    }

    pub fn block_number(&self) -> BlockNumber {
        self.state.lock().block_number()
    }

    pub fn current_tick(&self) -> TickNumber {
        self.state.lock().current_tick()
    }

    pub fn is_ticker_paused(&self) -> bool {
        self.state.lock().is_ticker_paused()
    }

    /// Add a transaction to the pool. The returned receiver resolves once it is in a block.
    pub fn submit(&self, transaction: Transaction) -> oneshot::Receiver<ExtrinsicInclusion> {
        let (watcher, inclusion) = oneshot::channel();
        self.pool.lock().push(PendingTransaction {
            transaction,
            watcher,
        });

        if self.sealing == SealingMode::Instant {
            self.produce_block();
        }

        inclusion
    }

    /// Build a block with every transaction in the pool.
    pub fn produce_block(&self) -> BlockNotification {
        let pending = std::mem::take(&mut *self.pool.lock());
        let (transactions, watchers): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .map(|pending| (pending.transaction, pending.watcher))
            .unzip();

        let (notification, results) = {
            let mut state = self.state.lock();
            let results = state.next_block(transactions);
            let notification = BlockNotification {
                block_number: state.block_number(),
                tick: state.current_tick(),
                events: state.events(),
            };
            (notification, results)
        };

        // Invalid transactions are not in the block, so they take no extrinsic index.
        let mut index = 0u32;
        for (result, watcher) in results.into_iter().zip(watchers) {
            let events = match &result {
                Ok(_) => {
                    let phase = Phase::ApplyExtrinsic(index);
                    index += 1;
                    notification
                        .events
                        .iter()
                        .filter(|record| record.phase == phase)
                        .map(|record| record.event.clone())
                        .collect()
                }
                Err(_) => Vec::new(),
            };

            // The submitter may have stopped waiting.
            let _ = watcher.send(ExtrinsicInclusion {
                block_number: notification.block_number,
                tick: notification.tick,
                result,
                events,
            });
        }

        log::trace!(
            target: LOG_TARGET,
            "Imported block {} at tick {} with {} events",
            notification.block_number,
            notification.tick,
            notification.events.len()
        );

        // Nobody listening is fine.
        let _ = self.block_tx.send(notification.clone());

        notification
    }

    /// Produce blocks until the challenges ticker reaches `tick`.
    ///
    /// Stops early if the ticker is paused, since it would never get there.
    pub fn advance_to_tick(&self, tick: TickNumber) {
        while self.current_tick() < tick && !self.is_ticker_paused() {
            self.produce_block();
        }
    }

    /// Produce a block every `interval` until the returned handle is aborted.
    pub fn spawn_block_production(&self, interval: Duration) -> JoinHandle<()> {
        let chain = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                chain.produce_block();
            }
        })
    }
}
