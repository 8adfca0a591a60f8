//! Service container wiring the ledger components to one store
//!
//! Every component receives its collaborators at construction time. Tests build
//! the container over a [`MemoryStore`]; the binary opens RocksDB from config.

use crate::{
    config::{ConfigLoader, LedgerConfig, StoreBackend},
    errors::{ConfigurationError, LedgerResult},
    games::{
        betting::{BetReceipt, BettingService},
        expander::Selector,
        session_clock::SessionClock,
        settlement::{SettlementEngine, SettlementReport},
        status::GameStatusController,
        types::{Account, GameStatus, HistoryEntry, Role, Session, Wager, WinResult},
    },
    history::{AuditLog, Page},
    ledger::AccountLedger,
    metrics::LedgerMetrics,
    storage::{MemoryStore, RocksStore, SharedStore},
    wager_store::WagerStore,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// All ledger operations behind one handle
pub struct LedgerServices {
    config: LedgerConfig,
    accounts: Arc<AccountLedger>,
    wagers: Arc<WagerStore>,
    status: Arc<GameStatusController>,
    audit: AuditLog,
    betting: BettingService,
    settlement: SettlementEngine,
    metrics: Arc<LedgerMetrics>,
}

impl LedgerServices {
    /// Open the configured backend and wire the services over it
    pub fn open(config: LedgerConfig) -> LedgerResult<Self> {
        let store: SharedStore = match config.storage.backend {
            StoreBackend::Rocks => Arc::new(RocksStore::new_with_config(&config.storage)?),
            StoreBackend::Memory => MemoryStore::shared(),
        };
        Self::with_store(config, store)
    }

    pub fn with_store(config: LedgerConfig, store: SharedStore) -> LedgerResult<Self> {
        config.validate().map_err(ConfigurationError::from)?;
        let clock = SessionClock::from_config(&config.session).map_err(ConfigurationError::from)?;
        let metrics = Arc::new(LedgerMetrics::new());

        let accounts = Arc::new(AccountLedger::new(
            store.clone(),
            config.betting.max_commit_attempts,
        ));
        let wagers = Arc::new(WagerStore::new(
            store.clone(),
            config.settlement.scan_page_size,
            config.settlement.max_commit_attempts,
        ));
        let status = Arc::new(GameStatusController::new(
            store.clone(),
            clock,
            config.betting.max_commit_attempts,
        ));
        let betting = BettingService::new(
            store.clone(),
            accounts.clone(),
            status.clone(),
            config.betting.clone(),
            metrics.clone(),
        );
        let settlement = SettlementEngine::new(
            store.clone(),
            accounts.clone(),
            wagers.clone(),
            status.clone(),
            config.settlement.clone(),
            metrics.clone(),
        );

        tracing::info!(
            backend = ?config.storage.backend,
            utc_offset_minutes = config.session.utc_offset_minutes,
            "Ledger services ready"
        );

        Ok(Self {
            audit: AuditLog::new(store),
            config,
            accounts,
            wagers,
            status,
            betting,
            settlement,
            metrics,
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }

    pub fn clock(&self) -> &SessionClock {
        self.status.clock()
    }

    pub fn status_controller(&self) -> &GameStatusController {
        &self.status
    }

    // Accounts

    pub fn register(&self, id: &str, role: Role, now: DateTime<Utc>) -> LedgerResult<Account> {
        self.accounts.register(id, role, now)
    }

    pub fn get_account(&self, id: &str) -> LedgerResult<Account> {
        self.accounts.get_account(id)
    }

    pub fn top_up(&self, id: &str, amount: u64, now: DateTime<Utc>) -> LedgerResult<Account> {
        self.accounts.top_up(id, amount, now)
    }

    pub fn withdraw(&self, id: &str, amount: u64, now: DateTime<Utc>) -> LedgerResult<Account> {
        self.accounts.withdraw(id, amount, now)
    }

    // Game

    pub fn game_status(&self, now: DateTime<Utc>) -> LedgerResult<GameStatus> {
        self.status.game_status(now)
    }

    pub fn set_manually_closed(&self, closed: bool, now: DateTime<Utc>) -> LedgerResult<GameStatus> {
        self.status.set_manually_closed(closed, now)
    }

    pub fn place_bet(
        &self,
        account: &str,
        selector: &Selector,
        stake: u64,
        now: DateTime<Utc>,
    ) -> LedgerResult<BetReceipt> {
        self.betting.place_bet(account, selector, stake, now)
    }

    /// Settle `half` with `multiplier`, or the configured default when `None`
    pub fn settle(
        &self,
        winning_number: &str,
        multiplier: Option<u64>,
        half: Session,
        now: DateTime<Utc>,
    ) -> LedgerResult<SettlementReport> {
        let multiplier = multiplier.unwrap_or_else(|| self.settlement.default_multiplier());
        self.settlement.settle(winning_number, multiplier, half, now)
    }

    // Records

    pub fn get_wager(&self, id: &str) -> LedgerResult<Option<Wager>> {
        self.wagers.get_wager(id)
    }

    pub fn pending_for(&self, owner: &str) -> LedgerResult<Vec<Wager>> {
        self.wagers.pending_for(owner)
    }

    pub fn history_page(
        &self,
        owner: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> LedgerResult<Page<HistoryEntry>> {
        self.audit.history_page(owner, cursor, limit)
    }

    pub fn results_page(&self, cursor: Option<&str>, limit: usize) -> LedgerResult<Page<WinResult>> {
        self.audit.results_page(cursor, limit)
    }
}

/// Builder for configured service containers
pub struct ServiceBuilder {
    config_path: Option<String>,
    config: Option<LedgerConfig>,
    store_override: Option<SharedStore>,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            config_path: None,
            config: None,
            store_override: None,
        }
    }

    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the store implementation (useful for testing)
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store_override = Some(store);
        self
    }

    pub fn build(self) -> LedgerResult<LedgerServices> {
        let config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => ConfigLoader::new().with_path(path).load()?,
            (None, None) => ConfigLoader::new().load()?,
        };

        match self.store_override {
            Some(store) => LedgerServices::with_store(config, store),
            None => LedgerServices::open(config),
        }
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
