//! Paged address history.
//!
//! A [`HistorySource`] is the node side: it returns one page of an address's
//! transactions. A [`TransactionHistoryProvider`] walks those pages for a
//! caller, remembering how far it got until [`reset`] starts it over.
//!
//! [`reset`]: TransactionHistoryProvider::reset

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::amount::{Amount, AmountType};
use crate::connector::{Connector, ConnectorError};
use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Unconfirmed,
    Confirmed,
    Failed,
}

/// One transaction as it appears in an address's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub source: String,
    pub destination: String,
    pub amount: Amount,
    pub fee: Option<Amount>,
    pub is_outgoing: bool,
    pub status: TransactionStatus,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub address: String,
    /// Only records moving this asset are returned.
    pub amount_type: AmountType,
    /// Page size asked of the node.
    pub limit: usize,
}

/// A page as the node returned it. Pages are numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub page: usize,
    pub total_pages: usize,
    pub records: Vec<TransactionRecord>,
}

/// A node that can list an address's transactions a page at a time.
#[async_trait]
pub trait HistorySource: Connector {
    async fn address_history(
        &self,
        request: &HistoryRequest,
        page: usize,
    ) -> Result<HistoryPage, ConnectorError>;
}

#[async_trait]
pub trait TransactionHistoryProvider: Send + Sync {
    /// `false` once the last page has been loaded.
    fn can_fetch_history(&self) -> bool;

    /// Loads the page after the last one returned.
    async fn load_history(&self, request: &HistoryRequest) -> Result<Vec<TransactionRecord>, WalletError>;

    /// Forgets the position so the next load starts from the first page.
    fn reset(&self);
}

/// Walks a [`HistorySource`] page by page.
pub struct PagedHistoryProvider<S> {
    source: S,
    /// Last page loaded, 0 before the first load.
    loaded: AtomicUsize,
    total_pages: AtomicUsize,
}

impl<S: HistorySource> PagedHistoryProvider<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            loaded: AtomicUsize::new(0),
            total_pages: AtomicUsize::new(0),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[async_trait]
impl<S: HistorySource> TransactionHistoryProvider for PagedHistoryProvider<S> {
    fn can_fetch_history(&self) -> bool {
        let loaded = self.loaded.load(Ordering::Acquire);
        loaded == 0 || loaded < self.total_pages.load(Ordering::Acquire)
    }

    async fn load_history(&self, request: &HistoryRequest) -> Result<Vec<TransactionRecord>, WalletError> {
        if request.limit == 0 {
            return Err(WalletError::HistoryLoadFailure("page size must be > 0".into()));
        }
        if !self.can_fetch_history() {
            debug!(address = %request.address, "history exhausted");
            return Ok(Vec::new());
        }

        let next = self.loaded.load(Ordering::Acquire) + 1;
        let page = self
            .source
            .address_history(request, next)
            .await
            .map_err(|err| match err {
                ConnectorError::Transport(msg) => WalletError::Transport(msg),
                other => WalletError::HistoryLoadFailure(other.to_string()),
            })?;

        self.loaded.fetch_max(page.page.max(next), Ordering::AcqRel);
        self.total_pages.store(page.total_pages, Ordering::Release);

        let received = page.records.len();
        let records: Vec<TransactionRecord> = page
            .records
            .into_iter()
            .filter(|r| r.amount.amount_type == request.amount_type)
            .collect();
        debug!(
            host = self.source.host(),
            page = next,
            total_pages = page.total_pages,
            received,
            kept = records.len(),
            "history page loaded"
        );
        Ok(records)
    }

    fn reset(&self) {
        self.loaded.store(0, Ordering::Release);
        self.total_pages.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Token;
    use crate::connector::{FeeRequest, RawFeeData, StateSnapshot};
    use crate::types::Chain;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    /// Serves a fixed number of pages and records which were asked for.
    struct Pages {
        total: usize,
        fail: Mutex<Option<ConnectorError>>,
        asked: Mutex<Vec<usize>>,
    }

    impl Pages {
        fn new(total: usize) -> Self {
            Self {
                total,
                fail: Mutex::new(None),
                asked: Mutex::new(Vec::new()),
            }
        }
    }

    fn record(hash: &str, amount: Amount) -> TransactionRecord {
        TransactionRecord {
            hash: hash.into(),
            source: "0xowner".into(),
            destination: "0xdest".into(),
            amount,
            fee: None,
            is_outgoing: true,
            status: TransactionStatus::Confirmed,
            date: None,
        }
    }

    fn usdc() -> Token {
        Token {
            symbol: "USDC".into(),
            contract_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".into(),
            decimals: 6,
        }
    }

    #[async_trait]
    impl Connector for Pages {
        fn host(&self) -> &str {
            "pages"
        }

        async fn get_state(&self, _: &str, _: &[Token], _: &[String]) -> Result<StateSnapshot, ConnectorError> {
            Err(ConnectorError::Transport("unused".into()))
        }

        async fn estimate_fee(&self, _: &FeeRequest) -> Result<RawFeeData, ConnectorError> {
            Err(ConnectorError::Transport("unused".into()))
        }

        async fn broadcast(&self, _: &[u8]) -> Result<String, ConnectorError> {
            Err(ConnectorError::Transport("unused".into()))
        }
    }

    #[async_trait]
    impl HistorySource for Pages {
        async fn address_history(
            &self,
            _request: &HistoryRequest,
            page: usize,
        ) -> Result<HistoryPage, ConnectorError> {
            if let Some(err) = self.fail.lock().unwrap().take() {
                return Err(err);
            }
            self.asked.lock().unwrap().push(page);
            Ok(HistoryPage {
                page,
                total_pages: self.total,
                records: vec![
                    record(&format!("coin-{page}"), Amount::coin(Chain::Ethereum, dec!(0.1))),
                    record(&format!("usdc-{page}"), Amount::token(&usdc(), dec!(5))),
                ],
            })
        }
    }

    fn request(amount_type: AmountType) -> HistoryRequest {
        HistoryRequest {
            address: "0xowner".into(),
            amount_type,
            limit: 20,
        }
    }

    #[tokio::test]
    async fn walks_pages_until_exhausted() {
        let history = PagedHistoryProvider::new(Pages::new(2));
        assert!(history.can_fetch_history());

        let first = history.load_history(&request(AmountType::Coin)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].hash, "coin-1");
        assert!(history.can_fetch_history());

        let second = history.load_history(&request(AmountType::Coin)).await.unwrap();
        assert_eq!(second[0].hash, "coin-2");
        assert!(!history.can_fetch_history());

        assert!(history.load_history(&request(AmountType::Coin)).await.unwrap().is_empty());
        assert_eq!(*history.source().asked.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn reset_starts_over() {
        let history = PagedHistoryProvider::new(Pages::new(1));
        history.load_history(&request(AmountType::Coin)).await.unwrap();
        assert!(!history.can_fetch_history());

        history.reset();
        assert!(history.can_fetch_history());
        history.load_history(&request(AmountType::Coin)).await.unwrap();
        assert_eq!(*history.source().asked.lock().unwrap(), vec![1, 1]);
    }

    #[tokio::test]
    async fn keeps_only_the_requested_asset() {
        let history = PagedHistoryProvider::new(Pages::new(1));
        let records = history
            .load_history(&request(AmountType::Token(usdc())))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hash, "usdc-1");
    }

    #[tokio::test]
    async fn failed_load_keeps_position() {
        let history = PagedHistoryProvider::new(Pages::new(3));
        *history.source().fail.lock().unwrap() = Some(ConnectorError::InvalidResponse("no txs".into()));

        let err = history.load_history(&request(AmountType::Coin)).await.unwrap_err();
        assert!(matches!(err, WalletError::HistoryLoadFailure(_)));

        let records = history.load_history(&request(AmountType::Coin)).await.unwrap();
        assert_eq!(records[0].hash, "coin-1");
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let history = PagedHistoryProvider::new(Pages::new(1));
        let mut req = request(AmountType::Coin);
        req.limit = 0;
        assert!(history.load_history(&req).await.is_err());
        assert!(history.source().asked.lock().unwrap().is_empty());
    }
}
