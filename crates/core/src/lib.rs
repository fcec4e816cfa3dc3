pub mod config;
pub mod config_loader;
pub mod error;
pub mod ltv;
pub mod metrics;
pub mod models;
pub mod traits;

pub use config::{
    AppConfig, AssetPair, AutomationConfig, BinanceConfig, DatabaseConfig, StrategyConfig,
    StrategyParams,
};
pub use config_loader::ConfigLoader;
pub use error::{CycleError, GatewayError};
pub use ltv::{loan_to_value, repay_amount, split_borrow_legs, BorrowLeg, RiskTier};
pub use metrics::{portfolio_metrics, project_yield, PortfolioMetrics, RiskLevel, YieldProjection};
pub use models::{
    AlertSeverity, AssetValuation, EarnPosition, EarnProductKind, EarnStatus, LoanPosition,
    LoanStatus, Portfolio, PortfolioSnapshot, PortfolioStatus, SystemAlert, Transaction,
    TransactionKind,
};
pub use traits::{
    AccountInfo, AlertDispatcher, EarnBalance, EarnBalances, ExchangeGateway, LoanBalance,
    OrderSide, PersistenceStore, SpotBalance, WalletKind,
};
