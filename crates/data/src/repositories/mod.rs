pub mod alert_repo;
pub mod earn_repo;
pub mod loan_repo;
pub mod portfolio_repo;
pub mod transaction_repo;

pub use alert_repo::AlertRepository;
pub use earn_repo::EarnPositionRepository;
pub use loan_repo::LoanPositionRepository;
pub use portfolio_repo::PortfolioRepository;
pub use transaction_repo::TransactionRepository;
