pub mod units;
pub mod rates;
pub mod history;
pub mod projector;
pub mod calculator;
pub mod clock;
pub mod persistence;
pub mod oracle;
pub mod scheduler;
