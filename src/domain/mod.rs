pub mod account;
pub mod error;
pub mod props;
pub mod transfer;
