pub mod receipt_repository;

pub use receipt_repository::{
    MySqlReceiptRepository, ReceiptListFilter, ReceiptRepository, ReceiptStats,
};
