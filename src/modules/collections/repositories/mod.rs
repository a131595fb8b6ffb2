pub mod collection_repository;

pub use collection_repository::{
    CollectionPatch, CollectionRepository, CollectionStats, CollectionStatsFilter,
    MySqlCollectionRepository,
};
