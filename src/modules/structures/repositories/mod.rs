pub mod structure_repository;

pub use structure_repository::{
    MySqlStructureRepository, StructureListFilter, StructureRepository,
};
