pub mod structure_service;

pub use structure_service::StructureService;
