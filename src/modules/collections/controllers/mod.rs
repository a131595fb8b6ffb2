pub mod collection_controller;
