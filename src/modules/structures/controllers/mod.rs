pub mod structure_controller;
