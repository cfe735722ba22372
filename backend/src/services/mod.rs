pub mod defaults;
pub mod mapping;
pub mod master;
pub mod templates;
