//! The mapping engine: join-key normalization, master dataset loading,
//! attachment resolution, effective-config layering, and the join itself.

pub mod attachments;
pub mod effective;
pub mod join;
pub mod master;
pub mod normalize;
pub mod run;
pub mod validate;
