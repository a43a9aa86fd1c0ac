pub mod compactor;
pub mod config;
pub mod endorsement;
pub mod engine;
pub mod index;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod packing;
pub mod wal;
pub mod wire;
