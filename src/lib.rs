pub mod ctl;
pub mod loaders;
pub mod volume;
pub mod writer;
