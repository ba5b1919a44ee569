//! CRDT primitive data structures used inside the therapeutic types.

pub mod gcounter;
pub mod gset;
pub mod lww_register;

pub use gcounter::GCounter;
pub use gset::GSet;
pub use lww_register::LWWRegister;
