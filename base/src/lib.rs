//! The `base` crate defines the Propeller-related things which are
//! useful in both an emulator and other associated tools.  The idea
//! is that if you want to write a disassembler or an image checker,
//! it would depend on the base crate but would not need to depend on
//! the emulator library itself.

pub mod clockmode;
pub mod condition;
pub mod image;
pub mod instruction;
pub mod prelude;
pub mod registers;
