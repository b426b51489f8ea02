#[allow(clippy::cast_possible_truncation)]
mod bitwise;

#[allow(clippy::cast_possible_truncation)]
pub mod controller;
pub mod error;
pub mod io_device;
pub mod irq_line;
pub mod registers;
