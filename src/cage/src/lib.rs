pub mod cage;
pub mod err_const;
pub mod memory;

pub use cage::*;
pub use err_const::*;
pub use memory::*;
