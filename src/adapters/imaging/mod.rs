pub mod augment;
pub mod io;
