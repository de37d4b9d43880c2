pub mod constants;
pub mod dates;
