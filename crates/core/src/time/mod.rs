pub mod as_of_date;

pub use as_of_date::{local_date, resolve_as_of_date};
