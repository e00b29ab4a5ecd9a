pub mod compose;
pub mod fetch;
pub mod suburbs;

pub use compose::combine_images;
pub use fetch::{fetch_all, fetch_chart};
pub use suburbs::{read_suburbs, Suburb};
