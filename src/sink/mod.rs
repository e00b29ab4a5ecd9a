pub mod csv_store;
pub mod sheet;

pub use sheet::GoogleSheets;
