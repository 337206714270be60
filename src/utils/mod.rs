pub mod query;
pub mod urls;
