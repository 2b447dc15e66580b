/// Shared building blocks for PlayOn DL: models, remote wire protocol,
/// error taxonomy and the download ledger.
pub mod api_protocol;
pub mod db;
pub mod errors;
pub mod models;
