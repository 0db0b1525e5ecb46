pub mod ledger_store;
pub mod oracle;
pub mod venue_client;
