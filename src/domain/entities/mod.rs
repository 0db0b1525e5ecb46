pub mod account;
pub mod candle;
pub mod deal;
pub mod direction;
pub mod order;
pub mod position;
pub mod telemetry;
pub mod trade_record;
