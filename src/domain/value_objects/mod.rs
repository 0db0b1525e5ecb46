pub mod fill_mode;
pub mod lot_size;
