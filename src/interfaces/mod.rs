pub mod admin_gate;
pub mod round_reader;
pub mod structured_price_reader;
pub mod keyed_price_reader;
