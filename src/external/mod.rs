pub mod postcodes_io;
pub mod webhook;
