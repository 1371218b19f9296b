pub mod bids;
pub mod drivers;
pub mod jobs;
pub mod sweeps;
