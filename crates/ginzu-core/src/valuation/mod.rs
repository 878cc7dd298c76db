pub mod ginzu;
pub mod inputs;
pub mod leases;
pub mod options;
pub mod rnd;
