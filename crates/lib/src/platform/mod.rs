pub mod arch;
pub mod paths;
