pub mod diff;
pub mod normalize;
pub mod snapshot;
pub mod vuln;
