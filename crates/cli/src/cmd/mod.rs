pub mod artifacts;
pub mod bump;
pub mod lint;
