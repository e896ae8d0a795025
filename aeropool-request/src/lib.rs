pub mod expiry;
pub mod rules;
