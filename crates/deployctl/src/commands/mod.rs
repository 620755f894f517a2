pub mod deploy;
pub mod export;
pub mod order;
pub mod validate;
