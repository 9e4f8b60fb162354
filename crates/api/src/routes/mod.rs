pub mod health;
pub mod sensors;
