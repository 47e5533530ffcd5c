pub mod core;
pub mod logs;
pub mod products;
pub mod teachers;
