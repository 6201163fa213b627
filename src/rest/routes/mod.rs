pub mod certificates;
pub mod courses;
pub mod health;
pub mod lifecycle;
