pub mod attendance;
pub mod backup;
pub mod core;
pub mod enrollment;
pub mod entities;
pub mod grades;
