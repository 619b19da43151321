pub mod attendance;
pub mod backup_exchange;
pub mod core;
pub mod dashboard;
pub mod leave;
pub mod logins;
pub mod staff;
pub mod timetable;
