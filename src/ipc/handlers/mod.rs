pub mod admin;
pub mod adminposts;
pub mod assets;
pub mod attendance;
pub mod auth;
pub mod backup_exchange;
pub mod classes;
pub mod core;
pub mod feed;
pub mod gallery;
pub mod marks;
pub mod nav;
pub mod posts;
pub mod reports;
pub mod timetable;
