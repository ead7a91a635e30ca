pub mod app;
pub mod coauthors;
pub mod config;
pub mod dblp;
pub mod domain;
pub mod error;
pub mod note;
pub mod orgs;
pub mod output;
pub mod profile;
pub mod publications;
pub mod sanitize;
pub mod vault;
