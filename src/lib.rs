// Library for tests to access modules

pub mod aggregation;
pub mod cluster;
pub mod collector;
pub mod config;
pub mod dashboard;
pub mod discovery;
pub mod models;
pub mod probe;
pub mod routes;
pub mod store;
pub mod worker;
