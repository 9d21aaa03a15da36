#![forbid(unsafe_code)]

//! Traffic-light daemon: polls the CI server and serves its status.

pub mod ci_client;
pub mod config;
pub mod http;
pub mod settings_store;
pub mod synchronizer;
pub mod teamcity;
