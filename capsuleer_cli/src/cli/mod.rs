mod auth;
mod common;
mod config;
mod market;
mod pi;
mod query;
mod root;
mod threat;

pub(crate) use root::get_args;
