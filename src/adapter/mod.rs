pub mod cache;
pub mod datastore;
pub mod mq;
pub mod repository;
