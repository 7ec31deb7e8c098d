mod as_value;
mod bean;
pub mod cache;
mod cache_find;
mod column;
mod config;
mod container;
mod convert;
mod engine;
mod error;
mod executor;
mod materialize;
mod primary_key;
mod processor;
mod query;
mod resolver;
mod schema;
mod session;
mod sql_writer;
mod table;
mod util;
mod value;

pub use ::anyhow::Context;
pub use as_value::*;
pub use bean::*;
pub use cache::{CachedBean, Cacher, CacherManager, LruCacher};
pub use cache_find::*;
pub use column::*;
pub use config::*;
pub use container::*;
pub use convert::*;
pub use engine::*;
pub use error::*;
pub use executor::*;
pub use materialize::*;
pub use primary_key::*;
pub use processor::*;
pub use query::*;
pub use resolver::*;
pub use schema::*;
pub use session::*;
pub use sql_writer::*;
pub use table::*;
pub use util::*;
pub use value::*;
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
