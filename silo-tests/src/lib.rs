mod accounts;
mod audits;
mod measures;
mod memory;
mod users;

pub use accounts::*;
pub use audits::*;
pub use measures::*;
pub use memory::*;
pub use users::*;

use log::LevelFilter;
use silo::{Engine, Executor};
use std::env;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Creates the table of every bean the scenarios use.
pub fn create_tables(executor: &MemoryExecutor) {
    executor.create_table::<User>();
    executor.create_table::<Account>();
    executor.create_table::<Audit>();
    executor.create_table::<Measure>();
}

/// Runs every scenario, the tables must exist already.
pub async fn execute_tests<E: Executor>(engine: &Engine, executor: &mut E) {
    users(engine, executor).await;
    accounts(engine, executor).await;
    audits(engine, executor).await;
    measures(engine, executor).await;
}
