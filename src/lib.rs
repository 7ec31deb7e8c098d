//! Silo materializes relational rows into typed beans, sequences and maps, and keeps a
//! primary key object cache in front of the database.
//!
//! ```ignore
//! #[derive(Bean, Default, Clone, Debug)]
//! #[silo(table = "users")]
//! struct User {
//!     #[silo(pk, auto_increment)]
//!     id: i64,
//!     name: String,
//! }
//!
//! let engine = Engine::new(EngineConfig::new().cache_size(1000));
//! let mut users = Vec::<User>::new();
//! engine.session(&mut executor).filter(r#""name" = ?"#, vec!["alice".into()]).find(&mut users).await?;
//! ```

pub use silo_core::*;
pub use silo_macros::Bean;
