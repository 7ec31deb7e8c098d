use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use silo::{Bean, Conversion, Engine, Executor, Result};
use std::{str, sync::LazyLock};
use time::{
    Date, OffsetDateTime,
    macros::{date, datetime},
};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
pub struct Details {
    pub unit: String,
    pub samples: Vec<f64>,
}

/// Labels stored as a single `|` separated column.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct Flags(pub Vec<String>);

impl Conversion for Flags {
    fn from_db(&mut self, data: Option<&[u8]>) -> Result<()> {
        self.0 = match data {
            Some(data) => str::from_utf8(data)?
                .split('|')
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
                .collect(),
            None => Vec::new(),
        };
        Ok(())
    }

    fn to_db(&self) -> Result<Option<Vec<u8>>> {
        if self.0.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.0.join("|").into_bytes()))
    }
}

#[derive(Bean, Default, Clone, Debug, PartialEq)]
#[silo(table = "measures")]
pub struct Measure {
    #[silo(pk)]
    pub id: Uuid,
    pub amount: Decimal,
    pub note: Option<String>,
    #[silo(json)]
    pub details: Details,
    #[silo(conversion)]
    pub flags: Flags,
    #[silo(name = "taken")]
    pub taken_at: Option<OffsetDateTime>,
    pub day: Option<Date>,
}

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn measures<E: Executor>(engine: &Engine, executor: &mut E) {
    let _lock = MUTEX.lock().await;
    let mut session = engine.session(executor);

    // Setup
    session
        .truncate::<Measure>()
        .await
        .expect("Failed to truncate the measures table");
    let mut full = Measure {
        id: Uuid::from_u128(0x5e915574_bb30_4430_98cf_c5854f61fbbd),
        amount: Decimal::new(1250, 2),
        note: Some("first".into()),
        details: Details {
            unit: "kg".into(),
            samples: vec![1.5, 2.0],
        },
        flags: Flags(vec!["hot".into(), "dry".into()]),
        taken_at: Some(datetime!(2025-03-01 10:00 +01:00)),
        day: Some(date!(2025-03-01)),
    };
    let mut empty = Measure {
        id: Uuid::from_u128(2),
        ..Default::default()
    };
    session
        .insert(&mut full)
        .await
        .expect("Failed to insert the full measure");
    session
        .insert(&mut empty)
        .await
        .expect("Failed to insert the empty measure");

    // Every field survives the round trip
    let loaded = session
        .filter(r#""id" = ?"#, vec![full.id.into()])
        .get::<Measure>()
        .await
        .expect("Failed to load the full measure")
        .expect("The full measure exists");
    assert_eq!(loaded, full);
    assert_eq!(loaded.amount.to_string(), "12.50");
    let loaded = session
        .filter(r#""id" = ?"#, vec![empty.id.into()])
        .get::<Measure>()
        .await
        .expect("Failed to load the empty measure")
        .expect("The empty measure exists");
    assert_eq!(loaded, empty);
    assert_eq!(loaded.flags, Flags::default());
    assert_eq!(loaded.note, None);

    // Columns are found by their declared name
    let mut taken = Vec::<Option<OffsetDateTime>>::new();
    session
        .sql(
            r#"SELECT "taken" FROM "measures" WHERE "id" = ?"#,
            vec![full.id.into()],
        )
        .find(&mut taken)
        .await
        .expect("Failed to read the taken column");
    assert_eq!(taken, [full.taken_at]);

    // Optional scalars
    let mut notes = Vec::<Option<String>>::new();
    session
        .sql(r#"SELECT "note" FROM "measures" ORDER BY "note""#, Vec::new())
        .find(&mut notes)
        .await
        .expect("Failed to read the notes");
    assert_eq!(notes, [None, Some("first".to_string())]);
}
