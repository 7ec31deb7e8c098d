use silo::{Bean, Engine, Executor, ShapeError};
use std::{
    collections::{BTreeMap, HashMap},
    sync::LazyLock,
};
use tokio::sync::Mutex;

/// Bean with a composite primary key.
#[derive(Bean, Default, Clone, Debug, PartialEq)]
#[silo(table = "accounts")]
pub struct Account {
    #[silo(pk)]
    pub bank: i64,
    #[silo(pk)]
    pub number: i64,
    pub owner: String,
    pub balance: f64,
}

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn accounts<E: Executor>(engine: &Engine, executor: &mut E) {
    let _lock = MUTEX.lock().await;
    let mut session = engine.session(executor);

    // Setup
    session
        .truncate::<Account>()
        .await
        .expect("Failed to truncate the accounts table");
    let mut accounts = vec![
        Account {
            bank: 1,
            number: 100,
            owner: "alice".into(),
            balance: 250.5,
        },
        Account {
            bank: 1,
            number: 200,
            owner: "bob".into(),
            balance: 12.0,
        },
        Account {
            bank: 2,
            number: 100,
            owner: "alice".into(),
            balance: 0.0,
        },
    ];
    for account in &mut accounts {
        session
            .insert(account)
            .await
            .expect("Failed to insert an account");
    }

    // Keyed by the whole primary key
    let mut map = HashMap::<[i64; 2], Account>::new();
    let count = session
        .find(&mut map)
        .await
        .expect("Failed to find the accounts by key");
    assert_eq!(count, 3);
    assert_eq!(map[&[1_i64, 100]], accounts[0]);
    assert_eq!(map[&[2_i64, 100]], accounts[2]);
    let mut ordered = BTreeMap::<Vec<i64>, Account>::new();
    session
        .filter(r#""owner" = ?"#, vec!["alice".into()])
        .find(&mut ordered)
        .await
        .expect("Failed to find the accounts of alice");
    assert_eq!(
        ordered.keys().cloned().collect::<Vec<_>>(),
        [vec![1_i64, 100], vec![2, 100]]
    );

    // A single value cannot hold the key
    let mut wrong = HashMap::<i64, Account>::new();
    let error = session
        .find(&mut wrong)
        .await
        .expect_err("A scalar key cannot hold a composite primary key");
    assert!(matches!(
        error.downcast_ref::<ShapeError>(),
        Some(ShapeError::KeyNotComposite { columns: 2, .. })
    ));
    assert!(wrong.is_empty());

    // Writes by composite key
    accounts[1].balance += 10.0;
    session
        .update(&mut accounts[1])
        .await
        .expect("Failed to update the account of bob");
    let bob = session
        .filter(r#""owner" = ?"#, vec!["bob".into()])
        .get::<Account>()
        .await
        .expect("Failed to get the account of bob")
        .expect("Bob has an account");
    assert_eq!(bob.balance, 22.0);
    session
        .delete(&mut accounts[2])
        .await
        .expect("Failed to delete an account");
    let mut rest = Vec::<Account>::new();
    session
        .filter(r#""bank" = ? OR "number" = ?"#, vec![2_i64.into(), 100_i64.into()])
        .find(&mut rest)
        .await
        .expect("Failed to find the remaining accounts");
    assert_eq!(rest, [accounts[0].clone()]);
}
