use silo::{Bean, Engine, Executor, VersionConflict};
use std::{collections::HashMap, sync::LazyLock};
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Bean, Default, Clone, Debug, PartialEq)]
#[silo(table = "users")]
pub struct User {
    #[silo(pk, auto_increment)]
    pub id: i64,
    pub name: String,
    pub age: i32,
    #[silo(deleted)]
    pub deleted: Option<OffsetDateTime>,
    #[silo(version)]
    pub version: i64,
}

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn users<E: Executor>(engine: &Engine, executor: &mut E) {
    let _lock = MUTEX.lock().await;
    let mut session = engine.session(executor);

    // Setup
    session
        .truncate::<User>()
        .await
        .expect("Failed to truncate the users table");

    // Insert
    let mut alice = User {
        name: "alice".into(),
        age: 31,
        ..Default::default()
    };
    session
        .insert(&mut alice)
        .await
        .expect("Failed to insert alice");
    assert_ne!(alice.id, 0);
    assert_eq!(alice.version, 1);
    let mut bob = User {
        name: "bob".into(),
        age: 17,
        ..Default::default()
    };
    session.insert(&mut bob).await.expect("Failed to insert bob");
    assert!(bob.id > alice.id);

    // Sequence and map hold the same beans
    let mut list = Vec::<User>::new();
    let count = session
        .filter(r#""age" > ?"#, vec![10_i32.into()])
        .order_by(r#""id""#)
        .find(&mut list)
        .await
        .expect("Failed to find the users");
    assert_eq!(count, 2);
    assert_eq!(list, [alice.clone(), bob.clone()]);
    let mut map = HashMap::<i64, User>::new();
    session
        .filter(r#""age" > ?"#, vec![10_i32.into()])
        .find(&mut map)
        .await
        .expect("Failed to find the users by id");
    assert_eq!(map.len(), 2);
    assert_eq!(map[&alice.id], alice);
    assert_eq!(map[&bob.id], bob);

    // Repeating a statement gives the same result
    let mut again = Vec::<User>::new();
    session
        .filter(r#""age" > ?"#, vec![10_i32.into()])
        .order_by(r#""id""#)
        .find(&mut again)
        .await
        .expect("Failed to find the users again");
    assert_eq!(again, list);

    // Single bean
    let adult = session
        .filter(r#""age" >= ?"#, vec![18_i32.into()])
        .get::<User>()
        .await
        .expect("Failed to get an adult")
        .expect("Alice is an adult");
    assert_eq!(adult, alice);
    let nobody = session
        .filter(r#""name" = ?"#, vec!["carol".into()])
        .get::<User>()
        .await
        .expect("Failed to look for carol");
    assert_eq!(nobody, None);

    // Versioned update
    let mut stale = alice.clone();
    alice.age = 32;
    session
        .update(&mut alice)
        .await
        .expect("Failed to update alice");
    assert_eq!(alice.version, 2);
    let reloaded = session
        .filter(r#""id" = ?"#, vec![alice.id.into()])
        .get::<User>()
        .await
        .expect("Failed to reload alice")
        .expect("Alice exists");
    assert_eq!(reloaded.age, 32);
    assert_eq!(reloaded.version, 2);
    stale.age = 40;
    let error = session
        .update(&mut stale)
        .await
        .expect_err("Updating a stale bean must fail");
    let conflict = error
        .downcast_ref::<VersionConflict>()
        .expect("Expected a version conflict");
    assert_eq!(conflict.version, 1);
    assert_eq!(stale.version, 1);

    // Soft delete
    session.delete(&mut bob).await.expect("Failed to delete bob");
    assert!(bob.deleted.is_some());
    let mut live = Vec::<User>::new();
    session
        .find(&mut live)
        .await
        .expect("Failed to find the live users");
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].name, "alice");
    let mut all = Vec::<User>::new();
    session
        .unscoped()
        .order_by(r#""id""#)
        .find(&mut all)
        .await
        .expect("Failed to find every user");
    assert_eq!(all.len(), 2);
    assert!(all[1].deleted.is_some());
    let result = session
        .unscoped()
        .delete(&mut bob)
        .await
        .expect("Failed to remove bob");
    assert_eq!(result.rows_affected, 1);
    let mut all = Vec::<User>::new();
    session
        .unscoped()
        .find(&mut all)
        .await
        .expect("Failed to find every user");
    assert_eq!(all.len(), 1);

    // Streaming
    let mut names = Vec::new();
    let visited = session
        .order_by(r#""id""#)
        .iterate(|i, user: User| {
            assert_eq!(i, names.len());
            names.push(user.name);
            Ok(())
        })
        .await
        .expect("Failed to iterate the users");
    assert_eq!(visited, 1);
    assert_eq!(names, ["alice"]);

    // Projections
    let mut pairs = Vec::<(i64, String)>::new();
    session
        .sql(
            r#"SELECT "id", "name" FROM "users" WHERE "deleted" IS NULL"#,
            Vec::new(),
        )
        .find(&mut pairs)
        .await
        .expect("Failed to read the id and name pairs");
    assert_eq!(pairs, [(alice.id, "alice".to_string())]);
    let mut ages = Vec::<i32>::new();
    session
        .sql(r#"SELECT "age" FROM "users""#, Vec::new())
        .find(&mut ages)
        .await
        .expect("Failed to read the ages");
    assert_eq!(ages, [32]);
}
