use silo::{
    AfterDeleteProcessor, AfterInsertProcessor, AfterLoadProcessor, AfterUpdateProcessor, Bean,
    BeforeDeleteProcessor, BeforeInsertProcessor, BeforeUpdateProcessor, Engine, Executor,
};
use std::sync::LazyLock;
use tokio::sync::Mutex;

/// Bean recording every processor that ran on it.
#[derive(Bean, Default, Clone, Debug)]
#[silo(
    table = "audits",
    processors(
        before_insert,
        after_insert,
        before_update,
        after_update,
        before_delete,
        after_delete,
        after_load
    )
)]
pub struct Audit {
    #[silo(pk, auto_increment)]
    pub id: i64,
    pub note: String,
    #[silo(skip)]
    pub events: Vec<&'static str>,
}

impl BeforeInsertProcessor for Audit {
    fn before_insert(&mut self) {
        self.events.push("before_insert");
        self.note = self.note.trim().to_string();
    }
}

impl AfterInsertProcessor for Audit {
    fn after_insert(&mut self) {
        self.events.push("after_insert");
    }
}

impl BeforeUpdateProcessor for Audit {
    fn before_update(&mut self) {
        self.events.push("before_update");
    }
}

impl AfterUpdateProcessor for Audit {
    fn after_update(&mut self) {
        self.events.push("after_update");
    }
}

impl BeforeDeleteProcessor for Audit {
    fn before_delete(&mut self) {
        self.events.push("before_delete");
    }
}

impl AfterDeleteProcessor for Audit {
    fn after_delete(&mut self) {
        self.events.push("after_delete");
    }
}

impl AfterLoadProcessor for Audit {
    fn after_load(&mut self) {
        self.events.push("after_load");
    }
}

fn record(event: &'static str) -> impl FnMut(&mut dyn std::any::Any) + Send + 'static {
    move |bean| {
        if let Some(audit) = bean.downcast_mut::<Audit>() {
            audit.events.push(event);
        }
    }
}

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn audits<E: Executor>(engine: &Engine, executor: &mut E) {
    let _lock = MUTEX.lock().await;
    let mut session = engine.session(executor);

    // Setup
    session
        .truncate::<Audit>()
        .await
        .expect("Failed to truncate the audits table");

    // Insert: session closures run ahead of the processors of the same phase
    let mut audit = Audit {
        note: "  created  ".into(),
        ..Default::default()
    };
    session
        .before(record("closure_before"))
        .after(record("closure_after"))
        .insert(&mut audit)
        .await
        .expect("Failed to insert the audit");
    assert_eq!(
        audit.events,
        [
            "closure_before",
            "before_insert",
            "closure_after",
            "after_insert"
        ]
    );
    assert_eq!(audit.note, "created");
    assert_ne!(audit.id, 0);

    // Closures are dropped after the call they were registered for
    audit.events.clear();
    audit.note = "updated".into();
    session
        .update(&mut audit)
        .await
        .expect("Failed to update the audit");
    assert_eq!(audit.events, ["before_update", "after_update"]);

    // Load
    let loaded = session
        .after(record("closure_load"))
        .filter(r#""id" = ?"#, vec![audit.id.into()])
        .get::<Audit>()
        .await
        .expect("Failed to load the audit")
        .expect("The audit exists");
    assert_eq!(loaded.note, "updated");
    assert_eq!(loaded.events, ["closure_load", "after_load"]);

    // Delete
    audit.events.clear();
    session
        .delete(&mut audit)
        .await
        .expect("Failed to delete the audit");
    assert_eq!(audit.events, ["before_delete", "after_delete"]);
    let mut rest = Vec::<Audit>::new();
    session
        .find(&mut rest)
        .await
        .expect("Failed to find the audits");
    assert!(rest.is_empty());
}
