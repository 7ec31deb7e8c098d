#[cfg(test)]
mod tests {
    use silo::{Bean, Engine, EngineConfig, SqlType, Value};
    use silo_tests::{MemoryExecutor, init_logs, labels};
    use time::{
        OffsetDateTime, PrimitiveDateTime,
        macros::{datetime, offset},
    };

    #[derive(Bean, Default, Clone, Debug, PartialEq)]
    struct Owner {
        name: String,
        city: Option<String>,
    }

    #[derive(Bean, Default, Clone, Debug, PartialEq)]
    struct PetWithOwner {
        #[silo(pk)]
        id: i64,
        name: String,
        #[silo(extends)]
        owner: Owner,
        #[silo(skip)]
        visits: u32,
    }

    #[derive(Bean, Default, Clone, Debug, PartialEq)]
    #[silo(table = "events")]
    struct Event {
        #[silo(pk, auto_increment)]
        id: i64,
        #[silo(sql_type = "DATETIME", time_zone = "+02:00")]
        local: Option<PrimitiveDateTime>,
        at: Option<OffsetDateTime>,
        r#type: Option<String>,
    }

    #[test]
    fn describe() {
        let table = PetWithOwner::describe();
        assert_eq!(table.name, "pet_with_owner");
        assert_eq!(table.type_name, "PetWithOwner");
        let names = table
            .columns
            .iter()
            .map(|v| &*v.name)
            .collect::<Vec<_>>();
        assert_eq!(names, ["id", "name", "name", "city"]);
        assert_eq!(&*table.primary_keys, &[0]);
        assert_eq!(&*table.columns[2].field_path, &[2, 0]);
        assert_eq!(&*table.columns[3].field_path, &[2, 1]);
        assert_eq!(table.columns[0].sql_type, SqlType::BigInt);
        assert!(!table.columns[1].nullable);
        assert!(table.columns[3].nullable);

        let table = Event::describe();
        assert_eq!(table.name, "events");
        assert_eq!(table.auto_increment, Some(0));
        assert_eq!(table.columns[1].sql_type, SqlType::DateTime);
        assert_eq!(table.columns[1].time_zone, Some(offset!(+2)));
        assert_eq!(table.columns[2].sql_type, SqlType::TimestampTz);
        assert_eq!(table.columns[2].time_zone, None);
        assert_eq!(table.columns[3].name, "type");
    }

    #[tokio::test]
    async fn duplicate_columns_bind_in_order() {
        init_logs();
        let mut executor = MemoryExecutor::new();
        executor.create_table_with(
            "pet_view",
            labels(&[
                ("id", SqlType::BigInt),
                ("name", SqlType::Varchar),
                ("name", SqlType::Varchar),
                ("city", SqlType::Varchar),
                ("extra", SqlType::Varchar),
            ]),
            None,
        );
        executor
            .push_row(
                "pet_view",
                vec![
                    Value::Int64(Some(1)),
                    Value::Varchar(Some("rex".into())),
                    Value::Varchar(Some("alice".into())),
                    Value::Null,
                    Value::Varchar(Some("ignored".into())),
                ],
            )
            .unwrap();
        let engine = Engine::default();
        let mut pets = Vec::<PetWithOwner>::new();
        engine
            .session(&mut executor)
            .sql(r#"SELECT * FROM "pet_view""#, Vec::new())
            .find(&mut pets)
            .await
            .expect("Failed to read the pets");
        assert_eq!(
            pets,
            [PetWithOwner {
                id: 1,
                name: "rex".into(),
                owner: Owner {
                    name: "alice".into(),
                    city: None,
                },
                visits: 0,
            }]
        );
    }

    #[tokio::test]
    async fn failed_conversions_leave_the_container_untouched() {
        init_logs();
        let mut executor = MemoryExecutor::new();
        executor.create_table::<PetWithOwner>();
        executor
            .push_row(
                "pet_with_owner",
                vec![1_i64.into(), "rex".into(), "alice".into(), Value::Null],
            )
            .unwrap();
        executor
            .push_row(
                "pet_with_owner",
                vec!["two".into(), "tom".into(), "bob".into(), Value::Null],
            )
            .unwrap();
        let engine = Engine::new(EngineConfig::new().cache_size(10));
        let previous = PetWithOwner {
            id: 9,
            ..Default::default()
        };
        let mut pets = vec![previous.clone()];
        let error = engine
            .session(&mut executor)
            .no_cache()
            .find(&mut pets)
            .await
            .expect_err("The second row has no valid id");
        assert!(format!("{error:#}").contains("`two`"));
        assert_eq!(pets, [previous.clone()]);

        // The id list of the cache cannot be read either
        let error = engine
            .session(&mut executor)
            .find(&mut pets)
            .await
            .expect_err("The second row has no valid id");
        assert!(format!("{error:#}").contains("id"));
        assert_eq!(pets, [previous]);

        // Rows failing only in an unread column are fine
        let mut names = Vec::<String>::new();
        engine
            .session(&mut executor)
            .sql(r#"SELECT "name" FROM "pet_with_owner""#, Vec::new())
            .find(&mut names)
            .await
            .expect("Failed to read the names");
        assert_eq!(names, ["rex", "tom"]);
    }

    #[tokio::test]
    async fn times_follow_the_configured_zones() {
        init_logs();
        let mut executor = MemoryExecutor::new();
        executor.create_table::<Event>();
        let engine = Engine::new(EngineConfig::new().tz_location(offset!(+1)));
        let mut event = Event {
            local: Some(datetime!(2025-06-01 12:00)),
            at: Some(datetime!(2025-06-01 12:00 UTC)),
            r#type: Some("launch".into()),
            ..Default::default()
        };
        engine
            .session(&mut executor)
            .insert(&mut event)
            .await
            .expect("Failed to insert the event");

        // Stored in the zone of the column
        let rows = executor.rows("events");
        assert_eq!(
            rows[0][1],
            Value::Timestamp(Some(datetime!(2025-06-01 13:00)))
        );

        // Presented in the location zone
        let loaded = engine
            .session(&mut executor)
            .get::<Event>()
            .await
            .expect("Failed to load the event")
            .expect("The event exists");
        assert_eq!(loaded.local, event.local);
        assert_eq!(loaded.at.map(|v| v.offset()), Some(offset!(+1)));
        assert_eq!(loaded.at, event.at);
        assert_eq!(loaded.r#type.as_deref(), Some("launch"));
    }
}
