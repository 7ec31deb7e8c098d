#[cfg(test)]
mod tests {
    use silo_core::{
        Bean, CachedBean, ColumnDescriptor, ColumnLabel, ColumnsSchema, Element, FromColumn,
        Hooks, IntoColumn, Pipeline, PrimaryKey, Result, Row, RowLabeled, RowLabels, ScanContext,
        SchemaRegistry, Shape, ShapeError, SqlType, Stage, TableDescriptor, Value, bean_element,
        bean_from_row, materialize, stream, unknown_field,
    };
    use std::{
        collections::{BTreeMap, HashMap},
        sync::Arc,
    };

    #[derive(Default, Clone, Debug, PartialEq)]
    struct Book {
        isbn: i64,
        title: String,
        pages: Option<i32>,
        loaded: bool,
    }

    impl Bean for Book {
        fn describe() -> TableDescriptor {
            TableDescriptor::new(
                "books",
                "Book",
                vec![
                    ColumnDescriptor {
                        sql_type: i64::SQL_TYPE,
                        primary_key: true,
                        ..ColumnDescriptor::new("isbn", vec![0])
                    },
                    ColumnDescriptor {
                        sql_type: String::SQL_TYPE,
                        ..ColumnDescriptor::new("title", vec![1])
                    },
                    ColumnDescriptor {
                        sql_type: <Option<i32>>::SQL_TYPE,
                        nullable: true,
                        ..ColumnDescriptor::new("pages", vec![2])
                    },
                ],
            )
        }

        fn set_field(
            &mut self,
            path: &[usize],
            value: Value,
            column: &ColumnDescriptor,
            context: &ScanContext,
        ) -> Result<()> {
            match path {
                [0] => self.isbn = FromColumn::from_column(value, column, context)?,
                [1] => self.title = FromColumn::from_column(value, column, context)?,
                [2] => self.pages = FromColumn::from_column(value, column, context)?,
                _ => return Err(unknown_field::<Self>(path)),
            }
            Ok(())
        }

        fn field_value(
            &self,
            path: &[usize],
            column: &ColumnDescriptor,
            context: &ScanContext,
        ) -> Result<Value> {
            match path {
                [0] => self.isbn.into_column(column, context),
                [1] => self.title.into_column(column, context),
                [2] => self.pages.into_column(column, context),
                _ => Err(unknown_field::<Self>(path)),
            }
        }

        fn hooks() -> Hooks<Self> {
            Hooks {
                after_load: Some(|book| book.loaded = true),
                ..Hooks::NONE
            }
        }
    }

    impl Element for Book {
        fn shape(registry: &SchemaRegistry) -> Shape {
            bean_element::shape::<Self>(registry)
        }
        fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self> {
            bean_from_row(values, schema, context)
        }
        fn primary_key(
            &self,
            table: &TableDescriptor,
            context: &ScanContext,
        ) -> Result<Option<PrimaryKey>> {
            bean_element::primary_key(self, table, context)
        }
        fn from_cached(bean: &CachedBean) -> Option<Self> {
            bean_element::from_cached(bean)
        }
        fn to_cached(&self) -> Option<CachedBean> {
            bean_element::to_cached(self)
        }
        fn process(&mut self, stage: Stage, pipeline: &mut Pipeline) {
            bean_element::process(self, stage, pipeline);
        }
    }

    fn labels() -> RowLabels {
        [
            ColumnLabel::new("TITLE", SqlType::Varchar),
            ColumnLabel::new("isbn", SqlType::BigInt),
            ColumnLabel::new("pages", SqlType::Int),
            ColumnLabel::new("publisher", SqlType::Varchar),
        ]
        .into_iter()
        .collect()
    }

    fn row(isbn: Value, title: &str, pages: Option<i32>) -> Result<RowLabeled> {
        Ok(RowLabeled::new(
            labels(),
            [
                Value::Varchar(Some(title.into())),
                isbn,
                Value::Int32(pages),
                Value::Varchar(Some("unused".into())),
            ]
            .into(),
        ))
    }

    fn books() -> Vec<Result<RowLabeled>> {
        vec![
            row(Value::Int64(Some(2)), "Dune", Some(412)),
            row(Value::Int64(Some(1)), "Solaris", None),
        ]
    }

    #[tokio::test]
    async fn beans_are_bound_by_name() {
        let registry = SchemaRegistry::new();
        let context = ScanContext::default();
        let mut pipeline = Pipeline::new();
        let mut result = Vec::<Book>::new();
        let count = materialize(
            stream::iter(books()),
            &mut result,
            &registry,
            &context,
            &mut pipeline,
        )
        .await
        .expect("Failed to materialize the books");
        assert_eq!(count, 2);
        assert_eq!(
            result,
            [
                Book {
                    isbn: 2,
                    title: "Dune".into(),
                    pages: Some(412),
                    loaded: true,
                },
                Book {
                    isbn: 1,
                    title: "Solaris".into(),
                    pages: None,
                    loaded: true,
                },
            ]
        );
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn keyed_containers() {
        let registry = SchemaRegistry::new();
        let context = ScanContext::default();
        let mut pipeline = Pipeline::new();

        let mut by_isbn = BTreeMap::<i64, Arc<Book>>::new();
        materialize(
            stream::iter(books()),
            &mut by_isbn,
            &registry,
            &context,
            &mut pipeline,
        )
        .await
        .expect("Failed to materialize the books");
        assert_eq!(by_isbn.keys().copied().collect::<Vec<_>>(), [1, 2]);
        assert_eq!(by_isbn[&1].title, "Solaris");

        // Integer widths of the key are normalized
        let mut by_isbn = HashMap::<u32, Book>::new();
        materialize(
            stream::iter(vec![row(Value::Int32(Some(5)), "Ubik", None)]),
            &mut by_isbn,
            &registry,
            &context,
            &mut pipeline,
        )
        .await
        .expect("Failed to materialize the books");
        assert_eq!(by_isbn[&5].title, "Ubik");

        let mut composite = HashMap::<[i64; 2], Book>::new();
        let error = materialize(
            stream::iter(books()),
            &mut composite,
            &registry,
            &context,
            &mut pipeline,
        )
        .await
        .expect_err("Books have a single key column");
        assert!(matches!(
            error.downcast_ref::<ShapeError>(),
            Some(ShapeError::KeyArity {
                columns: 1,
                arity: 2,
                ..
            })
        ));
        assert!(composite.is_empty());

        let mut keyless = HashMap::<i64, (i64, String)>::new();
        let error = materialize(
            stream::iter(books()),
            &mut keyless,
            &registry,
            &context,
            &mut pipeline,
        )
        .await
        .expect_err("Tuples have no primary key");
        assert!(matches!(
            error.downcast_ref::<ShapeError>(),
            Some(ShapeError::NotBean(..))
        ));
    }

    #[tokio::test]
    async fn a_failing_row_discards_the_whole_batch() {
        let registry = SchemaRegistry::new();
        let context = ScanContext::default();
        let mut pipeline = Pipeline::new();
        let mut result = vec![Book::default()];
        let mut rows = books();
        rows.push(row(Value::Varchar(Some("X-1".into())), "Broken", None));
        let error = materialize(
            stream::iter(rows),
            &mut result,
            &registry,
            &context,
            &mut pipeline,
        )
        .await
        .expect_err("The isbn is not a number");
        assert!(format!("{error:#}").contains("isbn"));
        assert_eq!(result, [Book::default()]);
    }

    #[tokio::test]
    async fn load_closures_run_ahead_of_the_hook() {
        let registry = SchemaRegistry::new();
        let context = ScanContext::default();
        let mut pipeline = Pipeline::new();
        pipeline.after(|bean| {
            if let Some(book) = bean.downcast_mut::<Book>() {
                assert!(!book.loaded);
                book.title.make_ascii_uppercase();
            }
        });
        let mut result = Vec::<Box<Book>>::new();
        materialize(
            stream::iter(books()),
            &mut result,
            &registry,
            &context,
            &mut pipeline,
        )
        .await
        .expect("Failed to materialize the books");
        assert_eq!(result[0].title, "DUNE");
        assert_eq!(result[1].title, "SOLARIS");
        assert!(result.iter().all(|v| v.loaded));
    }

    #[tokio::test]
    async fn long_text_in_a_numeric_column() {
        let registry = SchemaRegistry::new();
        let context = ScanContext::default();
        let mut pipeline = Pipeline::new();
        let labels: RowLabels = [ColumnLabel::new("n", SqlType::Varchar)]
            .into_iter()
            .collect();
        let rows = vec![Ok(RowLabeled::new(
            labels,
            [Value::Varchar(Some("é".repeat(300)))].into(),
        ))];
        let mut result = Vec::<i32>::new();
        let error = materialize(
            stream::iter(rows),
            &mut result,
            &registry,
            &context,
            &mut pipeline,
        )
        .await
        .expect_err("The text is not a number");
        assert!(format!("{error:#}").contains("..."));
        assert!(result.is_empty());
    }

    #[test]
    fn shared_beans_are_processed_on_a_copy() {
        let mut pipeline = Pipeline::new();
        let shared = Arc::new(Book::default());
        let mut element = shared.clone();
        element.process(Stage::AfterLoad, &mut pipeline);
        assert!(element.loaded);
        assert!(!shared.loaded);
    }
}
