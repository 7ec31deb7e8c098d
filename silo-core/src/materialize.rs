use crate::{
    Container, Element, Pipeline, Resolver, Result, RowLabeled, ScanContext, SchemaRegistry, Stage,
    resolve_shape,
    stream::{Stream, TryStreamExt},
};
use futures::pin_mut;

/// Drains `rows` into `container`.
///
/// Elements are collected in a fresh container first and moved into `container` only
/// once every row converted, an error leaves `container` untouched. Returns the number
/// of rows read.
pub async fn materialize<C, S>(
    rows: S,
    container: &mut C,
    registry: &SchemaRegistry,
    context: &ScanContext,
    pipeline: &mut Pipeline,
) -> Result<u64>
where
    C: Container,
    S: Stream<Item = Result<RowLabeled>>,
{
    let shape = resolve_shape::<C>(registry)?;
    let table = shape.table().cloned();
    let mut resolver = Resolver::new(table.clone());
    let mut staged = C::default();
    let mut count = 0;
    pin_mut!(rows);
    while let Some(row) = rows.try_next().await? {
        let schema = resolver.resolve(&row.labels);
        let mut element = C::Element::from_row(row.values, schema, context)?;
        element.process(Stage::AfterLoad, pipeline);
        let key = match &table {
            Some(table) if C::KEYED => element.primary_key(table, context)?,
            _ => None,
        };
        staged.insert(element, key.as_ref())?;
        count += 1;
    }
    container.merge(staged);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnLabel, RowLabels, SqlType, Value, stream};

    fn rows(values: &[(&str, i64)]) -> Vec<Result<RowLabeled>> {
        let labels: RowLabels = [
            ColumnLabel::new("name", SqlType::Varchar),
            ColumnLabel::new("n", SqlType::BigInt),
        ]
        .into_iter()
        .collect();
        values
            .iter()
            .map(|(name, n)| {
                Ok(RowLabeled::new(
                    labels.clone(),
                    [Value::Varchar(Some((*name).into())), Value::Int64(Some(*n))].into(),
                ))
            })
            .collect()
    }

    #[tokio::test]
    async fn stages_until_success() {
        let registry = SchemaRegistry::new();
        let context = ScanContext::default();
        let mut pipeline = Pipeline::new();
        let mut result = vec![(String::from("x"), 0_i32)];
        let count = materialize(
            stream::iter(rows(&[("a", 1), ("b", 2)])),
            &mut result,
            &registry,
            &context,
            &mut pipeline,
        )
        .await
        .unwrap();
        assert_eq!(count, 2);
        assert_eq!(result.len(), 3);
        assert_eq!(result[2], ("b".to_string(), 2));

        let mut failing = rows(&[("c", 3)]);
        failing.push(Ok(RowLabeled::new(
            failing[0].as_ref().unwrap().labels.clone(),
            [Value::Varchar(Some("d".into())), Value::Varchar(Some("four".into()))].into(),
        )));
        let error = materialize(
            stream::iter(failing),
            &mut result,
            &registry,
            &context,
            &mut pipeline,
        )
        .await;
        assert!(error.is_err());
        assert_eq!(result.len(), 3);
    }
}
