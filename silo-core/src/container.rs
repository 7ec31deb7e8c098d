use crate::{
    Bean, CachedBean, ColumnsSchema, Error, FromColumn, MapKey, Pipeline, PrimaryKey, Result, Row,
    ScanContext, SchemaRegistry, ShapeError, Stage, TableDescriptor, bean_primary_key,
};
use rust_decimal::Decimal;
use std::{
    any,
    collections::{BTreeMap, HashMap},
    hash::{BuildHasher, Hash},
    sync::Arc,
};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// What a destination element is made of, resolved once per call.
#[derive(Debug, Clone)]
pub enum Shape {
    Bean(Arc<TableDescriptor>),
    Scalar,
    Tuple(usize),
    List,
    Map,
}

impl Shape {
    pub fn table(&self) -> Option<&Arc<TableDescriptor>> {
        match self {
            Shape::Bean(table) => Some(table),
            _ => None,
        }
    }
}

/// Single item of a destination container: a bean (by value, boxed or shared) or a
/// positional projection of the row.
pub trait Element: Sized + Send + 'static {
    fn shape(registry: &SchemaRegistry) -> Shape;

    fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self>;

    /// Primary key of bean elements, `None` for projections.
    fn primary_key(
        &self,
        _table: &TableDescriptor,
        _context: &ScanContext,
    ) -> Result<Option<PrimaryKey>> {
        Ok(None)
    }

    /// Element built from a cache entry, `None` when the entry holds another type.
    fn from_cached(_bean: &CachedBean) -> Option<Self> {
        None
    }

    fn to_cached(&self) -> Option<CachedBean> {
        None
    }

    fn process(&mut self, _stage: Stage, _pipeline: &mut Pipeline) {}
}

/// Element implementation shared by every `#[derive(Bean)]` type.
pub mod bean_element {
    use super::*;

    pub fn shape<T: Bean>(registry: &SchemaRegistry) -> Shape {
        Shape::Bean(registry.describe::<T>())
    }

    pub fn primary_key<T: Bean>(
        bean: &T,
        table: &TableDescriptor,
        context: &ScanContext,
    ) -> Result<Option<PrimaryKey>> {
        bean_primary_key(bean, table, context).map(Some)
    }

    pub fn from_cached<T: Bean>(bean: &CachedBean) -> Option<T> {
        bean.downcast_ref::<T>().cloned()
    }

    pub fn to_cached<T: Bean>(bean: &T) -> Option<CachedBean> {
        Some(Arc::new(bean.clone()))
    }

    pub fn process<T: Bean>(bean: &mut T, stage: Stage, pipeline: &mut Pipeline) {
        pipeline.run(stage, bean, &T::hooks());
    }
}

impl<T: Bean + Element> Element for Box<T> {
    fn shape(registry: &SchemaRegistry) -> Shape {
        T::shape(registry)
    }
    fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self> {
        T::from_row(values, schema, context).map(Box::new)
    }
    fn primary_key(
        &self,
        table: &TableDescriptor,
        context: &ScanContext,
    ) -> Result<Option<PrimaryKey>> {
        T::primary_key(self, table, context)
    }
    fn from_cached(bean: &CachedBean) -> Option<Self> {
        T::from_cached(bean).map(Box::new)
    }
    fn to_cached(&self) -> Option<CachedBean> {
        T::to_cached(self)
    }
    fn process(&mut self, stage: Stage, pipeline: &mut Pipeline) {
        T::process(self, stage, pipeline);
    }
}

/// Shared beans point straight at the cache entry on hits.
impl<T: Bean + Element> Element for Arc<T> {
    fn shape(registry: &SchemaRegistry) -> Shape {
        T::shape(registry)
    }
    fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self> {
        T::from_row(values, schema, context).map(Arc::new)
    }
    fn primary_key(
        &self,
        table: &TableDescriptor,
        context: &ScanContext,
    ) -> Result<Option<PrimaryKey>> {
        T::primary_key(self, table, context)
    }
    fn from_cached(bean: &CachedBean) -> Option<Self> {
        bean.clone().downcast::<T>().ok()
    }
    fn to_cached(&self) -> Option<CachedBean> {
        Some(self.clone())
    }
    /// Processors of a shared bean run on a private copy, the other owners keep theirs.
    fn process(&mut self, stage: Stage, pipeline: &mut Pipeline) {
        Arc::make_mut(self).process(stage, pipeline);
    }
}

fn first_column(values: Row) -> Result<crate::Value> {
    values
        .into_vec()
        .into_iter()
        .next()
        .ok_or_else(|| Error::msg("The row has no columns"))
}

macro_rules! impl_scalar_element {
    ($($source:ty),+ $(,)?) => {$(
        impl Element for $source {
            fn shape(_registry: &SchemaRegistry) -> Shape {
                Shape::Scalar
            }
            fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self> {
                let value = first_column(values)?;
                let column = schema.positional.first().cloned().unwrap_or_default();
                <Self as FromColumn>::from_column(value, &column, context)
            }
        }
    )+};
}
impl_scalar_element!(
    bool,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    String,
    Decimal,
    Uuid,
    Date,
    Time,
    PrimitiveDateTime,
    OffsetDateTime,
    serde_json::Value,
);

impl<T: FromColumn + Send + 'static> Element for Option<T> {
    fn shape(_registry: &SchemaRegistry) -> Shape {
        Shape::Scalar
    }
    fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self> {
        let value = first_column(values)?;
        let column = schema.positional.first().cloned().unwrap_or_default();
        <Self as FromColumn>::from_column(value, &column, context)
    }
}

macro_rules! impl_tuple_element {
    ($len:literal; $($name:ident $idx:tt),+) => {
        impl<$($name: FromColumn + Send + 'static),+> Element for ($($name,)+) {
            fn shape(_registry: &SchemaRegistry) -> Shape {
                Shape::Tuple($len)
            }
            fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self> {
                if values.len() < $len {
                    return Err(Error::msg(format!(
                        "The row has {} columns, a tuple of {} was requested",
                        values.len(),
                        $len
                    )));
                }
                let mut values = values.into_vec().into_iter();
                Ok(($(
                    $name::from_column(
                        values.next().unwrap_or_default(),
                        &schema.positional[$idx],
                        context,
                    )?,
                )+))
            }
        }
    };
}
impl_tuple_element!(1; A 0);
impl_tuple_element!(2; A 0, B 1);
impl_tuple_element!(3; A 0, B 1, C 2);
impl_tuple_element!(4; A 0, B 1, C 2, D 3);
impl_tuple_element!(5; A 0, B 1, C 2, D 3, E 4);
impl_tuple_element!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_tuple_element!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_tuple_element!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

impl<T: FromColumn + Send + 'static> Element for Vec<T> {
    fn shape(_registry: &SchemaRegistry) -> Shape {
        Shape::List
    }
    fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self> {
        values
            .into_vec()
            .into_iter()
            .zip(schema.positional.iter())
            .map(|(value, column)| T::from_column(value, column, context))
            .collect()
    }
}

fn column_map<T: FromColumn, M: FromIterator<(String, T)>>(
    values: Row,
    schema: &ColumnsSchema,
    context: &ScanContext,
) -> Result<M> {
    values
        .into_vec()
        .into_iter()
        .zip(schema.positional.iter())
        .map(|(value, column)| Ok((column.name.to_string(), T::from_column(value, column, context)?)))
        .collect()
}

impl<T: FromColumn + Send + 'static, S: BuildHasher + Default + Send + 'static> Element
    for HashMap<String, T, S>
{
    fn shape(_registry: &SchemaRegistry) -> Shape {
        Shape::Map
    }
    fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self> {
        column_map(values, schema, context)
    }
}

impl<T: FromColumn + Send + 'static> Element for BTreeMap<String, T> {
    fn shape(_registry: &SchemaRegistry) -> Shape {
        Shape::Map
    }
    fn from_row(values: Row, schema: &ColumnsSchema, context: &ScanContext) -> Result<Self> {
        column_map(values, schema, context)
    }
}

/// Destination of a read: a sequence or a map keyed by the primary key of its beans.
pub trait Container: Default + Send {
    type Element: Element;
    /// Whether inserting needs the primary key of the element.
    const KEYED: bool;

    /// Rejects element shapes the container cannot hold, before anything is queried.
    fn check_shape(shape: &Shape) -> Result<()>;

    fn insert(&mut self, element: Self::Element, key: Option<&PrimaryKey>) -> Result<()>;

    /// Moves every element of `other` into `self`.
    fn merge(&mut self, other: Self);
}

/// Shape of the container's elements, checked against the container.
pub fn resolve_shape<C: Container>(registry: &SchemaRegistry) -> Result<Shape> {
    let shape = C::Element::shape(registry);
    C::check_shape(&shape)?;
    Ok(shape)
}

impl<E: Element> Container for Vec<E> {
    type Element = E;
    const KEYED: bool = false;

    fn check_shape(_shape: &Shape) -> Result<()> {
        Ok(())
    }

    fn insert(&mut self, element: E, _key: Option<&PrimaryKey>) -> Result<()> {
        self.push(element);
        Ok(())
    }

    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

fn check_map_shape<K: MapKey, E>(shape: &Shape) -> Result<()> {
    let error = match shape {
        Shape::Bean(table) if !table.has_primary_key() => {
            ShapeError::MissingPrimaryKey(table.name.to_string())
        }
        Shape::Bean(table) if table.primary_keys.len() > 1 && !K::COMPOSITE => {
            ShapeError::KeyNotComposite {
                table: table.name.to_string(),
                columns: table.primary_keys.len(),
                key: any::type_name::<K>(),
            }
        }
        Shape::Bean(table)
            if K::ARITY.is_some_and(|arity| arity != table.primary_keys.len()) =>
        {
            ShapeError::KeyArity {
                table: table.name.to_string(),
                columns: table.primary_keys.len(),
                key: any::type_name::<K>(),
                arity: K::ARITY.unwrap_or_default(),
            }
        }
        Shape::Bean(..) => return Ok(()),
        _ => ShapeError::NotBean(any::type_name::<E>()),
    };
    log::error!("{}", error);
    Err(error.into())
}

fn map_key<K: MapKey>(key: Option<&PrimaryKey>) -> Result<K> {
    let Some(key) = key else {
        return Err(Error::msg("Map destinations need the primary key of every element"));
    };
    K::from_primary_key(key)
}

impl<K, E, S> Container for HashMap<K, E, S>
where
    K: MapKey + Eq + Hash + Send,
    E: Element,
    S: BuildHasher + Default + Send,
{
    type Element = E;
    const KEYED: bool = true;

    fn check_shape(shape: &Shape) -> Result<()> {
        check_map_shape::<K, E>(shape)
    }

    fn insert(&mut self, element: E, key: Option<&PrimaryKey>) -> Result<()> {
        HashMap::insert(self, map_key(key)?, element);
        Ok(())
    }

    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

impl<K, E> Container for BTreeMap<K, E>
where
    K: MapKey + Ord + Send,
    E: Element,
{
    type Element = E;
    const KEYED: bool = true;

    fn check_shape(shape: &Shape) -> Result<()> {
        check_map_shape::<K, E>(shape)
    }

    fn insert(&mut self, element: E, key: Option<&PrimaryKey>) -> Result<()> {
        BTreeMap::insert(self, map_key(key)?, element);
        Ok(())
    }

    fn merge(&mut self, other: Self) {
        self.extend(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnDescriptor, ColumnLabel, RowLabels, SqlType, Value};

    fn table(keys: usize) -> Arc<TableDescriptor> {
        Arc::new(TableDescriptor::new(
            "t",
            "T",
            (0..3)
                .map(|i| ColumnDescriptor {
                    primary_key: i < keys,
                    ..ColumnDescriptor::new(format!("c{i}"), vec![i])
                })
                .collect(),
        ))
    }

    #[test]
    fn map_shapes() {
        let single = Shape::Bean(table(1));
        let composite = Shape::Bean(table(2));
        let keyless = Shape::Bean(table(0));
        assert!(<HashMap<i64, Vec<i32>>>::check_shape(&single).is_ok());
        assert!(<BTreeMap<[i64; 2], Vec<i32>>>::check_shape(&composite).is_ok());
        assert!(<HashMap<Vec<i64>, Vec<i32>>>::check_shape(&composite).is_ok());
        let error = <HashMap<i64, Vec<i32>>>::check_shape(&composite).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ShapeError>(),
            Some(ShapeError::KeyNotComposite { columns: 2, .. })
        ));
        let error = <HashMap<[i64; 3], Vec<i32>>>::check_shape(&composite).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ShapeError>(),
            Some(ShapeError::KeyArity {
                columns: 2,
                arity: 3,
                ..
            })
        ));
        assert!(<BTreeMap<[i64; 1], Vec<i32>>>::check_shape(&single).is_ok());
        let error = <BTreeMap<i64, Vec<i32>>>::check_shape(&keyless).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ShapeError>(),
            Some(ShapeError::MissingPrimaryKey(..))
        ));
        let error = <HashMap<i64, i32>>::check_shape(&Shape::Scalar).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ShapeError>(),
            Some(ShapeError::NotBean(..))
        ));
        assert!(<Vec<i32>>::check_shape(&Shape::Scalar).is_ok());
    }

    #[test]
    fn positional_projections() {
        let labels: RowLabels = [
            ColumnLabel::new("id", SqlType::BigInt),
            ColumnLabel::new("name", SqlType::Varchar),
        ]
        .into_iter()
        .collect();
        let schema = ColumnsSchema::resolve(&labels, None);
        let context = ScanContext::default();
        let row = || -> Row {
            [Value::Int64(Some(7)), Value::Varchar(Some("seven".into()))].into()
        };
        assert_eq!(i32::from_row(row(), &schema, &context).unwrap(), 7);
        let (id, name) = <(u8, String)>::from_row(row(), &schema, &context).unwrap();
        assert_eq!((id, name.as_str()), (7, "seven"));
        let list = <Vec<String>>::from_row(row(), &schema, &context).unwrap();
        assert_eq!(list, ["7", "seven"]);
        let map = <BTreeMap<String, Option<String>>>::from_row(row(), &schema, &context).unwrap();
        assert_eq!(map["name"].as_deref(), Some("seven"));
        assert!(<(i32, String, i32)>::from_row(row(), &schema, &context).is_err());
        let empty: Row = Box::new([]);
        assert!(i64::from_row(empty, &schema, &context).is_err());
    }

    #[test]
    fn keyed_insert() {
        let mut map = HashMap::<[i64; 2], Vec<i32>>::new();
        let key = PrimaryKey::new(vec![Value::Int64(Some(1)), Value::Int64(Some(2))]);
        Container::insert(&mut map, vec![1], Some(&key)).unwrap();
        Container::insert(&mut map, vec![2], Some(&key)).unwrap();
        assert_eq!(map[&[1_i64, 2]], [2]);
        assert!(Container::insert(&mut map, vec![3], None).is_err());
        let mut other = HashMap::new();
        other.insert([3_i64, 4], vec![5]);
        map.merge(other);
        assert_eq!(map.len(), 2);
    }
}
