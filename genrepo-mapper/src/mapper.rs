use serde_json::{Map, Value};

use crate::error::MapError;
use crate::field::{short_type_name, Mappable};

/// Name-matching mapper between two [`Mappable`] shapes.
///
/// The mapper is direction-agnostic: it is parameterized by a source value
/// and a target type, so the same call maps entities to models and models
/// back to entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityMapper;

impl EntityMapper {
    /// Map `source` into a new `T`.
    ///
    /// Every field `T` declares must exist on `S` under the same name with an
    /// assignable type. Fields `S` has beyond those are ignored.
    pub fn map_to<T: Mappable, S: Mappable>(source: &S) -> Result<T, MapError> {
        let value = to_value(source)?;
        check_fields::<T, S>()?;
        build::<T, S>(value)
    }

    /// Map an optional reference; `None` is [`MapError::NullInput`].
    pub fn map_opt<T: Mappable, S: Mappable>(source: Option<&S>) -> Result<T, MapError> {
        match source {
            Some(source) => Self::map_to(source),
            None => Err(MapError::NullInput {
                type_name: short_type_name::<S>(),
            }),
        }
    }

    /// Map every element, preserving order.
    ///
    /// The first failure aborts the whole batch and no partial result is
    /// returned.
    pub fn map_to_list<T: Mappable, S: Mappable>(sources: &[S]) -> Result<Vec<T>, MapError> {
        let values = sources
            .iter()
            .map(to_value)
            .collect::<Result<Vec<_>, _>>()?;
        check_fields::<T, S>()?;
        let mapped = values
            .into_iter()
            .map(build::<T, S>)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::trace!(
            source = %short_type_name::<S>(),
            target = %short_type_name::<T>(),
            count = mapped.len(),
            "mapped list"
        );
        Ok(mapped)
    }
}

/// Method-call form of [`EntityMapper::map_to`].
pub trait MapInto: Mappable {
    fn map_into<T: Mappable>(&self) -> Result<T, MapError> {
        EntityMapper::map_to(self)
    }
}

impl<S: Mappable> MapInto for S {}

fn to_value<S: Mappable>(source: &S) -> Result<Value, MapError> {
    let value =
        serde_json::to_value(source).map_err(|e| MapError::Serialization(e.to_string()))?;
    if value.is_null() {
        return Err(MapError::NullInput {
            type_name: short_type_name::<S>(),
        });
    }
    Ok(value)
}

fn check_fields<T: Mappable, S: Mappable>() -> Result<(), MapError> {
    for target in T::fields() {
        let Some(source) = S::field(target.name) else {
            return Err(MapError::MissingField {
                field: target.name.to_string(),
                source_type: short_type_name::<S>(),
                target_type: short_type_name::<T>(),
            });
        };
        if !source.ty.is_assignable_to(&target.ty) {
            return Err(MapError::IncompatibleField {
                field: target.name.to_string(),
                source_type: short_type_name::<S>(),
                target_type: short_type_name::<T>(),
                source_field_type: source.ty.to_string(),
                target_field_type: target.ty.to_string(),
            });
        }
    }
    Ok(())
}

fn build<T: Mappable, S: Mappable>(value: Value) -> Result<T, MapError> {
    let Value::Object(mut source) = value else {
        return Err(MapError::Serialization(format!(
            "{} does not serialize to an object",
            short_type_name::<S>()
        )));
    };
    let target: Map<String, Value> = T::fields()
        .iter()
        .map(|f| {
            let v = source.remove(f.name).unwrap_or(Value::Null);
            (f.name.to_string(), v)
        })
        .collect();
    serde_json::from_value(Value::Object(target)).map_err(|e| MapError::Serialization(e.to_string()))
}
