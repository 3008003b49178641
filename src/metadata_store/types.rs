//! Schema consistency checking and the name+version-keyed type upsert
//! engine, written once over [`PropertiedType`].
use crate::access::AccessObject;
use crate::errors::StoreError;
use crate::metadata::{BaseTypeRequest, PropertiedType, TypeId};

/// Compares a stored type against an incoming one and produces the merged
/// schema.
///
/// Every property of the stored type must appear in the incoming type with
/// the same value kind, unless `can_omit_fields` allows it to be missing.
/// Properties only the incoming type has require `can_add_fields` and are
/// appended to the stored schema. Kind conflicts always fail; a property is
/// never widened or narrowed.
///
/// The error value is the precondition message the caller wraps.
pub(crate) fn check_fields_consistent<T: PropertiedType>(
    stored: &T,
    given: &T,
    can_add_fields: bool,
    can_omit_fields: bool,
) -> Result<T, String> {
    if stored.name() != given.name() {
        return Err(format!(
            "conflicting type name found in stored and given types: stored {:?}, given {:?}",
            stored.name(),
            given.name()
        ));
    }
    let mut omitted_fields_count = 0;
    for (name, stored_kind) in stored.properties() {
        match given.properties().get(name) {
            None => {
                omitted_fields_count += 1;
                if !can_omit_fields {
                    return Err(format!(
                        "can_omit_fields is false while the stored type has more properties: \
                         property {:?} is missing from the given type {:?}",
                        name,
                        given.name()
                    ));
                }
            }
            Some(given_kind) if given_kind != stored_kind => {
                return Err(format!(
                    "conflicting property value type found for {:?} of type {:?}: \
                     stored {}, given {}",
                    name,
                    stored.name(),
                    stored_kind,
                    given_kind
                ));
            }
            Some(_) => {}
        }
    }
    if stored.properties().len() - omitted_fields_count == given.properties().len() {
        // The incoming type introduces no new names.
        return Ok(stored.clone());
    }
    if !can_add_fields {
        return Err(format!(
            "can_add_fields is false while the given type has more properties: given {:?}",
            given.name()
        ));
    }
    let mut merged = stored.clone();
    for (name, kind) in given.properties() {
        merged.properties_mut().entry(name.clone()).or_insert(*kind);
    }
    Ok(merged)
}

/// Finds or creates the type keyed by (name, version).
///
/// A brand-new type is created as given (`can_add_fields` is ignored). An
/// existing type goes through the consistency check; schema additions are
/// persisted and a check failure surfaces as `AlreadyExists` wrapping the
/// precondition message. Either way the base-type linking step runs last.
pub(crate) async fn upsert_type<T: PropertiedType>(
    access: &mut AccessObject,
    ty: &T,
    can_add_fields: bool,
    can_omit_fields: bool,
) -> Result<TypeId, StoreError> {
    let stored = match access
        .find_type_by_name_and_version::<T>(ty.name(), ty.version())
        .await
    {
        Ok(stored) => Some(stored),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e),
    };
    let type_id = match stored {
        None => access.create_type(ty).await?,
        Some(stored) => {
            let type_id = stored.id().ok_or_else(|| {
                StoreError::FailedPrecondition(format!(
                    "stored {} type {:?} has no id",
                    T::KIND,
                    ty.name()
                ))
            })?;
            match check_fields_consistent(&stored, ty, can_add_fields, can_omit_fields) {
                Ok(merged) => access.update_type(type_id, merged.properties()).await?,
                Err(message) => {
                    return Err(StoreError::AlreadyExists(format!(
                        "type already exists with different properties: {}",
                        message
                    )))
                }
            }
            type_id
        }
    };
    upsert_type_inheritance_link(access, ty, type_id).await?;
    Ok(type_id)
}

/// Maintains the inheritance link of `type_id` according to the request's
/// base-type descriptor.
///
/// No descriptor is a no-op; the reserved unset sentinel requests a link
/// deletion, which is unsupported; pointing an already-linked type at a
/// different base is an unsupported update; more than one stored parent is
/// a broken precondition.
async fn upsert_type_inheritance_link<T: PropertiedType>(
    access: &mut AccessObject,
    ty: &T,
    type_id: TypeId,
) -> Result<(), StoreError> {
    let base_name = match ty.base_type_request() {
        BaseTypeRequest::Absent => return Ok(()),
        BaseTypeRequest::Unset => {
            return Err(StoreError::Unimplemented(
                "base_type deletion is not supported yet".to_owned(),
            ))
        }
        BaseTypeRequest::Named(name) => name,
    };
    let parents = access.find_parent_types_by_type_ids(&[type_id]).await?;
    let parents = parents
        .get(&type_id)
        .map(|parents| parents.as_slice())
        .unwrap_or(&[]);
    match parents {
        [] => {
            let base_id = access
                .find_type_id_by_name_and_version(T::KIND, base_name, None)
                .await?;
            access.create_parent_type_link(type_id, base_id).await
        }
        [parent_name] if parent_name == base_name => Ok(()),
        [_] => Err(StoreError::Unimplemented(
            "base_type update is not supported yet".to_owned(),
        )),
        _ => Err(StoreError::FailedPrecondition(format!(
            "type {} has more than one parent type",
            type_id
        ))),
    }
}

/// Populates `base_type` of every listed type from the parent-type table.
///
/// A stored parent outside the closed system-type mapping is a broken
/// precondition, as is more than one parent.
pub(crate) async fn set_base_types<T: PropertiedType>(
    access: &mut AccessObject,
    types: &mut [T],
) -> Result<(), StoreError> {
    if types.is_empty() {
        return Ok(());
    }
    let type_ids: Vec<TypeId> = types.iter().filter_map(|ty| ty.id()).collect();
    let parents = access.find_parent_types_by_type_ids(&type_ids).await?;
    for ty in types.iter_mut() {
        let id = match ty.id() {
            Some(id) => id,
            None => continue,
        };
        let found = match parents.get(&id) {
            Some(found) => found.as_slice(),
            None => continue,
        };
        match found {
            [] => {}
            [parent_name] => {
                if !ty.apply_parent_type(parent_name) {
                    return Err(StoreError::FailedPrecondition(format!(
                        "parent type {:?} of type {} is not a known system type",
                        parent_name, id
                    )));
                }
            }
            _ => {
                return Err(StoreError::FailedPrecondition(format!(
                    "type {} has more than one parent type",
                    id
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ArtifactType, PropertyType};
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn artifact_type(name: &str, properties: &[(&str, PropertyType)]) -> ArtifactType {
        let mut ty = ArtifactType::new(name);
        for (property, kind) in properties {
            ty = ty.property(property, *kind);
        }
        ty
    }

    #[test]
    fn identical_types_pass_unchanged() {
        let stored = artifact_type("Img", &[("u", PropertyType::String)]);
        let merged = check_fields_consistent(&stored, &stored.clone(), false, false).unwrap();
        assert_eq!(merged.properties, stored.properties);
    }

    #[test]
    fn name_conflict_fails() {
        let stored = artifact_type("Img", &[]);
        let given = artifact_type("Model", &[]);
        assert!(check_fields_consistent(&stored, &given, true, true).is_err());
    }

    #[test]
    fn kind_conflict_fails_even_with_both_flags() {
        let stored = artifact_type("Img", &[("u", PropertyType::String)]);
        let given = artifact_type("Img", &[("u", PropertyType::Int)]);
        assert!(check_fields_consistent(&stored, &given, true, true).is_err());
    }

    #[test]
    fn omission_requires_can_omit_fields() {
        let stored = artifact_type("Img", &[("u", PropertyType::String)]);
        let given = artifact_type("Img", &[]);
        assert!(check_fields_consistent(&stored, &given, false, false).is_err());
        let merged = check_fields_consistent(&stored, &given, false, true).unwrap();
        assert_eq!(merged.properties, stored.properties);
    }

    #[test]
    fn addition_requires_can_add_fields() {
        let stored = artifact_type("Img", &[("u", PropertyType::String)]);
        let given = artifact_type(
            "Img",
            &[("u", PropertyType::String), ("w", PropertyType::Int)],
        );
        assert!(check_fields_consistent(&stored, &given, false, false).is_err());
        let merged = check_fields_consistent(&stored, &given, true, false).unwrap();
        assert_eq!(merged.properties.len(), 2);
        assert_eq!(merged.properties["w"], PropertyType::Int);
    }

    fn property_map() -> impl Strategy<Value = BTreeMap<String, PropertyType>> {
        proptest::collection::btree_map(
            "[a-d]{1,2}",
            prop_oneof![
                Just(PropertyType::Int),
                Just(PropertyType::Double),
                Just(PropertyType::String),
            ],
            0..6,
        )
    }

    proptest! {
        /// With both flags set, the checker yields exactly the union of the
        /// two schemas, or fails when a shared name disagrees on the kind.
        #[test]
        fn merge_is_union_or_kind_conflict(
            stored_properties in property_map(),
            given_properties in property_map(),
        ) {
            let mut stored = ArtifactType::new("t");
            stored.properties = stored_properties.clone();
            let mut given = ArtifactType::new("t");
            given.properties = given_properties.clone();

            let has_conflict = stored_properties.iter().any(|(name, kind)| {
                given_properties.get(name).map(|given_kind| given_kind != kind).unwrap_or(false)
            });
            let result = check_fields_consistent(&stored, &given, true, true);
            if has_conflict {
                prop_assert!(result.is_err());
            } else {
                let mut expected = stored_properties.clone();
                for (name, kind) in &given_properties {
                    expected.entry(name.clone()).or_insert(*kind);
                }
                prop_assert_eq!(result.unwrap().properties, expected);
            }
        }

        /// The checker itself never mutates its inputs.
        #[test]
        fn inputs_are_left_untouched(
            stored_properties in property_map(),
            given_properties in property_map(),
        ) {
            let mut stored = ArtifactType::new("t");
            stored.properties = stored_properties.clone();
            let mut given = ArtifactType::new("t");
            given.properties = given_properties.clone();
            let _ = check_fields_consistent(&stored, &given, true, true);
            prop_assert_eq!(stored.properties, stored_properties);
            prop_assert_eq!(given.properties, given_properties);
        }
    }
}
