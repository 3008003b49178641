//! The fixed catalog of well-known types seeded on store initialization.
//!
//! Simple types back the system-type inheritance link: a user type whose
//! `base_type` is set becomes a child of the matching catalog entry. The
//! catalog names are hidden from ordinary type listings.
use crate::metadata::{ArtifactType, ExecutionType};

/// Names of all seeded simple types, excluded from `Get*Types` listings.
pub const SIMPLE_TYPE_NAMES: [&str; 9] = [
    "mlmd.Dataset",
    "mlmd.Model",
    "mlmd.Metrics",
    "mlmd.Statistics",
    "mlmd.Train",
    "mlmd.Transform",
    "mlmd.Process",
    "mlmd.Evaluate",
    "mlmd.Deploy",
];

pub fn is_simple_type_name(name: &str) -> bool {
    SIMPLE_TYPE_NAMES.contains(&name)
}

pub(crate) fn simple_artifact_types() -> Vec<ArtifactType> {
    ["mlmd.Dataset", "mlmd.Model", "mlmd.Metrics", "mlmd.Statistics"]
        .iter()
        .map(|name| ArtifactType::new(name))
        .collect()
}

pub(crate) fn simple_execution_types() -> Vec<ExecutionType> {
    [
        "mlmd.Train",
        "mlmd.Transform",
        "mlmd.Process",
        "mlmd.Evaluate",
        "mlmd.Deploy",
    ]
    .iter()
    .map(|name| ExecutionType::new(name))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ArtifactBaseType, ExecutionBaseType};

    #[test]
    fn catalog_names_round_trip_through_base_type_enums() {
        for ty in simple_artifact_types() {
            assert!(ArtifactBaseType::from_type_name(&ty.name).is_some());
        }
        for ty in simple_execution_types() {
            assert!(ExecutionBaseType::from_type_name(&ty.name).is_some());
        }
    }

    #[test]
    fn simple_type_names_are_recognized() {
        assert!(is_simple_type_name("mlmd.Dataset"));
        assert!(!is_simple_type_name("DataSet"));
    }
}
