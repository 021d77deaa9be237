use super::credential_format::*;
use crate::utils::NonEmptyVec;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};

/// Signature algorithm requested for synthesized `jwt_vc_json` input descriptors.
const DEFAULT_JWT_ALG: &str = "EdDSA";

/// One credential a presentation definition asks for.
///
/// See [Input Descriptor Object](https://identity.foundation/presentation-exchange/spec/v2.0.0/#input-descriptor-object).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    pub(crate) id: String,
    #[serde(default)]
    constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    format: ClaimFormatMap,
}

impl InputDescriptor {
    /// The id must be unique within its presentation definition.
    pub fn new(id: String, constraints: Constraints) -> Self {
        Self {
            id,
            constraints,
            ..Default::default()
        }
    }

    /// Input descriptor requesting a `jwt_vc_json` credential of type `credential_type`.
    ///
    /// The descriptor id is the credential type itself.
    pub fn for_credential_type(credential_type: &str) -> Self {
        let type_filter = ConstraintsField::new("$.type".into()).set_filter(json!({
            "type": "string",
            "pattern": credential_type,
        }));

        Self {
            format: ClaimFormatMap::from([(
                ClaimFormatDesignation::JwtVcJson,
                ClaimFormatPayload::Alg(vec![DEFAULT_JWT_ALG.into()]),
            )]),
            ..Self::new(
                credential_type.to_owned(),
                Constraints::default().add_constraint(type_filter),
            )
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    pub fn format(&self) -> &ClaimFormatMap {
        &self.format
    }
}

#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<ConstraintsField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_disclosure: Option<ConstraintsLimitDisclosure>,
}

impl Constraints {
    pub fn add_constraint(mut self, field: ConstraintsField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[ConstraintsField] {
        &self.fields
    }
}

/// A claim the submitted credential must contain, located by one of `path`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConstraintsField {
    path: NonEmptyVec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// JSON Schema the value found at `path` must satisfy.
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    optional: Option<bool>,
}

impl ConstraintsField {
    pub fn new(path: String) -> ConstraintsField {
        ConstraintsField {
            path: NonEmptyVec::new(path),
            ..Default::default()
        }
    }

    pub fn path(&self) -> &NonEmptyVec<String> {
        &self.path
    }

    pub fn set_filter(mut self, filter: Json) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn filter(&self) -> Option<&Json> {
        self.filter.as_ref()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintsLimitDisclosure {
    Required,
    Preferred,
}
