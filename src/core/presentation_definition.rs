use super::credential_format::*;
use super::input_descriptor::*;

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::utils::NonEmptyVec;

/// The credentials a presentation session asks the wallet for.
///
/// See [Presentation Definition](https://identity.foundation/presentation-exchange/spec/v2.0.0/#presentation-definition).
#[derive(Clone, Default, Debug, Serialize, Deserialize, PartialEq)]
pub struct PresentationDefinition {
    #[serde(default)]
    id: String,
    input_descriptors: Vec<InputDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    submission_requirements: Option<Vec<Json>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    purpose: Option<String>,
    #[serde(default, skip_serializing_if = "ClaimFormatMap::is_empty")]
    format: ClaimFormatMap,
}

impl PresentationDefinition {
    pub fn new(id: String, input_descriptor: InputDescriptor) -> Self {
        Self {
            id,
            input_descriptors: vec![input_descriptor],
            ..Default::default()
        }
    }

    /// Parse a presentation definition supplied by a caller.
    ///
    /// The definition always gets a fresh random id, replacing any id it carries, so no two
    /// sessions share a `definition_id`. It must request at least one input, and input
    /// descriptor ids must be unique.
    pub fn from_json(value: Json) -> Result<Self> {
        let mut definition: Self =
            serde_json::from_value(value).context("malformed presentation definition")?;
        definition.id = uuid::Uuid::new_v4().to_string();

        if definition.input_descriptors.is_empty() {
            bail!("presentation definition must contain at least one input descriptor")
        }

        let mut seen = HashSet::new();
        for descriptor in &definition.input_descriptors {
            if !seen.insert(descriptor.id()) {
                bail!("duplicate input descriptor id `{}`", descriptor.id())
            }
        }

        Ok(definition)
    }

    /// Synthesize a definition requesting one credential of every given type.
    ///
    /// Each type becomes a `jwt_vc_json` input descriptor whose id is the type name,
    /// constrained on `$.type`.
    pub fn from_credential_types(types: &NonEmptyVec<String>) -> Self {
        let mut descriptors = types
            .iter()
            .map(|credential_type| InputDescriptor::for_credential_type(credential_type));

        let mut definition = match descriptors.next() {
            Some(first) => Self::new(uuid::Uuid::new_v4().to_string(), first),
            None => Self::default(),
        };

        for descriptor in descriptors {
            definition = definition.add_input_descriptors(descriptor);
        }

        definition
    }

    pub fn id(&self) -> &String {
        &self.id
    }

    pub fn add_input_descriptors(mut self, input_descriptor: InputDescriptor) -> Self {
        self.input_descriptors.push(input_descriptor);
        self
    }

    pub fn input_descriptors(&self) -> &Vec<InputDescriptor> {
        &self.input_descriptors
    }

    /// Input descriptors keyed by id.
    pub fn input_descriptors_map(&self) -> HashMap<&str, &InputDescriptor> {
        self.input_descriptors
            .iter()
            .map(|input_descriptor| (input_descriptor.id(), input_descriptor))
            .collect()
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

    /// JSON representation, as served to wallets.
    pub fn to_json(&self) -> Result<Json> {
        serde_json::to_value(self).context("failed to serialize presentation definition")
    }
}
