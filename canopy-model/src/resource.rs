use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{cycle::CycleMetadata, error::Result};

/// Account-level identity attached to cloud resources.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudAccountMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
}

/// Identifying metadata every resource can report about itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(flatten)]
    pub account: CloudAccountMetadata,
}

impl ResourceMetadata {
    pub fn new(id: impl Into<String>, type_: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_: type_.into(),
            ..Default::default()
        }
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = Some(sub_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

/// A collected resource. The collector never inspects the payload; it only
/// routes it to the evaluator.
pub trait Resource: Send + Sync + fmt::Debug {
    fn metadata(&self) -> Result<ResourceMetadata>;

    fn data(&self) -> serde_json::Value;
}

/// Serialized form of a resource as handed to the evaluator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceFields {
    #[serde(flatten)]
    pub metadata: ResourceMetadata,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub raw: serde_json::Value,
}

/// Envelope pairing a resource with the cycle that produced it.
#[derive(Clone, Debug)]
pub struct ResourceInfo {
    pub resource: Arc<dyn Resource>,
    pub cycle_metadata: CycleMetadata,
}

impl ResourceInfo {
    pub fn new(resource: Arc<dyn Resource>, cycle_metadata: CycleMetadata) -> Self {
        Self {
            resource,
            cycle_metadata,
        }
    }

    pub fn metadata(&self) -> Result<ResourceMetadata> {
        self.resource.metadata()
    }

    pub fn data(&self) -> serde_json::Value {
        self.resource.data()
    }

    pub fn to_fields(&self) -> Result<ResourceFields> {
        Ok(ResourceFields {
            metadata: self.resource.metadata()?,
            raw: self.resource.data(),
        })
    }
}
