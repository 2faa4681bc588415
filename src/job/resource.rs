// src/job/resource.rs

//! Resource request grammar: `name:count[,name:count]*`, e.g. `cpu:1,gpu:2`.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{EvalflowError, Result};

const RESOURCE_ITEM: &str = r"^([A-Za-z][A-Za-z0-9_-]*):([0-9]+)$";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub count: u32,
}

/// Ordered list of requested resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceRequest(Vec<Resource>);

impl ResourceRequest {
    /// Parse the textual grammar. Names must be unique and counts positive.
    pub fn parse(spec: &str) -> Result<Self> {
        let re = Regex::new(RESOURCE_ITEM).map_err(anyhow::Error::from)?;
        let err = |reason: String| EvalflowError::ResourceSpec {
            spec: spec.to_string(),
            reason,
        };

        if spec.trim().is_empty() {
            return Err(err("empty resource spec".to_string()));
        }

        let mut resources: Vec<Resource> = Vec::new();
        for item in spec.split(',') {
            let item = item.trim();
            let caps = re
                .captures(item)
                .ok_or_else(|| err(format!("'{item}' does not match name:count")))?;
            let name = caps[1].to_string();
            let count: u32 = caps[2]
                .parse()
                .map_err(|e| err(format!("invalid count in '{item}': {e}")))?;
            if count == 0 {
                return Err(err(format!("count for '{name}' must be >= 1")));
            }
            if resources.iter().any(|r| r.name == name) {
                return Err(err(format!("resource '{name}' given more than once")));
            }
            resources.push(Resource { name, count });
        }

        Ok(Self(resources))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.0.iter()
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.0.iter().find(|r| r.name == name).map(|r| r.count)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for ResourceRequest {
    type Err = EvalflowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ResourceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|r| format!("{}:{}", r.name, r.count))
            .collect();
        f.pad(&parts.join(","))
    }
}
