//! Permission codenames
//!
//! Permissions are written as `feed.<capability>_<entity>`, for example
//! `feed.add_article` or `feed.view_consumer`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::data::EntityKind;

const APP_LABEL: &str = "feed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Add,
    Change,
    Delete,
    View,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Delete => "delete",
            Self::View => "view",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        [Self::Add, Self::Change, Self::Delete, Self::View]
            .into_iter()
            .find(|capability| capability.as_str() == value)
    }
}

/// A single granted capability on an entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permission {
    pub capability: Capability,
    pub entity: EntityKind,
}

impl Permission {
    pub const fn new(capability: Capability, entity: EntityKind) -> Self {
        Self { capability, entity }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}_{}",
            APP_LABEL,
            self.capability.as_str(),
            self.entity.as_str()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown permission {0:?}")]
pub struct UnknownPermission(pub String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(codename: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownPermission(codename.to_string());

        let (app, rest) = codename.split_once('.').ok_or_else(unknown)?;
        if app != APP_LABEL {
            return Err(unknown());
        }
        let (capability, entity) = rest.split_once('_').ok_or_else(unknown)?;
        let capability = Capability::parse(capability).ok_or_else(unknown)?;
        let entity = EntityKind::from_model_name(entity)
            .filter(|kind| kind.as_str() == entity)
            .ok_or_else(unknown)?;

        Ok(Self { capability, entity })
    }
}
