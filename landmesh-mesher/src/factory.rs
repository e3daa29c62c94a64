//! Mesher construction by type

use crate::mesher::Mesher;
use crate::params::MesherParams;
use landmesh_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Available mesher implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MesherType {
    /// Triangulate in the left image and project to 3D landmarks
    Projective,
}

impl MesherType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Projective => "projective",
        }
    }
}

impl fmt::Display for MesherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MesherType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "projective" => Ok(Self::Projective),
            other => Err(Error::UnsupportedMesherType(other.to_string())),
        }
    }
}

/// Builds meshers, validating their configuration up front
pub struct MesherFactory;

impl MesherFactory {
    pub fn create_mesher(mesher_type: MesherType, params: MesherParams) -> Result<Mesher> {
        match mesher_type {
            MesherType::Projective => Mesher::new(params),
        }
    }

    /// Like [`MesherFactory::create_mesher`], with the type given by name
    pub fn create_mesher_by_name(name: &str, params: MesherParams) -> Result<Mesher> {
        Self::create_mesher(name.parse()?, params)
    }
}
