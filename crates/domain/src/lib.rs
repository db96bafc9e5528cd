//! Source region data for random ray transport
//!
#![doc = include_str!("../readme.md")]

mod domain;
mod error;
mod flat;
mod initial;
mod kinetics;
mod linear;
mod material;

#[doc(inline)]
pub use crate::domain::{RayDensity, SourceDomain};

#[doc(inline)]
pub use crate::error::{Error, Result};

#[doc(inline)]
pub use crate::flat::FlatSourceDomain;

#[doc(inline)]
pub use crate::initial::InitialCondition;

#[doc(inline)]
pub use crate::kinetics::KineticsData;

#[doc(inline)]
pub use crate::linear::LinearSourceDomain;

#[doc(inline)]
pub use crate::material::{ExternalSource, Material};
