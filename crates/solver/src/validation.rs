// internal modules
use crate::error::{Error, Result};
use crate::settings::{Inputs, RunMode, SourceShape};

// neutronics toolbox
use rrtools_utils::f;

// external crates
use log::debug;

/// Check that inputs describe a problem the solver can run
///
/// Run before anything is allocated, so an invalid problem never produces a
/// partially built simulation. `regions` is the number of source regions in
/// the geometry the inputs will be traced through.
///
/// Fails with [Error::Configuration] describing the first problem found.
///
/// ```rust
/// # use rrtools_solver::{validate_random_ray_inputs, Inputs, SourceShape};
/// # use rrtools_domain::Material;
/// let mut inputs = Inputs {
///     materials: vec![Material {
///         total: vec![1.0],
///         nu_fission: vec![1.2],
///         chi: vec![1.0],
///         scatter: vec![vec![0.1]],
///         ..Default::default()
///     }],
///     region_materials: vec![0],
///     ..Default::default()
/// };
/// assert!(validate_random_ray_inputs(&inputs, 1).is_ok());
///
/// // a linear source needs the centroid of every region
/// inputs.settings.source_shape = SourceShape::Linear;
/// assert!(validate_random_ray_inputs(&inputs, 1).is_err());
/// ```
pub fn validate_random_ray_inputs(inputs: &Inputs, regions: usize) -> Result<()> {
    inputs.settings.check()?;

    let groups = inputs.group_count();
    if groups == 0 {
        return Err(invalid("no energy groups, at least one material is required"));
    }

    for material in &inputs.materials {
        material.check(groups)?;
    }

    if regions == 0 {
        return Err(invalid("geometry has no source regions"));
    }

    if inputs.region_materials.len() != regions {
        return Err(invalid(f!(
            "{} region materials given for {regions} source regions",
            inputs.region_materials.len()
        )));
    }

    if let Some(m) = inputs
        .region_materials
        .iter()
        .find(|m| **m >= inputs.materials.len())
    {
        return Err(invalid(f!(
            "material {m} is used but only {} are defined",
            inputs.materials.len()
        )));
    }

    check_source_shape(inputs, regions)?;
    check_sources(inputs, regions, groups)?;

    if let Some(kinetics) = &inputs.kinetics {
        kinetics.check(groups)?;
    }

    debug!(
        "Validated {} {} problem: {regions} regions, {groups} groups",
        inputs.settings.source_shape, inputs.settings.mode
    );
    Ok(())
}

fn check_source_shape(inputs: &Inputs, regions: usize) -> Result<()> {
    match inputs.settings.source_shape {
        SourceShape::Flat => Ok(()),
        SourceShape::Linear => match &inputs.region_centroids {
            None => Err(invalid("linear sources need region centroids")),
            Some(c) if c.len() != regions => Err(invalid(f!(
                "{} region centroids given for {regions} source regions",
                c.len()
            ))),
            Some(c) if c.iter().flatten().any(|v| !v.is_finite()) => {
                Err(invalid("region centroids must be finite"))
            }
            Some(_) => Ok(()),
        },
    }
}

fn check_sources(inputs: &Inputs, regions: usize, groups: usize) -> Result<()> {
    for source in &inputs.sources {
        if source.region >= regions {
            return Err(invalid(f!(
                "external source in region {} is outside the {regions} source regions",
                source.region
            )));
        }

        if source.strength.len() != groups {
            return Err(invalid(f!(
                "external source in region {} has {} groups, expected {groups}",
                source.region,
                source.strength.len()
            )));
        }

        if source.strength.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(invalid(f!(
                "external source in region {} has a negative or undefined strength",
                source.region
            )));
        }
    }

    let has_source = inputs
        .sources
        .iter()
        .any(|s| s.strength.iter().any(|v| *v > 0.0));

    match inputs.settings.mode {
        RunMode::FixedSource if !has_source => {
            Err(invalid("fixed source mode needs a non-zero external source"))
        }
        RunMode::Eigenvalue if !inputs.materials.iter().any(|m| m.is_fissile()) => {
            Err(invalid("eigenvalue mode needs at least one fissile material"))
        }
        _ => Ok(()),
    }
}

fn invalid<S: Into<String>>(message: S) -> Error {
    Error::Configuration(message.into())
}
