//! Region resolution
//!
//! Expands each descriptor's region directive into one [`ResourceJob`] per
//! concrete target region. Resolution is pure: nothing here talks to a
//! provider.

use crate::error::{CloudError, Result};
use crate::resource::{RegionSpec, ResourceDescriptor, ResourceJob, ResourceKind};

/// Regions the reference provider exposes
pub const ALL_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "sa-east-1",
    "ca-central-1",
    "eu-west-1",
    "eu-central-1",
    "eu-west-2",
    "eu-west-3",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-east-1",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-south-1",
    "eu-north-1",
    "eu-south-1",
    "ap-northeast-3",
    "ap-southeast-3",
    "af-south-1",
];

pub fn default_available_regions() -> Vec<String> {
    ALL_REGIONS.iter().map(|r| r.to_string()).collect()
}

/// Resolve every descriptor into concrete jobs.
///
/// Fails on the first descriptor whose directive can't be satisfied; no
/// jobs are returned in that case.
pub fn resolve(
    descriptors: &[ResourceDescriptor],
    available_regions: &[String],
    default_region: &str,
) -> Result<Vec<ResourceJob>> {
    let mut jobs = Vec::new();
    for descriptor in descriptors {
        let regions = if descriptor.kind.is_global() {
            vec![default_region.to_string()]
        } else {
            resolve_spec(
                &descriptor.region,
                &descriptor.name,
                descriptor.kind,
                available_regions,
                default_region,
            )?
        };

        jobs.extend(regions.into_iter().map(|region| ResourceJob {
            name: descriptor.name.clone(),
            kind: descriptor.kind,
            meta: descriptor.meta.clone(),
            region,
        }));
    }
    tracing::debug!(
        "Resolved {} descriptor(s) into {} job(s)",
        descriptors.len(),
        jobs.len()
    );
    Ok(jobs)
}

/// Resolve a single region directive into the list of target regions.
///
/// Shared by resource and trigger resolution.
pub fn resolve_spec(
    spec: &RegionSpec,
    name: &str,
    kind: ResourceKind,
    available_regions: &[String],
    default_region: &str,
) -> Result<Vec<String>> {
    let check = |region: &str| -> Result<String> {
        if available_regions.iter().any(|r| r == region) {
            Ok(region.to_string())
        } else {
            Err(CloudError::RegionUnavailable {
                region: region.to_string(),
                name: name.to_string(),
                kind,
            })
        }
    };

    match spec {
        RegionSpec::Default => Ok(vec![default_region.to_string()]),
        RegionSpec::All => {
            let mut regions: Vec<String> = Vec::with_capacity(available_regions.len());
            for region in available_regions {
                if !regions.contains(region) {
                    regions.push(region.clone());
                }
            }
            Ok(regions)
        }
        RegionSpec::Single(region) => Ok(vec![check(region)?]),
        RegionSpec::List(list) => {
            let mut regions: Vec<String> = Vec::with_capacity(list.len());
            for region in list {
                let region = check(region)?;
                if !regions.contains(&region) {
                    regions.push(region);
                }
            }
            Ok(regions)
        }
        RegionSpec::Invalid(value) => Err(CloudError::InvalidRegion {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
