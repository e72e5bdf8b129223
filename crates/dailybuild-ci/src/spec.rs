//! Run plan identity.

use dailybuild_core::{Platform, PlatformProfile};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// What a run is going to do, derived from the resolved profile.
///
/// Two runs with the same profile share a `plan_digest`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunPlan {
    pub platform: Platform,

    /// Project names in visit order.
    pub projects: Vec<String>,

    /// Whether the platform has a packaging recipe.
    pub packages: bool,

    /// SHA-256 over the ordered projects and their command lines.
    pub plan_digest: String,
}

impl RunPlan {
    pub fn from_profile(profile: &PlatformProfile) -> Self {
        let projects: Vec<String> = profile.projects.iter().map(|p| p.name.clone()).collect();

        let mut parts = Vec::new();
        parts.push(profile.platform.name().to_string());
        for project in &profile.projects {
            parts.push(project.name.clone());
            parts.push(project.path.to_string_lossy().into_owned());
            parts.push(project.configure_args.clone());
            parts.push(project.origin.clone());
        }
        let commands = &profile.commands;
        for template in [
            &commands.sync_check,
            &commands.pull,
            &commands.configure,
            &commands.compile,
            &commands.install,
        ] {
            parts.push(template.clone());
        }
        if let Some(recipe) = &profile.packaging {
            parts.push(recipe.freeze_command.clone());
            parts.push(recipe.assembly_command.clone());
        }

        Self {
            platform: profile.platform,
            projects,
            packages: profile.packaging.is_some(),
            plan_digest: compute_plan_digest(&parts),
        }
    }

    /// Fresh identifier for one execution of this plan.
    pub fn new_run_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic digest of ordered parts.
fn compute_plan_digest(parts: &[String]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
