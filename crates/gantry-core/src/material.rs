//! Materials, resolved revisions and the build cause.

use crate::env::{EnvironmentVariableContext, escape_name};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScmKind {
    Git,
    Svn,
    Hg,
    P4,
    Tfs,
    Plugin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Material {
    Scm {
        kind: ScmKind,
        url: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        folder: Option<String>,
    },
    Dependency {
        pipeline_name: String,
        stage_name: String,
        #[serde(default)]
        name: Option<String>,
    },
    Package {
        repository: String,
        package: String,
    },
}

impl Material {
    pub fn git(url: impl Into<String>) -> Self {
        Material::Scm {
            kind: ScmKind::Git,
            url: url.into(),
            name: None,
            folder: None,
        }
    }

    pub fn dependency(pipeline_name: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Material::Dependency {
            pipeline_name: pipeline_name.into(),
            stage_name: stage_name.into(),
            name: None,
        }
    }

    /// Escaped suffix used in material environment variable names.
    pub fn env_suffix(&self) -> Option<String> {
        match self {
            Material::Scm { name, folder, .. } => {
                name.as_deref().or(folder.as_deref()).map(escape_name)
            }
            Material::Dependency {
                pipeline_name,
                name,
                ..
            } => Some(escape_name(name.as_deref().unwrap_or(pipeline_name))),
            Material::Package {
                repository,
                package,
            } => Some(escape_name(&format!("{}_{}", repository, package))),
        }
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self, Material::Dependency { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifiedAction {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedFile {
    pub file_name: String,
    pub action: ModifiedAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub revision: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    pub modified_time: DateTime<Utc>,
    /// Upstream pipeline label, for dependency revisions.
    #[serde(default)]
    pub pipeline_label: Option<String>,
    #[serde(default)]
    pub modified_files: Vec<ModifiedFile>,
}

impl Modification {
    pub fn new(revision: impl Into<String>, modified_time: DateTime<Utc>) -> Self {
        Self {
            revision: revision.into(),
            user_name: None,
            comment: None,
            modified_time,
            pipeline_label: None,
            modified_files: vec![],
        }
    }
}

/// A material together with the modifications that triggered a run,
/// latest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRevision {
    pub material: Material,
    pub modifications: Vec<Modification>,
    #[serde(default)]
    pub changed: bool,
}

impl MaterialRevision {
    pub fn new(material: Material, changed: bool, modifications: Vec<Modification>) -> Self {
        Self {
            material,
            modifications,
            changed,
        }
    }

    pub fn latest(&self) -> Option<&Modification> {
        self.modifications.first()
    }

    pub fn oldest(&self) -> Option<&Modification> {
        self.modifications.last()
    }

    fn populate_environment(&self, context: &mut EnvironmentVariableContext) {
        let Some(latest) = self.latest() else {
            return;
        };
        let suffix = self.material.env_suffix();
        let named = |base: &str| match &suffix {
            Some(s) => format!("{}_{}", base, s),
            None => base.to_string(),
        };

        match &self.material {
            Material::Dependency { .. } => {
                context.set_property(named("GO_DEPENDENCY_LOCATOR"), latest.revision.clone(), false);
                if let Some(label) = &latest.pipeline_label {
                    context.set_property(named("GO_DEPENDENCY_LABEL"), label.clone(), false);
                }
            }
            Material::Scm { .. } | Material::Package { .. } => {
                context.set_property(named("GO_REVISION"), latest.revision.clone(), false);
                context.set_property(named("GO_TO_REVISION"), latest.revision.clone(), false);
                if let Some(oldest) = self.oldest() {
                    context.set_property(named("GO_FROM_REVISION"), oldest.revision.clone(), false);
                }
            }
        }

        if let Some(s) = &suffix {
            context.set_property(
                format!("GO_MATERIAL_{}_HAS_CHANGED", s),
                self.changed.to_string(),
                false,
            );
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialRevisions(Vec<MaterialRevision>);

impl MaterialRevisions {
    pub fn new(revisions: Vec<MaterialRevision>) -> Self {
        Self(revisions)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialRevision> {
        self.0.iter()
    }

    pub fn has_changed(&self) -> bool {
        self.0.iter().any(|r| r.changed)
    }

    /// Latest upstream revision for a dependency on `pipeline_name`,
    /// matched case-insensitively.
    pub fn find_dependency_revision(&self, pipeline_name: &str) -> Option<&Modification> {
        self.0
            .iter()
            .find(|r| match &r.material {
                Material::Dependency {
                    pipeline_name: upstream,
                    ..
                } => upstream.eq_ignore_ascii_case(pipeline_name),
                _ => false,
            })
            .and_then(|r| r.latest())
    }

    /// Same revisions with every per-file change list removed.
    pub fn without_modified_files(&self) -> Self {
        let revisions = self
            .0
            .iter()
            .map(|r| MaterialRevision {
                material: r.material.clone(),
                changed: r.changed,
                modifications: r
                    .modifications
                    .iter()
                    .map(|m| Modification {
                        modified_files: vec![],
                        ..m.clone()
                    })
                    .collect(),
            })
            .collect();
        Self(revisions)
    }

    pub fn has_modified_files(&self) -> bool {
        self.0
            .iter()
            .flat_map(|r| r.modifications.iter())
            .any(|m| !m.modified_files.is_empty())
    }

    pub fn populate_environment(&self, context: &mut EnvironmentVariableContext) {
        if self.is_empty() {
            return;
        }
        for revision in &self.0 {
            revision.populate_environment(context);
        }
        context.set_property("GO_MATERIAL_HAS_CHANGED", self.has_changed().to_string(), false);
    }
}

/// Why a pipeline run happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCause {
    pub approver: String,
    #[serde(default)]
    pub material_revisions: MaterialRevisions,
    #[serde(default)]
    pub message: String,
}

impl BuildCause {
    pub fn manual(approver: impl Into<String>, material_revisions: MaterialRevisions) -> Self {
        let approver = approver.into();
        Self {
            message: format!("Forced by {}", approver),
            approver,
            material_revisions,
        }
    }

    pub fn without_modified_files(&self) -> Self {
        Self {
            approver: self.approver.clone(),
            material_revisions: self.material_revisions.without_modified_files(),
            message: self.message.clone(),
        }
    }
}
