//! Model identities: a name, the template text handed to the inference engine and the
//! parameters the template declares.

use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::file::{JsonFileError, ReadJsonFile};

pub mod template;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelIdentity {
    /// Also serves as the cache key of the compiled model.
    pub name: String,
    pub template: String,
    /// Scalar parameters.
    pub parameters: Vec<String>,
    /// Parameters indexed by team.
    pub team_parameters: Vec<String>,
}
impl ModelIdentity {
    pub fn is_team_parameter(&self, name: &str) -> bool {
        self.team_parameters.iter().any(|param| param == name)
    }

    /// All declared parameter names, scalars first.
    pub fn all_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .chain(self.team_parameters.iter())
            .map(String::as_str)
    }

    /// Loads a custom identity from a JSON model file. See [`ModelFile`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelFileError> {
        let path = path.as_ref();
        let file = ModelFile::read_json_file(path)?;
        let template = match (file.template, file.template_file) {
            (Some(template), None) => template,
            (None, Some(template_file)) => {
                let template_file = match path.parent() {
                    Some(dir) if template_file.is_relative() => dir.join(template_file),
                    _ => template_file,
                };
                fs::read_to_string(&template_file).map_err(|err| ModelFileError::Template {
                    path: template_file,
                    err,
                })?
            }
            (Some(_), Some(_)) => return Err(ModelFileError::AmbiguousTemplate),
            (None, None) => return Err(ModelFileError::MissingTemplate),
        };
        Ok(Self {
            name: file.name,
            template,
            parameters: file.parameters,
            team_parameters: file.team_parameters,
        })
    }
}

/// On-disk form of a custom model. The template is given either inline or as a path, which is
/// resolved against the directory containing the JSON file when relative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub name: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub template_file: Option<PathBuf>,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub team_parameters: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ModelFileError {
    #[error("{0}")]
    Json(#[from] JsonFileError),

    #[error("cannot read template {path:?}: {err}")]
    Template { path: PathBuf, err: io::Error },

    #[error("model file must specify either 'template' or 'template_file'")]
    MissingTemplate,

    #[error("model file specifies both 'template' and 'template_file'")]
    AmbiguousTemplate,
}

const MAHER: &str = include_str!("../models/maher.model");
const TEAM_HOME_ADVANTAGE: &str = include_str!("../models/team_home_advantage.model");

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

/// The models shipped with the crate.
pub fn builtin() -> Vec<ModelIdentity> {
    vec![
        ModelIdentity {
            name: "maher".into(),
            template: MAHER.into(),
            parameters: strings(&["intercept", "home_advantage"]),
            team_parameters: strings(&["attack", "defence"]),
        },
        ModelIdentity {
            name: "team_home_advantage".into(),
            template: TEAM_HOME_ADVANTAGE.into(),
            parameters: strings(&["intercept"]),
            team_parameters: strings(&["attack", "defence", "home_advantage"]),
        },
    ]
}

pub fn lookup(name: &str) -> Option<ModelIdentity> {
    builtin().into_iter().find(|identity| identity.name == name)
}
