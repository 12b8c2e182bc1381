use std::collections::HashMap;

use camino::Utf8PathBuf;
use tracing::debug;

use crate::dataset::FeatureDataset;
use crate::domain::BaseName;
use crate::encoder::DatasetEncoder;
use crate::error::PointpackError;
use crate::workspace::Workspace;

/// Files written for one dataset. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedDatasetHandle {
    base_name: BaseName,
    files: Vec<Utf8PathBuf>,
}

impl SerializedDatasetHandle {
    pub fn new(base_name: BaseName, mut files: Vec<Utf8PathBuf>) -> Result<Self, PointpackError> {
        if files.is_empty() {
            return Err(PointpackError::EncodingProducedNoOutput(
                base_name.to_string(),
            ));
        }
        files.sort();
        Ok(Self { base_name, files })
    }

    pub fn base_name(&self) -> &BaseName {
        &self.base_name
    }

    pub fn files(&self) -> &[Utf8PathBuf] {
        &self.files
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().filter_map(|path| path.file_name()).collect()
    }
}

/// Encodes `dataset` into `workspace` under its base name and collects the
/// files the encoder produced.
///
/// Refuses to run when files for the same base name already exist, so one
/// source can never overwrite another's output.
pub fn serialize<E: DatasetEncoder + ?Sized>(
    dataset: &FeatureDataset,
    workspace: &Workspace,
    encoder: &E,
) -> Result<SerializedDatasetHandle, PointpackError> {
    workspace.ensure_exists()?;
    let base_name = dataset.base_name();

    if !owned_files(workspace, base_name)?.is_empty() {
        return Err(PointpackError::BaseNameInUse(base_name.to_string()));
    }

    let stem = output_stem(workspace, base_name);
    encoder.encode(dataset, &stem)?;

    let files = owned_files(workspace, base_name)?;
    debug!(base_name = %base_name, files = files.len(), "dataset serialized");
    SerializedDatasetHandle::new(base_name.clone(), files)
}

fn owned_files(
    workspace: &Workspace,
    base_name: &BaseName,
) -> Result<Vec<Utf8PathBuf>, PointpackError> {
    Ok(workspace
        .list_files()?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .map(|name| base_name.owns_file(name))
                .unwrap_or(false)
        })
        .collect())
}

/// Derives base names for a batch of source names.
///
/// Names that collide (ignoring case) fail for every source in the group, so
/// the outcome does not depend on input order. Runs before anything is written.
pub fn claim_base_names(
    source_names: &[&str],
    max_len: Option<usize>,
) -> Vec<Result<BaseName, PointpackError>> {
    let derived: Vec<_> = source_names
        .iter()
        .map(|name| BaseName::from_source_name(name, max_len))
        .collect();

    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, name) in derived.iter().enumerate() {
        if let Ok(name) = name {
            groups.entry(name.collision_key()).or_default().push(idx);
        }
    }

    derived
        .into_iter()
        .map(|result| {
            let name = result?;
            let group = &groups[&name.collision_key()];
            if group.len() > 1 {
                return Err(PointpackError::DuplicateBaseName {
                    base_name: name.to_string(),
                    sources: group.iter().map(|idx| source_names[*idx].to_string()).collect(),
                });
            }
            Ok(name)
        })
        .collect()
}

/// Output stem inside `workspace` for `base_name`.
pub fn output_stem(workspace: &Workspace, base_name: &BaseName) -> Utf8PathBuf {
    workspace.path().join(base_name.as_str())
}
