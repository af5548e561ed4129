//! Artifact resolution and library linking.

use alloy_primitives::{hex, Address};
use async_trait::async_trait;
use ignition_graph::{Artifact, ArtifactSource, Future, FutureGraph, FutureId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact for {0} not found")]
    NotFound(String),
    #[error("artifact name {name} is ambiguous: {candidates:?}")]
    Ambiguous { name: String, candidates: Vec<PathBuf> },
    #[error("failed to read artifact {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {name} is malformed: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("bytecode of {0} is not valid hex")]
    InvalidBytecode(String),
    #[error("{contract} needs library {library}, which was not provided")]
    MissingLibrary { contract: String, library: String },
    #[error("{contract} does not use library {library}")]
    UnusedLibrary { contract: String, library: String },
}

/// Resolves contract names (plain or fully qualified) to compiled artifacts.
#[async_trait]
pub trait ArtifactResolver: Send + Sync {
    async fn load_artifact(&self, contract_name: &str) -> Result<Artifact, ArtifactError>;
}

/// In-memory resolver keyed by contract name and fully qualified name.
#[derive(Debug, Clone, Default)]
pub struct ArtifactMap {
    artifacts: HashMap<String, Artifact>,
}

impl ArtifactMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: Artifact) {
        if !artifact.source_name.is_empty() {
            self.artifacts
                .insert(artifact.fully_qualified_name(), artifact.clone());
        }
        self.artifacts.insert(artifact.contract_name.clone(), artifact);
    }

    pub fn with(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }
}

#[async_trait]
impl ArtifactResolver for ArtifactMap {
    async fn load_artifact(&self, contract_name: &str) -> Result<Artifact, ArtifactError> {
        self.artifacts
            .get(contract_name)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(contract_name.to_string()))
    }
}

/// Reads build-tool artifacts from a directory tree.
///
/// `Foo` resolves to the single `Foo.json` found anywhere under the root;
/// `contracts/Foo.sol:Foo` resolves to `<root>/contracts/Foo.sol/Foo.json`.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactResolver {
    root: PathBuf,
}

impl DirectoryArtifactResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn find_by_name(root: &Path, file_name: &str) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else if path.file_name().is_some_and(|n| n == file_name) {
                    found.push(path);
                }
            }
        }
        found.sort();
        found
    }
}

#[async_trait]
impl ArtifactResolver for DirectoryArtifactResolver {
    async fn load_artifact(&self, contract_name: &str) -> Result<Artifact, ArtifactError> {
        let path = match contract_name.rsplit_once(':') {
            Some((source, name)) => self.root.join(source).join(format!("{name}.json")),
            None => {
                let root = self.root.clone();
                let file_name = format!("{contract_name}.json");
                let mut candidates =
                    tokio::task::spawn_blocking(move || Self::find_by_name(&root, &file_name))
                        .await
                        .map_err(|err| ArtifactError::Io {
                            name: contract_name.to_string(),
                            source: std::io::Error::other(err),
                        })?;
                match candidates.len() {
                    0 => return Err(ArtifactError::NotFound(contract_name.to_string())),
                    1 => candidates.remove(0),
                    _ => {
                        return Err(ArtifactError::Ambiguous {
                            name: contract_name.to_string(),
                            candidates,
                        })
                    }
                }
            }
        };

        debug!(contract = contract_name, path = %path.display(), "loading artifact");
        let content = tokio::fs::read_to_string(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound(contract_name.to_string())
            } else {
                ArtifactError::Io {
                    name: contract_name.to_string(),
                    source,
                }
            }
        })?;
        serde_json::from_str(&content).map_err(|source| ArtifactError::Parse {
            name: contract_name.to_string(),
            source,
        })
    }
}

/// Returns the creation bytecode with every library placeholder replaced.
///
/// `libraries` is keyed by library name or by `source:Library`.
pub fn link_bytecode(
    artifact: &Artifact,
    libraries: &BTreeMap<String, Address>,
) -> Result<Vec<u8>, ArtifactError> {
    let mut code: Vec<u8> = artifact
        .bytecode
        .strip_prefix("0x")
        .unwrap_or(&artifact.bytecode)
        .as_bytes()
        .to_vec();

    let mut used = 0;
    for (source, libs) in &artifact.link_references {
        for (library, references) in libs {
            let address = libraries
                .get(library)
                .or_else(|| libraries.get(&format!("{source}:{library}")))
                .ok_or_else(|| ArtifactError::MissingLibrary {
                    contract: artifact.contract_name.clone(),
                    library: library.clone(),
                })?;
            used += 1;
            let encoded = hex::encode(address);
            for reference in references {
                let start = reference.start * 2;
                let end = start + reference.length * 2;
                let slot = code
                    .get_mut(start..end)
                    .filter(|slot| slot.len() == encoded.len())
                    .ok_or_else(|| ArtifactError::InvalidBytecode(artifact.contract_name.clone()))?;
                slot.copy_from_slice(encoded.as_bytes());
            }
        }
    }

    if used != libraries.len() {
        let required = artifact.required_libraries();
        if let Some(extra) = libraries.keys().find(|name| {
            !required.iter().any(|&(source, lib)| {
                name.as_str() == lib || name.as_str() == format!("{source}:{lib}")
            })
        }) {
            return Err(ArtifactError::UnusedLibrary {
                contract: artifact.contract_name.clone(),
                library: extra.clone(),
            });
        }
    }

    hex::decode(&code).map_err(|_| ArtifactError::InvalidBytecode(artifact.contract_name.clone()))
}

/// Artifacts of every contract-bearing future of a graph, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    by_future: HashMap<FutureId, Arc<Artifact>>,
}

impl ArtifactStore {
    pub async fn load(
        graph: &FutureGraph,
        resolver: &dyn ArtifactResolver,
    ) -> Result<Self, ArtifactError> {
        let mut by_name: HashMap<String, Arc<Artifact>> = HashMap::new();
        let mut by_future = HashMap::new();
        for future in graph.iter() {
            let Some((name, source)) = future.artifact_source() else {
                continue;
            };
            let artifact = match source {
                ArtifactSource::Provided { artifact } => Arc::new((**artifact).clone()),
                ArtifactSource::Named => match by_name.get(name) {
                    Some(artifact) => artifact.clone(),
                    None => {
                        let artifact = Arc::new(resolver.load_artifact(name).await?);
                        by_name.insert(name.to_string(), artifact.clone());
                        artifact
                    }
                },
            };
            by_future.insert(future.id().to_string(), artifact);
        }
        Ok(Self { by_future })
    }

    pub fn insert(&mut self, future_id: impl Into<FutureId>, artifact: Artifact) {
        self.by_future.insert(future_id.into(), Arc::new(artifact));
    }

    /// The artifact a future was declared with.
    pub fn get(&self, future_id: &str) -> Option<&Artifact> {
        self.by_future.get(future_id).map(Arc::as_ref)
    }

    /// The artifact describing the contract a future interacts with: its own
    /// for deployments and attachments, the target's for calls and event reads.
    pub fn contract_artifact(&self, future: &Future) -> Option<&Artifact> {
        match future {
            Future::ContractCall(f) => self.get(&f.contract),
            Future::StaticCall(f) => self.get(&f.contract),
            Future::EncodeFunctionCall(f) => self.get(&f.contract),
            Future::ReadEventArgument(f) => self.get(&f.emitter),
            _ => self.get(future.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignition_graph::LinkReference;

    fn linked_artifact() -> Artifact {
        let placeholder = "__$d6f1a3b0e9c4d5b6a7f8e9d0c1b2a3f4e5$__";
        Artifact {
            contract_name: "Uses".to_string(),
            source_name: "contracts/Uses.sol".to_string(),
            abi: Vec::new(),
            bytecode: format!("0x73{placeholder}00"),
            link_references: BTreeMap::from([(
                "contracts/Math.sol".to_string(),
                BTreeMap::from([(
                    "Math".to_string(),
                    vec![LinkReference { start: 1, length: 20 }],
                )]),
            )]),
        }
    }

    #[test]
    fn test_link_bytecode_patches_placeholders() {
        let artifact = linked_artifact();
        let lib = Address::repeat_byte(0xab);
        let code = link_bytecode(&artifact, &BTreeMap::from([("Math".to_string(), lib)])).unwrap();
        assert_eq!(code.len(), 22);
        assert_eq!(code[0], 0x73);
        assert_eq!(&code[1..21], lib.as_slice());

        let fq = BTreeMap::from([("contracts/Math.sol:Math".to_string(), lib)]);
        assert_eq!(link_bytecode(&artifact, &fq).unwrap(), code);
    }

    #[test]
    fn test_link_bytecode_reports_missing_and_unused() {
        let artifact = linked_artifact();
        assert!(matches!(
            link_bytecode(&artifact, &BTreeMap::new()),
            Err(ArtifactError::MissingLibrary { .. })
        ));
        let libs = BTreeMap::from([
            ("Math".to_string(), Address::ZERO),
            ("Other".to_string(), Address::ZERO),
        ]);
        assert!(matches!(
            link_bytecode(&artifact, &libs),
            Err(ArtifactError::UnusedLibrary { .. })
        ));
    }

    #[tokio::test]
    async fn test_directory_resolver() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("contracts/Token.sol");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            nested.join("Token.json"),
            r#"{"contractName":"Token","sourceName":"contracts/Token.sol","abi":[],"bytecode":"0x00"}"#,
        )
        .unwrap();

        let resolver = DirectoryArtifactResolver::new(dir.path());
        assert_eq!(resolver.load_artifact("Token").await.unwrap().contract_name, "Token");
        assert!(resolver
            .load_artifact("contracts/Token.sol:Token")
            .await
            .is_ok());
        assert!(matches!(
            resolver.load_artifact("Missing").await,
            Err(ArtifactError::NotFound(_))
        ));
    }
}
