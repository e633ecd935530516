//! Index file format.
//!
//! An index file is a JSON document holding the index and a BLAKE3 checksum
//! of the index's canonical (compact) serialization:
//!
//! ```text
//! { "checksum": "<hex>", "index": { "format_version": 1, "srs": {..}, .. } }
//! ```
//!
//! A truncated or tampered file fails the checksum and is reported as corrupt.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use geoindex_core::{GraphName, IndexError, Result, SerializationStrategy, SrsInfo};
use serde::{Deserialize, Serialize};

use crate::index::SpatialIndex;
use crate::tree::{GraphTree, TreeEntry};

/// Version written into every index file; other versions are rejected on load.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexDocument<E> {
    format_version: u32,
    srs: SrsInfo,
    serialization: SerializationStrategy,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    default_graph: Vec<E>,
    named_graphs: BTreeMap<GraphName, Vec<E>>,
}

#[derive(Serialize)]
struct PersistedRef<'a, E> {
    checksum: String,
    index: &'a IndexDocument<E>,
}

#[derive(Deserialize)]
struct Persisted {
    checksum: String,
    index: IndexDocument<TreeEntry>,
}

fn checksum<E: Serialize>(document: &IndexDocument<E>) -> Result<String> {
    let canonical = serde_json::to_vec(document)?;
    Ok(blake3::hash(&canonical).to_hex().to_string())
}

impl SpatialIndex {
    /// Serialize the index, using its serialization strategy for layout.
    ///
    /// JSON has no representation for infinities or NaN, so an index holding
    /// a non-finite envelope is refused before any byte is written.
    pub fn encode<W: Write>(&self, mut writer: W) -> Result<()> {
        self.ensure_encodable()?;

        let document = IndexDocument {
            format_version: FORMAT_VERSION,
            srs: self.srs.clone(),
            serialization: self.serialization,
            created_at: self.created_at,
            updated_at: self.updated_at,
            default_graph: self.default_tree.entries(),
            named_graphs: self
                .named_trees
                .iter()
                .map(|(graph, tree)| (graph.clone(), tree.entries()))
                .collect(),
        };

        let persisted = PersistedRef {
            checksum: checksum(&document)?,
            index: &document,
        };

        match self.serialization {
            SerializationStrategy::Compact => serde_json::to_writer(&mut writer, &persisted)?,
            SerializationStrategy::Pretty => serde_json::to_writer_pretty(&mut writer, &persisted)?,
        }
        writer.flush()?;
        Ok(())
    }

    fn ensure_encodable(&self) -> Result<()> {
        let non_finite = std::iter::once(&self.default_tree)
            .chain(self.named_trees.values())
            .flat_map(GraphTree::entries)
            .find(|entry| !entry.envelope.is_finite());
        match non_finite {
            Some(entry) => Err(IndexError::NonFiniteEnvelope {
                feature: entry.feature.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Decode an index from the bytes of an index file. `source` names the
    /// file in error messages.
    pub fn decode(bytes: &[u8], source: &str) -> Result<Self> {
        let corrupt = |reason: String| IndexError::Corrupt {
            path: source.to_string(),
            reason,
        };

        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;

        let version = value
            .pointer("/index/format_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| corrupt("missing format_version".to_string()))?;
        if version != u64::from(FORMAT_VERSION) {
            return Err(IndexError::IncompatibleFormat {
                found: version,
                supported: FORMAT_VERSION,
            });
        }

        let persisted: Persisted =
            serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;
        if checksum(&persisted.index)? != persisted.checksum {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let document = persisted.index;
        let srs_uri = document.srs.uri.clone();
        Ok(Self {
            default_tree: GraphTree::build(srs_uri.clone(), document.default_graph),
            named_trees: document
                .named_graphs
                .into_iter()
                .map(|(graph, entries)| (graph, GraphTree::build(srs_uri.clone(), entries)))
                .collect(),
            srs: document.srs,
            serialization: document.serialization,
            created_at: document.created_at,
            updated_at: document.updated_at,
        })
    }

    /// Write the index straight to `path`, truncating any existing file.
    ///
    /// Not atomic: a failure mid-write leaves a partial file behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.ensure_encodable()?;
        let file = File::create(path)?;
        self.encode(BufWriter::new(file))?;
        tracing::debug!(path = %path.display(), "Spatial index saved");
        Ok(())
    }

    /// Read an index file. A missing file is [`IndexError::NotFound`].
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => IndexError::NotFound {
                path: path.display().to_string(),
            },
            _ => IndexError::Io(e),
        })?;
        let index = Self::decode(&bytes, &path.display().to_string())?;
        tracing::debug!(path = %path.display(), elements = index.element_count(), "Spatial index loaded");
        Ok(index)
    }

    /// Like [`SpatialIndex::load`], but a missing file is `Ok(None)`.
    pub fn load_if_exists(path: &Path) -> Result<Option<Self>> {
        match Self::load(path) {
            Ok(index) => Ok(Some(index)),
            Err(IndexError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{GeometryRecord, MemoryDataset};
    use crate::index::BuildOptions;
    use geoindex_core::{Envelope, CRS84_URI};

    fn sample_index(serialization: SerializationStrategy) -> SpatialIndex {
        let g = GraphName::from("http://example.org/g");
        let mut ds = MemoryDataset::new();
        ds.insert(None, GeometryRecord::point("urn:d", 7.44, 46.95));
        ds.insert(
            Some(&g),
            GeometryRecord::new("urn:area", CRS84_URI, Envelope::new(5.96, 45.82, 10.49, 47.81)),
        );
        ds.add_graph("http://example.org/empty");

        let options = BuildOptions {
            serialization,
            ..BuildOptions::new(CRS84_URI)
        };
        SpatialIndex::build(&ds, &options).unwrap()
    }

    fn encoded(index: &SpatialIndex) -> Vec<u8> {
        let mut buf = Vec::new();
        index.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_decode_restores_trees() {
        let index = sample_index(SerializationStrategy::Compact);
        let decoded = SpatialIndex::decode(&encoded(&index), "mem").unwrap();

        assert_eq!(decoded.srs(), index.srs());
        assert_eq!(decoded.created_at(), index.created_at());
        assert_eq!(decoded.default_graph_tree().entries(), index.default_graph_tree().entries());
        assert_eq!(decoded.named_graph_trees().len(), 2);
        assert_eq!(
            decoded.graph_tree(&"http://example.org/g".into()).unwrap().size(),
            1
        );
    }

    #[test]
    fn test_pretty_layout_still_verifies() {
        let index = sample_index(SerializationStrategy::Pretty);
        let bytes = encoded(&index);
        assert!(bytes.contains(&b'\n'));

        let decoded = SpatialIndex::decode(&bytes, "mem").unwrap();
        assert_eq!(decoded.serialization(), SerializationStrategy::Pretty);
    }

    #[test]
    fn test_non_finite_envelope_is_not_encoded() {
        let g = GraphName::from("http://example.org/g");
        let mut ds = MemoryDataset::new();
        ds.insert(None, GeometryRecord::point("urn:ok", 1.0, 1.0));
        ds.insert(
            Some(&g),
            GeometryRecord::new("urn:far", CRS84_URI, Envelope::point(1.0, f64::INFINITY)),
        );
        let index = SpatialIndex::build(&ds, &BuildOptions::new(CRS84_URI)).unwrap();

        let mut buf = Vec::new();
        let err = index.encode(&mut buf).unwrap_err();
        match err {
            IndexError::NonFiniteEnvelope { feature } => assert_eq!(feature, "urn:far"),
            other => panic!("expected non-finite envelope, got {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let bytes = encoded(&sample_index(SerializationStrategy::Compact));
        let err = SpatialIndex::decode(&bytes[..bytes.len() / 2], "half").unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
    }

    #[test]
    fn test_tampered_file_fails_checksum() {
        let bytes = encoded(&sample_index(SerializationStrategy::Compact));
        let text = String::from_utf8(bytes).unwrap().replace("urn:area", "urn:evil");
        let err = SpatialIndex::decode(text.as_bytes(), "tampered").unwrap_err();
        match err {
            IndexError::Corrupt { reason, .. } => assert_eq!(reason, "checksum mismatch"),
            other => panic!("expected corrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_other_format_version_rejected() {
        let bytes = encoded(&sample_index(SerializationStrategy::Compact));
        let mut value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        value["index"]["format_version"] = serde_json::json!(2);
        let err = SpatialIndex::decode(&serde_json::to_vec(&value).unwrap(), "v2").unwrap_err();
        assert!(matches!(err, IndexError::IncompatibleFormat { found: 2, .. }));
    }

    #[test]
    fn test_load_if_exists_distinguishes_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        assert!(SpatialIndex::load_if_exists(&path).unwrap().is_none());
        assert!(matches!(
            SpatialIndex::load(&path),
            Err(IndexError::NotFound { .. })
        ));

        let index = sample_index(SerializationStrategy::Compact);
        index.save(&path).unwrap();
        let loaded = SpatialIndex::load_if_exists(&path).unwrap().unwrap();
        assert_eq!(loaded.element_count(), index.element_count());

        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            SpatialIndex::load_if_exists(&path),
            Err(IndexError::Corrupt { .. })
        ));
    }
}
