//! Hierarchy builder: turns validated table rows into a package tree.

use crate::checksums::ChecksumAlgorithm;
use crate::error::{EngineError, Result};
use crate::model::{
    Asset, Collection, CollectionAttrs, Container, DescriptiveMetadata, DigitalObject,
    DigitalObjectAttrs, Identifier, UploadMode,
};
use crate::table::{self, Table, TableRow};
use std::collections::HashMap;
use tracing::Span;

const ARCHIVAL_OBJECT_DESCRIPTION: &str = "Archival Object";
const DIGITAL_OBJECT_DESCRIPTION: &str = "Digital Object";

/// Parse a `digital surrogate` cell.
pub fn parse_surrogate(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Builds one [`Container`] from a validated table.
pub struct HierarchyBuilder {
    mode: UploadMode,
    fixity_algorithms: Vec<ChecksumAlgorithm>,
    span: Span,
}

impl HierarchyBuilder {
    pub fn new(mode: UploadMode, fixity_algorithms: Vec<ChecksumAlgorithm>, span: Span) -> Self {
        HierarchyBuilder {
            mode,
            fixity_algorithms,
            span,
        }
    }

    /// Build the tree for every row of `table` under a container named `container_name`.
    ///
    /// # Errors
    /// - EngineError::InvalidBooleans listing every bad `digital surrogate` cell
    /// - EngineError::ChildConflict when two rows disagree about a folder
    /// - EngineError::DuplicateDigitalObjects when a digital object name is used in more than one collection
    /// - EngineError::ReadError if an asset file cannot be read
    pub fn build(&self, container_name: &str, table: &Table) -> Result<Container> {
        let _enter = self.span.enter();

        let surrogates = parse_surrogates(&table.rows)?;
        let mut container = Container::new(container_name);

        for (row, digital_surrogate) in table.rows.iter().zip(surrogates) {
            let collection = self.collection_from_row(row, digital_surrogate)?;
            tracing::debug!(
                line = row.line,
                collection = collection.name(),
                "adding row to container"
            );
            container.add_collection(collection)?;
        }

        check_duplicate_digital_objects(&container)?;
        tracing::info!(
            collections = container.collections().count(),
            digital_objects = container.digital_objects().count(),
            assets = container.assets().count(),
            "hierarchy built"
        );
        Ok(container)
    }

    /// The (collection, digital object, asset) chain for one row.
    fn collection_from_row(&self, row: &TableRow, digital_surrogate: bool) -> Result<Collection> {
        let security_descriptor = row.value(table::SECURITY_TAG).trim().to_lowercase();
        let digital_object_name = row.value(table::DIGITAL_OBJECT_NAME).to_string();

        let (collection_attrs, digital_object_ids, digital_object_metadata, asset_ids) = match self.mode {
            UploadMode::Linked => {
                let name = format!("archival_object_{}", row.value(table::ARCHIVAL_OBJECT_NUMBER));
                let collection = CollectionAttrs {
                    identifiers: vec![Identifier::code(name.as_str())],
                    name,
                    description: ARCHIVAL_OBJECT_DESCRIPTION.to_string(),
                    security_descriptor: security_descriptor.clone(),
                    collection_id: None,
                    descriptive_metadata: vec![DescriptiveMetadata::LegacyXip {
                        accession_ref: None,
                        virtual_folder: Some(false),
                    }],
                };
                let metadata = vec![
                    DescriptiveMetadata::LegacyXip {
                        accession_ref: Some("catalog".to_string()),
                        virtual_folder: None,
                    },
                    DescriptiveMetadata::ExtendedXip { digital_surrogate },
                ];
                (
                    collection,
                    vec![Identifier::code(digital_object_name.as_str())],
                    metadata,
                    Vec::new(),
                )
            }
            UploadMode::Manual => {
                let number = row.value(table::COLLECTION_NUMBER).to_string();
                let collection = CollectionAttrs {
                    name: row.value(table::COLLECTION_NAME).to_string(),
                    description: number.clone(),
                    security_descriptor: security_descriptor.clone(),
                    collection_id: Some(number.clone()),
                    identifiers: vec![Identifier::code(number.as_str())],
                    descriptive_metadata: Vec::new(),
                };
                (
                    collection,
                    vec![Identifier::code(number.as_str())],
                    Vec::new(),
                    vec![Identifier::code(number)],
                )
            }
        };

        let asset = Asset::from_source(
            row.source_path(),
            asset_ids,
            row.dublin_core(),
            &self.fixity_algorithms,
        )?;

        let mut digital_object = DigitalObject::new(DigitalObjectAttrs {
            name: digital_object_name,
            description: DIGITAL_OBJECT_DESCRIPTION.to_string(),
            security_descriptor,
            digital_surrogate,
            identifiers: digital_object_ids,
            descriptive_metadata: digital_object_metadata,
        });
        digital_object.add_asset(asset)?;

        let mut collection = Collection::new(collection_attrs);
        collection.add_digital_object(digital_object)?;
        Ok(collection)
    }
}

fn parse_surrogates(rows: &[TableRow]) -> Result<Vec<bool>> {
    let mut parsed = Vec::with_capacity(rows.len());
    let mut invalid = Vec::new();
    for row in rows {
        let raw = row.value(table::DIGITAL_SURROGATE);
        match parse_surrogate(raw) {
            Some(value) => parsed.push(value),
            None => invalid.push((row.line, raw.to_string())),
        }
    }
    if invalid.is_empty() {
        Ok(parsed)
    } else {
        Err(EngineError::InvalidBooleans { values: invalid })
    }
}

/// Digital object names must be unique across the whole container.
fn check_duplicate_digital_objects(container: &Container) -> Result<()> {
    let mut owners: HashMap<&str, usize> = HashMap::new();
    for digital_object in container.digital_objects() {
        *owners.entry(digital_object.name()).or_default() += 1;
    }

    let mut entries = Vec::new();
    for collection in container.collections() {
        for digital_object in collection.digital_objects() {
            if owners.get(digital_object.name()).copied().unwrap_or(0) > 1 {
                entries.push(format!("{}/{}", collection.name(), digital_object.name()));
            }
        }
    }

    if entries.is_empty() {
        Ok(())
    } else {
        Err(EngineError::DuplicateDigitalObjects { entries })
    }
}
