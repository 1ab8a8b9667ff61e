//! Core data model for bulk-upload packages.
//!
//! A package is a fixed three-level tree under a root container:
//! - Container: one per build, named after the build timestamp
//! - Collection: owns digital objects
//! - DigitalObject: owns assets
//! - Asset: exactly one source file
//!
//! Folders keep their children in a [`ChildSet`], so the merge rule is the
//! same at every level. Each level declares the attributes that take part in
//! twin detection in its `*Attrs` struct.

use crate::checksums::{compute_file_checksums, ChecksumAlgorithm, ChecksumValue};
use crate::error::{EngineError, Result};
use crate::fs_ops;
use crate::tree::{ChildSet, Node};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Ingestion mode, inferred from the table's column set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Collection identity derived from an archival object number
    Linked,
    /// Collection identity taken from name/number columns
    Manual,
}

impl fmt::Display for UploadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadMode::Linked => write!(f, "linked"),
            UploadMode::Manual => write!(f, "manual"),
        }
    }
}

/// A typed identifier attached to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub kind: String,
    pub value: String,
}

impl Identifier {
    /// Identifier of type `code`.
    pub fn code(value: impl Into<String>) -> Self {
        Identifier {
            kind: "code".to_string(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind, self.value)
    }
}

/// The fifteen recognized Dublin Core fields, in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DcField {
    Title,
    Creator,
    Subject,
    Description,
    Publisher,
    Contributor,
    Date,
    Type,
    Format,
    Identifier,
    Source,
    Language,
    Relation,
    Coverage,
    Rights,
}

impl DcField {
    pub const ALL: [DcField; 15] = [
        DcField::Title,
        DcField::Creator,
        DcField::Subject,
        DcField::Description,
        DcField::Publisher,
        DcField::Contributor,
        DcField::Date,
        DcField::Type,
        DcField::Format,
        DcField::Identifier,
        DcField::Source,
        DcField::Language,
        DcField::Relation,
        DcField::Coverage,
        DcField::Rights,
    ];

    fn term(&self) -> &'static str {
        match self {
            DcField::Title => "title",
            DcField::Creator => "creator",
            DcField::Subject => "subject",
            DcField::Description => "description",
            DcField::Publisher => "publisher",
            DcField::Contributor => "contributor",
            DcField::Date => "date",
            DcField::Type => "type",
            DcField::Format => "format",
            DcField::Identifier => "identifier",
            DcField::Source => "source",
            DcField::Language => "language",
            DcField::Relation => "relation",
            DcField::Coverage => "coverage",
            DcField::Rights => "rights",
        }
    }

    /// Table column name, e.g. `dc title`.
    pub fn column(&self) -> String {
        format!("dc {}", self.term())
    }

    /// XML element name, e.g. `dc:title`.
    pub fn element(&self) -> String {
        format!("dc:{}", self.term())
    }

    /// Field for a normalized column name, if it is a Dublin Core column.
    pub fn from_column(column: &str) -> Option<Self> {
        let term = column.strip_prefix("dc ")?;
        DcField::ALL.iter().copied().find(|f| f.term() == term)
    }
}

/// Dublin Core values grouped by field; a field may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DublinCore {
    values: BTreeMap<DcField, Vec<String>>,
}

impl DublinCore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: DcField, value: impl Into<String>) {
        self.values.entry(field).or_default().push(value.into());
    }

    pub fn values(&self, field: DcField) -> &[String] {
        self.values.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fields with their values, in rendering order.
    pub fn iter(&self) -> impl Iterator<Item = (DcField, &[String])> {
        self.values.iter().map(|(f, v)| (*f, v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A descriptive-metadata block embedded in a sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptiveMetadata {
    DublinCore(DublinCore),
    /// Legacy XIP block (catalog link and virtual-folder marker)
    LegacyXip {
        accession_ref: Option<String>,
        virtual_folder: Option<bool>,
    },
    /// Extended XIP block (digital-surrogate marker)
    ExtendedXip { digital_surrogate: bool },
}

/// Output directory (or destination file, for assets) and sidecar path of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePaths {
    pub output: PathBuf,
    pub sidecar: PathBuf,
}

fn render_identifiers(identifiers: &[Identifier]) -> String {
    let parts: Vec<String> = identifiers.iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Attributes of a collection that take part in twin detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionAttrs {
    pub name: String,
    pub description: String,
    pub security_descriptor: String,
    pub collection_id: Option<String>,
    pub identifiers: Vec<Identifier>,
    pub descriptive_metadata: Vec<DescriptiveMetadata>,
}

#[derive(Debug, Clone)]
pub struct Collection {
    pub attrs: CollectionAttrs,
    pub(crate) digital_objects: ChildSet<DigitalObject>,
    pub(crate) paths: Option<NodePaths>,
}

impl Collection {
    pub fn new(attrs: CollectionAttrs) -> Self {
        Collection {
            attrs,
            digital_objects: ChildSet::new(),
            paths: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.attrs.name
    }

    pub fn add_digital_object(&mut self, digital_object: DigitalObject) -> Result<()> {
        self.digital_objects.insert(&self.attrs.name, digital_object)
    }

    pub fn digital_objects(&self) -> impl Iterator<Item = &DigitalObject> {
        self.digital_objects.iter()
    }

    pub fn digital_object(&self, name: &str) -> Option<&DigitalObject> {
        self.digital_objects.get(name)
    }

    pub fn paths(&self) -> Option<&NodePaths> {
        self.paths.as_ref()
    }
}

impl Node for Collection {
    const KIND: &'static str = "collection";

    fn name(&self) -> &str {
        &self.attrs.name
    }

    fn attribute_fields(&self) -> Vec<(&'static str, String)> {
        let a = &self.attrs;
        vec![
            ("name", a.name.clone()),
            ("description", a.description.clone()),
            ("security descriptor", a.security_descriptor.clone()),
            ("collection id", format!("{:?}", a.collection_id)),
            ("identifiers", render_identifiers(&a.identifiers)),
            ("descriptive metadata", format!("{:?}", a.descriptive_metadata)),
        ]
    }

    fn same_attributes(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }

    fn absorb(&mut self, twin: Self) -> Result<()> {
        for digital_object in twin.digital_objects {
            self.add_digital_object(digital_object)?;
        }
        Ok(())
    }
}

/// Attributes of a digital object that take part in twin detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitalObjectAttrs {
    pub name: String,
    pub description: String,
    pub security_descriptor: String,
    pub digital_surrogate: bool,
    pub identifiers: Vec<Identifier>,
    pub descriptive_metadata: Vec<DescriptiveMetadata>,
}

#[derive(Debug, Clone)]
pub struct DigitalObject {
    pub attrs: DigitalObjectAttrs,
    pub(crate) assets: ChildSet<Asset>,
    pub(crate) paths: Option<NodePaths>,
}

impl DigitalObject {
    pub fn new(attrs: DigitalObjectAttrs) -> Self {
        DigitalObject {
            attrs,
            assets: ChildSet::new(),
            paths: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.attrs.name
    }

    pub fn add_asset(&mut self, asset: Asset) -> Result<()> {
        self.assets.insert(&self.attrs.name, asset)
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.get(name)
    }

    pub fn asset_names(&self) -> Vec<String> {
        self.assets.names()
    }

    pub fn paths(&self) -> Option<&NodePaths> {
        self.paths.as_ref()
    }
}

impl Node for DigitalObject {
    const KIND: &'static str = "digital object";

    fn name(&self) -> &str {
        &self.attrs.name
    }

    fn attribute_fields(&self) -> Vec<(&'static str, String)> {
        let a = &self.attrs;
        vec![
            ("name", a.name.clone()),
            ("description", a.description.clone()),
            ("security descriptor", a.security_descriptor.clone()),
            ("digital surrogate", a.digital_surrogate.to_string()),
            ("identifiers", render_identifiers(&a.identifiers)),
            ("descriptive metadata", format!("{:?}", a.descriptive_metadata)),
        ]
    }

    fn same_attributes(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }

    fn absorb(&mut self, twin: Self) -> Result<()> {
        for asset in twin.assets {
            self.add_asset(asset)?;
        }
        Ok(())
    }
}

/// Attributes of an asset that take part in twin detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetAttrs {
    /// Base name of the source file
    pub name: String,
    /// Canonical source path
    pub source_path: PathBuf,
    pub description: String,
    pub fixities: Vec<ChecksumValue>,
    pub identifiers: Vec<Identifier>,
    pub dublin_core: Option<DublinCore>,
}

#[derive(Debug, Clone)]
pub struct Asset {
    pub attrs: AssetAttrs,
    pub(crate) paths: Option<NodePaths>,
}

impl Asset {
    /// Describe the file at `source_path` and compute its fixities.
    ///
    /// # Errors
    /// Returns EngineError::ReadError if the file cannot be inspected or read
    pub fn from_source(
        source_path: &Path,
        identifiers: Vec<Identifier>,
        dublin_core: Option<DublinCore>,
        algorithms: &[ChecksumAlgorithm],
    ) -> Result<Self> {
        let name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| EngineError::MissingFiles {
                paths: vec![source_path.to_path_buf()],
            })?;
        let facts = fs_ops::file_facts(source_path)?;
        let fixities = compute_file_checksums(source_path, algorithms)?;

        Ok(Asset {
            attrs: AssetAttrs {
                name,
                source_path: source_path.to_path_buf(),
                description: facts.describe(),
                fixities,
                identifiers,
                dublin_core,
            },
            paths: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.attrs.name
    }

    pub fn source_path(&self) -> &Path {
        &self.attrs.source_path
    }

    /// Planned destination and sidecar; `output` is the relocated file path.
    pub fn paths(&self) -> Option<&NodePaths> {
        self.paths.as_ref()
    }
}

impl Node for Asset {
    const KIND: &'static str = "asset";

    fn name(&self) -> &str {
        &self.attrs.name
    }

    fn attribute_fields(&self) -> Vec<(&'static str, String)> {
        let a = &self.attrs;
        let fixities: Vec<String> = a.fixities.iter().map(|f| f.to_string()).collect();
        vec![
            ("name", a.name.clone()),
            ("source path", a.source_path.display().to_string()),
            ("description", a.description.clone()),
            ("fixities", format!("[{}]", fixities.join(", "))),
            ("identifiers", render_identifiers(&a.identifiers)),
            ("descriptive metadata", format!("{:?}", a.dublin_core)),
        ]
    }

    fn same_attributes(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }

    fn absorb(&mut self, _twin: Self) -> Result<()> {
        Ok(())
    }
}

/// Root of a package.
#[derive(Debug, Clone)]
pub struct Container {
    name: String,
    pub(crate) collections: ChildSet<Collection>,
    pub(crate) paths: Option<NodePaths>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Container {
            name: name.into(),
            collections: ChildSet::new(),
            paths: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_collection(&mut self, collection: Collection) -> Result<()> {
        self.collections.insert(&self.name, collection)
    }

    pub fn collections(&self) -> impl Iterator<Item = &Collection> {
        self.collections.iter()
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Every digital object, collection by collection.
    pub fn digital_objects(&self) -> impl Iterator<Item = &DigitalObject> {
        self.collections.iter().flat_map(|c| c.digital_objects())
    }

    /// Every asset in the package.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.digital_objects().flat_map(|d| d.assets())
    }

    pub fn paths(&self) -> Option<&NodePaths> {
        self.paths.as_ref()
    }

    /// Indented listing of every node, four spaces per level.
    pub fn render_tree(&self) -> String {
        let mut out = format!("{}\n", self.name);
        for collection in self.collections() {
            out.push_str(&format!("    {}\n", collection.name()));
            for digital_object in collection.digital_objects() {
                out.push_str(&format!("        {}\n", digital_object.name()));
                for asset in digital_object.assets() {
                    out.push_str(&format!("            {}\n", asset.name()));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn collection(name: &str, description: &str) -> Collection {
        Collection::new(CollectionAttrs {
            name: name.to_string(),
            description: description.to_string(),
            security_descriptor: "open".to_string(),
            collection_id: Some(description.to_string()),
            identifiers: vec![Identifier::code(description)],
            descriptive_metadata: Vec::new(),
        })
    }

    fn digital_object(name: &str) -> DigitalObject {
        DigitalObject::new(DigitalObjectAttrs {
            name: name.to_string(),
            description: "Digital Object".to_string(),
            security_descriptor: "open".to_string(),
            digital_surrogate: false,
            identifiers: Vec::new(),
            descriptive_metadata: Vec::new(),
        })
    }

    fn asset(dir: &Path, file: &str) -> Asset {
        let path = dir.join(file);
        fs::write(&path, file).expect("Failed to write asset");
        Asset::from_source(&path, Vec::new(), None, &[ChecksumAlgorithm::Sha256])
            .expect("Failed to build asset")
    }

    #[test]
    fn test_dc_field_columns() {
        assert_eq!(DcField::from_column("dc title"), Some(DcField::Title));
        assert_eq!(DcField::from_column("dc rights"), Some(DcField::Rights));
        assert_eq!(DcField::from_column("dc colour"), None);
        assert_eq!(DcField::from_column("title"), None);
        assert_eq!(DcField::Coverage.column(), "dc coverage");
        assert_eq!(DcField::Coverage.element(), "dc:coverage");
    }

    #[test]
    fn test_dublin_core_groups_in_field_order() {
        let mut dc = DublinCore::new();
        dc.push(DcField::Subject, "maps");
        dc.push(DcField::Title, "Atlas");
        dc.push(DcField::Subject, "charts");
        let fields: Vec<DcField> = dc.iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec![DcField::Title, DcField::Subject]);
        assert_eq!(dc.values(DcField::Subject), ["maps", "charts"]);
        assert!(dc.values(DcField::Rights).is_empty());
    }

    #[test]
    fn test_asset_from_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let asset = asset(temp_dir.path(), "letter.txt");
        assert_eq!(asset.name(), "letter.txt");
        assert_eq!(asset.attrs.fixities.len(), 1);
        assert!(asset.attrs.description.starts_with("File Type: txt; File Size: 10 Bytes"));
        assert!(asset.paths().is_none());
    }

    #[test]
    fn test_twin_collections_accumulate_assets() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut container = Container::new("Container_test");

        for file in ["a.txt", "b.txt"] {
            let mut d = digital_object("do1");
            d.add_asset(asset(temp_dir.path(), file)).expect("add asset");
            let mut c = collection("Foo", "C1");
            c.add_digital_object(d).expect("add digital object");
            container.add_collection(c).expect("add collection");
        }

        assert_eq!(container.collections().count(), 1);
        assert_eq!(container.digital_objects().count(), 1);
        let names: Vec<&str> = container.assets().map(|a| a.name()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert!(container.collection("Foo").and_then(|c| c.digital_object("do1")).is_some());
    }

    #[test]
    fn test_conflicting_collection_is_rejected() {
        let mut container = Container::new("Container_test");
        container.add_collection(collection("Foo", "C1")).expect("first");
        let err = container.add_collection(collection("Foo", "C2")).unwrap_err();
        assert!(matches!(err, EngineError::ChildConflict { kind: "collection", .. }));
    }

    #[test]
    fn test_render_tree() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut d = digital_object("do1");
        d.add_asset(asset(temp_dir.path(), "a.txt")).expect("add asset");
        let mut c = collection("Foo", "C1");
        c.add_digital_object(d).expect("add digital object");
        let mut container = Container::new("Root");
        container.add_collection(c).expect("add collection");

        assert_eq!(
            container.render_tree(),
            "Root\n    Foo\n        do1\n            a.txt\n"
        );
    }
}
