//! OPEX sidecar descriptors.
//!
//! An [`OpexDescriptor`] is the structured content of one `.opex` file:
//! transfer manifest and fixities, common properties, and descriptive
//! metadata blocks. Turning it into text is the job of a
//! [`SidecarSerializer`]; [`XmlSidecarSerializer`] is the standard one.

use crate::checksums::ChecksumValue;
use crate::model::{Asset, Collection, Container, DescriptiveMetadata, DigitalObject, DublinCore, Identifier};
use crate::xml::{self, Element};

pub const OPEX_NAMESPACE: &str = "http://www.openpreservationexchange.org/opex/v1.0";
const LEGACY_XIP_NAMESPACE: &str = "http://preservica.com/LegacyXIP";
const EXTENDED_XIP_NAMESPACE: &str = "http://preservica.com/ExtendedXIP/v6.0";
const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const OAI_DC_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/oai_dc/";

/// Content of one sidecar. Empty parts are left out of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpexDescriptor {
    pub title: Option<String>,
    pub description: Option<String>,
    pub security_descriptor: Option<String>,
    pub identifiers: Vec<Identifier>,
    /// Immediate child folder names
    pub folders: Vec<String>,
    /// Immediate file names tagged `metadata`
    pub metadata_files: Vec<String>,
    /// Immediate file names tagged `content`
    pub content_files: Vec<String>,
    pub fixities: Vec<ChecksumValue>,
    pub descriptive_metadata: Vec<DescriptiveMetadata>,
}

impl OpexDescriptor {
    /// The container lists its collections and nothing else.
    pub fn for_container(container: &Container) -> Self {
        OpexDescriptor {
            folders: container.collections().map(|c| c.name().to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn for_collection(collection: &Collection) -> Self {
        let attrs = &collection.attrs;
        OpexDescriptor {
            title: Some(attrs.name.clone()),
            description: Some(attrs.description.clone()),
            security_descriptor: Some(attrs.security_descriptor.clone()),
            identifiers: attrs.identifiers.clone(),
            folders: collection.digital_objects().map(|d| d.name().to_string()).collect(),
            descriptive_metadata: attrs.descriptive_metadata.clone(),
            ..Default::default()
        }
    }

    /// Each asset appears twice: its sidecar as `metadata`, the file itself as `content`.
    pub fn for_digital_object(digital_object: &DigitalObject) -> Self {
        let attrs = &digital_object.attrs;
        let assets = digital_object.asset_names();
        OpexDescriptor {
            title: Some(attrs.name.clone()),
            description: Some(attrs.description.clone()),
            security_descriptor: Some(attrs.security_descriptor.clone()),
            identifiers: attrs.identifiers.clone(),
            metadata_files: assets
                .iter()
                .map(|name| format!("{}.{}", name, crate::config::SIDECAR_EXTENSION))
                .collect(),
            content_files: assets,
            descriptive_metadata: attrs.descriptive_metadata.clone(),
            ..Default::default()
        }
    }

    pub fn for_asset(asset: &Asset) -> Self {
        let attrs = &asset.attrs;
        OpexDescriptor {
            description: Some(attrs.description.clone()),
            identifiers: attrs.identifiers.clone(),
            fixities: attrs.fixities.clone(),
            descriptive_metadata: attrs
                .dublin_core
                .iter()
                .filter(|dc| !dc.is_empty())
                .cloned()
                .map(DescriptiveMetadata::DublinCore)
                .collect(),
            ..Default::default()
        }
    }

    fn has_manifest(&self) -> bool {
        !self.folders.is_empty() || !self.metadata_files.is_empty() || !self.content_files.is_empty()
    }

    fn has_properties(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.security_descriptor.is_some()
            || !self.identifiers.is_empty()
    }

    /// Build the `opex:OPEXMetadata` element.
    pub fn to_element(&self) -> Element {
        let mut root = Element::new("opex:OPEXMetadata").with_attr("xmlns:opex", OPEX_NAMESPACE);

        if self.has_manifest() || !self.fixities.is_empty() {
            root.push(self.transfer_element());
        }
        if self.has_properties() {
            root.push(self.properties_element());
        }
        if !self.descriptive_metadata.is_empty() {
            let mut descriptive = Element::new("opex:DescriptiveMetadata");
            for block in &self.descriptive_metadata {
                descriptive.push(descriptive_element(block));
            }
            root.push(descriptive);
        }

        root
    }

    fn transfer_element(&self) -> Element {
        let mut transfer = Element::new("opex:Transfer");

        if self.has_manifest() {
            let mut manifest = Element::new("opex:Manifest");
            if !self.folders.is_empty() {
                let mut folders = Element::new("opex:Folders");
                for folder in &self.folders {
                    folders.push_text_child("opex:Folder", folder.as_str());
                }
                manifest.push(folders);
            }
            if !self.metadata_files.is_empty() || !self.content_files.is_empty() {
                let mut files = Element::new("opex:Files");
                for (kind, names) in [("metadata", &self.metadata_files), ("content", &self.content_files)] {
                    for name in names {
                        files.push(Element::new("opex:File").with_attr("type", kind).with_text(name.as_str()));
                    }
                }
                manifest.push(files);
            }
            transfer.push(manifest);
        }

        if !self.fixities.is_empty() {
            let mut fixities = Element::new("opex:Fixities");
            for fixity in &self.fixities {
                fixities.push(
                    Element::new("opex:Fixity")
                        .with_attr("type", fixity.algorithm().to_string())
                        .with_attr("value", fixity.hex()),
                );
            }
            transfer.push(fixities);
        }

        transfer
    }

    fn properties_element(&self) -> Element {
        let mut properties = Element::new("opex:Properties");
        if let Some(title) = &self.title {
            properties.push_text_child("opex:Title", title.as_str());
        }
        if let Some(description) = &self.description {
            properties.push_text_child("opex:Description", description.as_str());
        }
        if let Some(security) = &self.security_descriptor {
            properties.push_text_child("opex:SecurityDescriptor", security.as_str());
        }
        if !self.identifiers.is_empty() {
            let mut identifiers = Element::new("opex:Identifiers");
            for identifier in &self.identifiers {
                identifiers.push(
                    Element::new("opex:Identifier")
                        .with_attr("type", identifier.kind.as_str())
                        .with_text(identifier.value.as_str()),
                );
            }
            properties.push(identifiers);
        }
        properties
    }
}

fn descriptive_element(block: &DescriptiveMetadata) -> Element {
    match block {
        DescriptiveMetadata::DublinCore(dc) => dublin_core_element(dc),
        DescriptiveMetadata::LegacyXip {
            accession_ref,
            virtual_folder,
        } => {
            let mut element = Element::new("LegacyXIP").with_attr("xmlns", LEGACY_XIP_NAMESPACE);
            if let Some(accession_ref) = accession_ref {
                element.push_text_child("AccessionRef", accession_ref.as_str());
            }
            if let Some(virtual_folder) = virtual_folder {
                element.push_text_child("Virtual", virtual_folder.to_string());
            }
            element
        }
        DescriptiveMetadata::ExtendedXip { digital_surrogate } => Element::new("ExtendedXIP")
            .with_attr("xmlns", EXTENDED_XIP_NAMESPACE)
            .with_attr("xmlns:xsi", XSI_NAMESPACE)
            .with_child(Element::new("DigitalSurrogate").with_text(digital_surrogate.to_string())),
    }
}

fn dublin_core_element(dc: &DublinCore) -> Element {
    let mut element = Element::new("oai_dc:dc")
        .with_attr("xsi:schemaLocation", format!("{} oai_dc.xsd", OAI_DC_NAMESPACE))
        .with_attr("xmlns:dc", DC_NAMESPACE)
        .with_attr("xmlns:oai_dc", OAI_DC_NAMESPACE)
        .with_attr("xmlns:xsi", XSI_NAMESPACE);
    for (field, values) in dc.iter() {
        for value in values {
            element.push_text_child(field.element(), value.as_str());
        }
    }
    element
}

/// Turns a descriptor into sidecar file content.
pub trait SidecarSerializer {
    fn serialize(&self, descriptor: &OpexDescriptor) -> String;
}

/// Tab-indented XML with a standalone declaration.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSidecarSerializer;

impl SidecarSerializer for XmlSidecarSerializer {
    fn serialize(&self, descriptor: &OpexDescriptor) -> String {
        xml::to_document(&descriptor.to_element())
    }
}
