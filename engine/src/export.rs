//! Metadata export: writes the folder tree and every `.opex` sidecar.
//!
//! The walk is depth-first pre-order. Each folder gets its directory and
//! then its own sidecar before its children are visited; an asset only gets
//! its sidecar, since relocating the file itself is the mover's job.

use crate::error::{EngineError, Result};
use crate::fs_ops;
use crate::model::{Container, NodePaths};
use crate::opex::{OpexDescriptor, SidecarSerializer};
use crate::progress::BuildProgress;
use std::path::{Path, PathBuf};
use tracing::Span;

pub struct MetadataExporter<'a> {
    serializer: &'a dyn SidecarSerializer,
    span: Span,
}

impl<'a> MetadataExporter<'a> {
    pub fn new(serializer: &'a dyn SidecarSerializer, span: Span) -> Self {
        MetadataExporter { serializer, span }
    }

    /// Write directories and sidecars for a planned container.
    ///
    /// Returns the sidecar paths in the order they were written.
    ///
    /// # Errors
    /// - EngineError::NotPlanned if a node has no planned paths
    /// - EngineError::DirectoryCreationFailed / WriteError on filesystem failures
    pub fn export(
        &self,
        container: &Container,
        progress: Option<&dyn BuildProgress>,
    ) -> Result<Vec<PathBuf>> {
        let _enter = self.span.enter();
        let mut written = Vec::new();

        let paths = planned(container.paths(), container.name())?;
        fs_ops::create_dir(&paths.output)?;
        self.write(&paths.sidecar, &OpexDescriptor::for_container(container), &mut written, progress)?;

        for collection in container.collections() {
            let paths = planned(collection.paths(), collection.name())?;
            fs_ops::create_dir(&paths.output)?;
            self.write(&paths.sidecar, &OpexDescriptor::for_collection(collection), &mut written, progress)?;

            for digital_object in collection.digital_objects() {
                let paths = planned(digital_object.paths(), digital_object.name())?;
                fs_ops::create_dir(&paths.output)?;
                self.write(
                    &paths.sidecar,
                    &OpexDescriptor::for_digital_object(digital_object),
                    &mut written,
                    progress,
                )?;

                for asset in digital_object.assets() {
                    let paths = planned(asset.paths(), asset.name())?;
                    self.write(&paths.sidecar, &OpexDescriptor::for_asset(asset), &mut written, progress)?;
                }
            }
        }

        tracing::info!(sidecars = written.len(), "metadata exported");
        Ok(written)
    }

    fn write(
        &self,
        path: &Path,
        descriptor: &OpexDescriptor,
        written: &mut Vec<PathBuf>,
        progress: Option<&dyn BuildProgress>,
    ) -> Result<()> {
        fs_ops::write_text(path, &self.serializer.serialize(descriptor))?;
        tracing::debug!(path = %path.display(), "sidecar written");
        if let Some(callback) = progress {
            callback.on_sidecar_written(path);
        }
        written.push(path.to_path_buf());
        Ok(())
    }
}

fn planned<'p>(paths: Option<&'p NodePaths>, name: &str) -> Result<&'p NodePaths> {
    paths.ok_or_else(|| EngineError::NotPlanned {
        name: name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksums::ChecksumAlgorithm;
    use crate::model::{Asset, Collection, CollectionAttrs, DigitalObject, DigitalObjectAttrs, Identifier};
    use crate::opex::XmlSidecarSerializer;
    use crate::planner::PathPlanner;
    use std::fs;

    fn planned_container(sources: &Path, output: &Path) -> Container {
        let file = sources.join("a.txt");
        fs::write(&file, "alpha").expect("Failed to write source");
        let asset = Asset::from_source(&file, vec![Identifier::code("C1")], None, &[ChecksumAlgorithm::Sha256])
            .expect("Failed to build asset");

        let mut d = DigitalObject::new(DigitalObjectAttrs {
            name: "do1".to_string(),
            description: "Digital Object".to_string(),
            security_descriptor: "open".to_string(),
            digital_surrogate: false,
            identifiers: vec![Identifier::code("C1")],
            descriptive_metadata: Vec::new(),
        });
        d.add_asset(asset).expect("add asset");
        let mut c = Collection::new(CollectionAttrs {
            name: "Foo".to_string(),
            description: "C1".to_string(),
            security_descriptor: "open".to_string(),
            collection_id: Some("C1".to_string()),
            identifiers: vec![Identifier::code("C1")],
            descriptive_metadata: Vec::new(),
        });
        c.add_digital_object(d).expect("add digital object");
        let mut container = Container::new("Container_test");
        container.add_collection(c).expect("add collection");

        PathPlanner::new("moves.csv", Span::none())
            .plan(&mut container, output)
            .expect("Failed to plan");
        container
    }

    #[test]
    fn test_export_writes_pre_order() {
        let sources = tempfile::tempdir().expect("Failed to create temp dir");
        let output = tempfile::tempdir().expect("Failed to create temp dir");
        let container = planned_container(sources.path(), output.path());

        let serializer = XmlSidecarSerializer;
        let written = MetadataExporter::new(&serializer, Span::none())
            .export(&container, None)
            .expect("Failed to export");

        let base = output.path().join("Container_test");
        assert_eq!(
            written,
            vec![
                base.join("Container_test.opex"),
                base.join("Foo").join("Foo.opex"),
                base.join("Foo").join("do1").join("do1.opex"),
                base.join("Foo").join("do1").join("a.txt.opex"),
            ]
        );

        let object_sidecar = fs::read_to_string(base.join("Foo").join("do1").join("do1.opex"))
            .expect("Failed to read sidecar");
        assert!(object_sidecar.contains("<opex:File type=\"metadata\">a.txt.opex</opex:File>"));
        assert!(object_sidecar.contains("<opex:File type=\"content\">a.txt</opex:File>"));

        // the asset itself is not moved by the exporter
        assert!(!base.join("Foo").join("do1").join("a.txt").exists());
        assert!(sources.path().join("a.txt").exists());
    }

    #[test]
    fn test_unplanned_container_is_rejected() {
        let container = Container::new("Container_test");
        let serializer = XmlSidecarSerializer;
        let result = MetadataExporter::new(&serializer, Span::none()).export(&container, None);
        assert!(matches!(result, Err(EngineError::NotPlanned { .. })));
    }
}
