//! Build orchestration module.
//!
//! This module provides the build lifecycle functions:
//! - Creating a build from a table path and an output directory
//! - Planning a build (validating the table, building the tree, planning paths)
//! - Running a build (writing sidecars, moving files, writing the move log)
//!
//! Planning never writes to disk. Running writes sidecars before any file is
//! moved, so a rejected or failed move step leaves a package tree without
//! its files; those sidecars are not removed.

use crate::builder::HierarchyBuilder;
use crate::config::BuildOptions;
use crate::error::{EngineError, Result};
use crate::export::MetadataExporter;
use crate::model::{Container, UploadMode};
use crate::moves::{undo_moves, MoveBatch};
use crate::opex::{SidecarSerializer, XmlSidecarSerializer};
use crate::planner::PathPlanner;
use crate::progress::BuildProgress;
use crate::table::read_table;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::Span;
use uuid::Uuid;

/// Lifecycle state of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Created, not yet planned
    Pending,
    /// Tree built and paths planned; nothing written
    Planned,
    /// Writing sidecars and moving files
    Running,
    /// Every file moved and the move log written
    Completed,
    /// Planning or running failed; see `Build::error`
    Failed,
}

/// One package build.
#[derive(Debug)]
pub struct Build {
    pub id: Uuid,
    pub table_path: PathBuf,
    pub output_root: PathBuf,
    pub options: BuildOptions,
    /// Stamp that names the container folder
    pub created_at: DateTime<Local>,
    pub state: BuildState,
    pub mode: Option<UploadMode>,
    pub container: Option<Container>,
    /// Where the move log goes once the batch succeeds
    pub moves_log: Option<PathBuf>,
    pub sidecars_written: Vec<PathBuf>,
    pub moves: Option<MoveBatch>,
    pub error: Option<String>,
    span: Span,
}

impl Build {
    /// Name of the container folder for this build.
    pub fn container_name(&self) -> String {
        self.options.container_name(&self.created_at)
    }

    /// Planned container directory, once planned.
    pub fn container_dir(&self) -> Option<&Path> {
        self.container
            .as_ref()
            .and_then(|c| c.paths())
            .map(|p| p.output.as_path())
    }

    /// Put every file moved by this build back where it came from.
    ///
    /// # Errors
    /// - EngineError::InvalidState unless the build completed
    /// - any error from `undo_moves`
    pub fn undo(&self, progress: Option<&dyn BuildProgress>) -> Result<MoveBatch> {
        match (&self.state, &self.moves_log) {
            (BuildState::Completed, Some(log)) => {
                let _enter = self.span.enter();
                undo_moves(log, progress)
            }
            _ => Err(EngineError::InvalidState {
                expected: format!("{:?}", BuildState::Completed),
                actual: format!("{:?}", self.state),
            }),
        }
    }

    fn fail(&mut self, e: EngineError) -> EngineError {
        let _enter = self.span.enter();
        tracing::error!(error = %e, "build failed");
        self.state = BuildState::Failed;
        self.error = Some(e.to_string());
        e
    }

    fn require(&self, expected: BuildState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                expected: format!("{:?}", expected),
                actual: format!("{:?}", self.state),
            })
        }
    }
}

/// Create a new build.
///
/// Validates that the table exists and that the output root is an existing
/// directory. The build timestamp, and with it the container name, is taken
/// here.
///
/// # Errors
/// - EngineError::TableNotFound if the table is missing
/// - EngineError::InvalidOutputRoot if the output root is missing or not a directory
pub fn create_build<P: AsRef<Path>, Q: AsRef<Path>>(
    table: P,
    output_root: Q,
    options: BuildOptions,
) -> Result<Build> {
    let table = table.as_ref();
    let output_root = output_root.as_ref();

    if !table.is_file() {
        return Err(EngineError::TableNotFound {
            path: table.to_path_buf(),
        });
    }

    match std::fs::metadata(output_root) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::InvalidOutputRoot {
                path: output_root.to_path_buf(),
                reason: "not a directory".to_string(),
            })
        }
        Err(e) => {
            return Err(EngineError::InvalidOutputRoot {
                path: output_root.to_path_buf(),
                reason: e.to_string(),
            })
        }
    }

    let id = Uuid::new_v4();
    let span = tracing::info_span!("build", id = %id);
    span.in_scope(|| {
        tracing::info!(
            table = %table.display(),
            output = %output_root.display(),
            "build created"
        )
    });

    Ok(Build {
        id,
        table_path: table.to_path_buf(),
        output_root: output_root.to_path_buf(),
        options,
        created_at: Local::now(),
        state: BuildState::Pending,
        mode: None,
        container: None,
        moves_log: None,
        sidecars_written: Vec::new(),
        moves: None,
        error: None,
        span,
    })
}

/// Plan a build: validate the table, build the tree, and plan every output path.
///
/// Nothing is written to disk.
///
/// # Errors
/// - EngineError::InvalidState unless the build is Pending
/// - any validation error from the table, the builder or the planner; the build becomes Failed
pub fn plan_build(build: &mut Build) -> Result<()> {
    build.require(BuildState::Pending)?;

    match plan_container(build) {
        Ok((mode, container, moves_log)) => {
            build.mode = Some(mode);
            build.container = Some(container);
            build.moves_log = Some(moves_log);
            build.state = BuildState::Planned;
            Ok(())
        }
        Err(e) => Err(build.fail(e)),
    }
}

fn plan_container(build: &Build) -> Result<(UploadMode, Container, PathBuf)> {
    let _enter = build.span.enter();

    let table = read_table(&build.table_path)?;

    let builder = HierarchyBuilder::new(
        table.mode,
        build.options.fixity_algorithms.clone(),
        tracing::debug_span!("hierarchy"),
    );
    let mut container = builder.build(&build.container_name(), &table)?;

    let planner = PathPlanner::new(
        build.options.moves_log_name.as_str(),
        tracing::debug_span!("planner"),
    );
    let moves_log = planner.plan(&mut container, &build.output_root)?;

    Ok((table.mode, container, moves_log))
}

/// Run a planned build with the standard XML sidecar serializer.
///
/// # Errors
/// See [`run_build_with`]
pub fn run_build(build: &mut Build, progress: Option<&dyn BuildProgress>) -> Result<()> {
    run_build_with(build, &XmlSidecarSerializer, progress)
}

/// Run a planned build.
///
/// Writes directories and sidecars, then validates and executes the move
/// batch, then writes the move log. Transitions Planned to Running to
/// Completed, or to Failed on the first error.
///
/// # Errors
/// - EngineError::InvalidState unless the build is Planned
/// - I/O errors from the export, or a rejected or failed move batch
pub fn run_build_with(
    build: &mut Build,
    serializer: &dyn SidecarSerializer,
    progress: Option<&dyn BuildProgress>,
) -> Result<()> {
    build.require(BuildState::Planned)?;
    build.state = BuildState::Running;

    if let Some(callback) = progress {
        callback.on_build_started(build);
    }

    if let Err(e) = write_package(build, serializer, progress) {
        return Err(build.fail(e));
    }

    build.state = BuildState::Completed;
    {
        let _enter = build.span.enter();
        tracing::info!(
            sidecars = build.sidecars_written.len(),
            moves = build.moves.as_ref().map(|m| m.len()).unwrap_or(0),
            "build completed"
        );
    }

    if let Some(callback) = progress {
        callback.on_build_completed(build);
    }
    Ok(())
}

fn write_package(
    build: &mut Build,
    serializer: &dyn SidecarSerializer,
    progress: Option<&dyn BuildProgress>,
) -> Result<()> {
    let span = build.span.clone();
    let _enter = span.enter();

    let container = build.container.as_ref().ok_or_else(|| EngineError::NotPlanned {
        name: build.container_name(),
    })?;
    let moves_log = build.moves_log.clone().ok_or_else(|| EngineError::NotPlanned {
        name: build.options.moves_log_name.clone(),
    })?;

    let exporter = MetadataExporter::new(serializer, tracing::debug_span!("export"));
    let written = exporter.export(container, progress)?;
    build.sidecars_written = written;

    let container = build.container.as_ref().ok_or_else(|| EngineError::NotPlanned {
        name: build.container_name(),
    })?;
    let mut batch = MoveBatch::from_container(container, tracing::debug_span!("moves"))?;
    let outcome = batch
        .validate()
        .and_then(|()| batch.execute(progress))
        .and_then(|()| batch.write_log(&moves_log));
    build.moves = Some(batch);
    outcome
}

/// Create, plan and run a build in one call.
///
/// # Errors
/// Any error from [`create_build`], [`plan_build`] or [`run_build`]
pub fn build_package<P: AsRef<Path>, Q: AsRef<Path>>(
    table: P,
    output_root: Q,
    options: BuildOptions,
    progress: Option<&dyn BuildProgress>,
) -> Result<Build> {
    let mut build = create_build(table, output_root, options)?;
    plan_build(&mut build)?;
    run_build(&mut build, progress)?;
    Ok(build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::{BatchState, FileMove};
    use std::fs;
    use std::sync::Mutex;

    const LINKED_HEADER: &str =
        "filepath,digital object name,security tag,digital surrogate,archival object number";
    const MANUAL_HEADER: &str =
        "filepath,digital object name,security tag,digital surrogate,collection name,collection number";

    struct Fixture {
        _temp_dir: tempfile::TempDir,
        sources: PathBuf,
        output: PathBuf,
        table: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
            let sources = temp_dir.path().join("sources");
            let output = temp_dir.path().join("output");
            fs::create_dir(&sources).expect("Failed to create sources dir");
            fs::create_dir(&output).expect("Failed to create output dir");
            let table = temp_dir.path().join("upload.csv");
            Fixture {
                _temp_dir: temp_dir,
                sources,
                output,
                table,
            }
        }

        fn file(&self, name: &str) -> String {
            let path = self.sources.join(name);
            fs::write(&path, format!("contents of {name}")).expect("Failed to write source");
            path.display().to_string()
        }

        fn write_table(&self, header: &str, rows: &[String]) {
            let mut text = format!("{header}\n");
            for row in rows {
                text.push_str(row);
                text.push('\n');
            }
            fs::write(&self.table, text).expect("Failed to write table");
        }

        fn planned(&self) -> Build {
            let mut build = create_build(&self.table, &self.output, BuildOptions::default())
                .expect("Failed to create build");
            plan_build(&mut build).expect("Failed to plan build");
            build
        }
    }

    struct TestProgress {
        calls: Mutex<Vec<String>>,
    }

    impl TestProgress {
        fn new() -> Self {
            TestProgress {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn get_calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl BuildProgress for TestProgress {
        fn on_build_started(&self, _build: &Build) {
            self.calls.lock().unwrap().push("on_build_started".to_string());
        }

        fn on_sidecar_written(&self, path: &Path) {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            self.calls.lock().unwrap().push(format!("on_sidecar_written({})", name));
        }

        fn on_file_moved(&self, index: usize, total: usize, _file_move: &FileMove) {
            self.calls.lock().unwrap().push(format!("on_file_moved({}/{})", index, total));
        }

        fn on_build_completed(&self, _build: &Build) {
            self.calls.lock().unwrap().push("on_build_completed".to_string());
        }
    }

    fn sidecars_under(dir: &Path) -> usize {
        let mut count = 0;
        for entry in fs::read_dir(dir).expect("Failed to read dir") {
            let path = entry.expect("Failed to read entry").path();
            if path.is_dir() {
                count += sidecars_under(&path);
            } else if path.extension().map(|e| e == "opex").unwrap_or(false) {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_create_build_checks_inputs() {
        let fixture = Fixture::new();
        let missing = create_build(&fixture.table, &fixture.output, BuildOptions::default());
        assert!(matches!(missing, Err(EngineError::TableNotFound { .. })));

        fixture.write_table(MANUAL_HEADER, &[]);
        let not_dir = create_build(&fixture.table, &fixture.table, BuildOptions::default());
        assert!(matches!(not_dir, Err(EngineError::InvalidOutputRoot { .. })));

        let build = create_build(&fixture.table, &fixture.output, BuildOptions::default())
            .expect("Failed to create build");
        assert_eq!(build.state, BuildState::Pending);
        assert!(build.container_name().starts_with("Container_"));
    }

    #[test]
    fn test_manual_single_row_package() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        fixture.write_table(MANUAL_HEADER, &[format!("{a},do1,open,false,Foo,C1")]);

        let mut build = fixture.planned();
        assert_eq!(build.mode, Some(UploadMode::Manual));
        run_build(&mut build, None).expect("Failed to run build");
        assert_eq!(build.state, BuildState::Completed);

        let base = fixture.output.join(build.container_name());
        let moved = base.join("Foo").join("do1").join("a.txt");
        assert_eq!(fs::read_to_string(&moved).expect("Failed to read moved file"), "contents of a.txt");
        assert!(!fixture.sources.join("a.txt").exists());

        assert_eq!(sidecars_under(&base.join("Foo")), 3);
        assert!(base.join(format!("{}.opex", build.container_name())).is_file());

        let log = fs::read_to_string(base.join("moves.csv")).expect("Failed to read log");
        assert_eq!(log.lines().count(), 2);
        assert_eq!(log.lines().next(), Some("original_location,destination"));
    }

    #[test]
    fn test_linked_rows_share_a_collection() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        let b = fixture.file("b.txt");
        fixture.write_table(
            LINKED_HEADER,
            &[format!("{a},do1,open,false,7"), format!("{b},do2,open,true,7")],
        );

        let mut build = fixture.planned();
        run_build(&mut build, None).expect("Failed to run build");

        let container = build.container.as_ref().expect("container");
        assert_eq!(container.collections().count(), 1);
        let collection = container.collection("archival_object_7").expect("collection");
        assert_eq!(collection.digital_objects().count(), 2);

        let collection_sidecar = fs::read_to_string(
            fixture
                .output
                .join(build.container_name())
                .join("archival_object_7")
                .join("archival_object_7.opex"),
        )
        .expect("Failed to read sidecar");
        assert!(collection_sidecar.contains("<Virtual>false</Virtual>"));
        assert!(collection_sidecar.contains("<opex:Folder>do1</opex:Folder>"));
        assert!(collection_sidecar.contains("<opex:Folder>do2</opex:Folder>"));
    }

    #[test]
    fn test_missing_column_fails_before_tree() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        fixture.write_table(
            "filepath,digital object name,digital surrogate,archival object number",
            &[format!("{a},do1,false,7")],
        );

        let mut build = create_build(&fixture.table, &fixture.output, BuildOptions::default())
            .expect("Failed to create build");
        let err = plan_build(&mut build).unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedMode { .. }));
        assert!(err.is_validation());
        assert_eq!(build.state, BuildState::Failed);
        assert!(build.container.is_none());
        assert!(fs::read_dir(&fixture.output).expect("read output").next().is_none());
    }

    #[test]
    fn test_header_only_table_fails_planning() {
        let fixture = Fixture::new();
        fixture.write_table(MANUAL_HEADER, &[]);

        let mut build = create_build(&fixture.table, &fixture.output, BuildOptions::default())
            .expect("Failed to create build");
        let err = plan_build(&mut build).unwrap_err();
        assert!(matches!(err, EngineError::EmptyTable { .. }));
        assert!(err.is_validation());
        assert_eq!(build.state, BuildState::Failed);
        assert!(fs::read_dir(&fixture.output).expect("read output").next().is_none());
    }

    #[test]
    fn test_collection_name_cannot_leave_the_container() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        fixture.write_table(MANUAL_HEADER, &[format!("{a},do1,open,false,../../escaped,C1")]);

        let mut build = create_build(&fixture.table, &fixture.output, BuildOptions::default())
            .expect("Failed to create build");
        let err = plan_build(&mut build).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFolderNames { .. }));
        assert!(fixture.sources.join("a.txt").exists());
        assert!(!fixture.output.join("..").join("..").join("escaped").exists());
        assert!(fs::read_dir(&fixture.output).expect("read output").next().is_none());
    }

    #[test]
    fn test_duplicate_digital_object_fails() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        let b = fixture.file("b.txt");
        fixture.write_table(
            MANUAL_HEADER,
            &[format!("{a},do1,open,false,Foo,C1"), format!("{b},do1,open,false,Bar,C2")],
        );

        let mut build = create_build(&fixture.table, &fixture.output, BuildOptions::default())
            .expect("Failed to create build");
        let err = plan_build(&mut build).unwrap_err();
        assert!(err.to_string().starts_with("duplicate digital objects found"));
    }

    #[test]
    fn test_duplicate_filepath_fails() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        fixture.write_table(
            MANUAL_HEADER,
            &[format!("{a},do1,open,false,Foo,C1"), format!("{a},do2,open,false,Foo,C1")],
        );

        let mut build = create_build(&fixture.table, &fixture.output, BuildOptions::default())
            .expect("Failed to create build");
        match plan_build(&mut build) {
            Err(EngineError::DuplicateFilepaths { duplicates }) => assert_eq!(duplicates[0].lines, vec![2, 3]),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_build_then_undo_restores_sources() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        let b = fixture.file("b.txt");
        fixture.write_table(
            MANUAL_HEADER,
            &[format!("{a},do1,open,false,Foo,C1"), format!("{b},do2,open,false,Foo,C1")],
        );

        let mut build = fixture.planned();
        run_build(&mut build, None).expect("Failed to run build");
        let destinations: Vec<PathBuf> = build
            .moves
            .as_ref()
            .expect("moves")
            .moves()
            .iter()
            .map(|m| m.destination.clone())
            .collect();

        let undone = build.undo(None).expect("Failed to undo");
        assert_eq!(undone.state(), BatchState::Moved);
        assert!(fixture.sources.join("a.txt").exists());
        assert!(fixture.sources.join("b.txt").exists());
        for destination in destinations {
            assert!(!destination.exists());
        }
    }

    #[test]
    fn test_rejected_moves_leave_sidecars() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        fixture.write_table(MANUAL_HEADER, &[format!("{a},do1,open,false,Foo,C1")]);

        let mut build = fixture.planned();
        fs::remove_file(fixture.sources.join("a.txt")).expect("Failed to remove source");

        let err = run_build(&mut build, None).unwrap_err();
        assert!(matches!(err, EngineError::MoveBatchRejected { .. }));
        assert_eq!(build.state, BuildState::Failed);
        assert_eq!(build.moves.as_ref().map(|m| m.state()), Some(BatchState::Rejected));

        let base = fixture.output.join(build.container_name());
        assert_eq!(build.sidecars_written.len(), 4);
        assert_eq!(sidecars_under(&base), 4);
        assert!(!base.join("moves.csv").exists());
        assert!(build.undo(None).is_err());
    }

    #[test]
    fn test_run_requires_planned_state() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        fixture.write_table(MANUAL_HEADER, &[format!("{a},do1,open,false,Foo,C1")]);

        let mut build = create_build(&fixture.table, &fixture.output, BuildOptions::default())
            .expect("Failed to create build");
        assert!(matches!(run_build(&mut build, None), Err(EngineError::InvalidState { .. })));

        plan_build(&mut build).expect("Failed to plan build");
        run_build(&mut build, None).expect("First run should succeed");
        assert!(run_build(&mut build, None).is_err(), "Second run should fail");
    }

    #[test]
    fn test_run_build_invokes_callbacks_in_order() {
        let fixture = Fixture::new();
        let a = fixture.file("a.txt");
        fixture.write_table(MANUAL_HEADER, &[format!("{a},do1,open,false,Foo,C1")]);

        let mut build = fixture.planned();
        let progress = TestProgress::new();
        run_build(&mut build, Some(&progress)).expect("Failed to run build");

        let container_sidecar = format!("on_sidecar_written({}.opex)", build.container_name());
        assert_eq!(
            progress.get_calls(),
            vec![
                "on_build_started".to_string(),
                container_sidecar,
                "on_sidecar_written(Foo.opex)".to_string(),
                "on_sidecar_written(do1.opex)".to_string(),
                "on_sidecar_written(a.txt.opex)".to_string(),
                "on_file_moved(0/1)".to_string(),
                "on_build_completed".to_string(),
            ]
        );
    }
}
