//! Workspace index: the single owner of all files and their analysis
//!
//! Readers take an `Arc<Snapshot>` and never block writers. Every mutation clones the
//! current snapshot, applies the change, re-analyses the affected files and swaps the
//! result in. Mutations are serialised by a writer mutex.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rayon::prelude::*;
use thiserror::Error;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};
use tracing::{debug, warn};

use crate::analysis::resolver::Resolution;
use crate::analysis::{self, FileAnalysis, ImportGraph, ImportLink, SymbolGraph};
use crate::config::Settings;
use crate::workspace::line_index::LineIndex;
use crate::workspace::loader::{self, FileSystem};
use crate::workspace::source::SourceFile;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("stale version {version} for {uri}, already at {current}")]
    StaleVersion { uri: Url, version: i32, current: i32 },

    #[error("document is not open: {0}")]
    UnknownDocument(Url),
}

/// An immutable view of the workspace.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    files: HashMap<Url, Arc<SourceFile>>,
    analyses: HashMap<Url, Arc<FileAnalysis>>,
    graph: Arc<SymbolGraph>,
    imports: Arc<ImportGraph>,
    settings: Arc<Settings>,
    generation: u64,
}

impl Snapshot {
    pub fn file(&self, uri: &Url) -> Option<&Arc<SourceFile>> {
        self.files.get(uri)
    }

    pub fn analysis(&self, uri: &Url) -> Option<&Arc<FileAnalysis>> {
        self.analyses.get(uri)
    }

    pub fn files(&self) -> impl Iterator<Item = &Arc<SourceFile>> {
        self.files.values()
    }

    pub fn graph(&self) -> &SymbolGraph {
        &self.graph
    }

    pub fn imports(&self) -> &ImportGraph {
        &self.imports
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Incremented by every committed mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Files whose analysis was recomputed by a mutation, sorted by URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update {
    pub affected: Vec<Url>,
}

pub struct WorkspaceIndex {
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
    fs: Arc<dyn FileSystem>,
}

impl WorkspaceIndex {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::default())),
            writer: Mutex::new(()),
            fs,
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, uri: &Url) -> Option<Arc<SourceFile>> {
        self.snapshot().file(uri).cloned()
    }

    /// Open a document, replacing any copy loaded from disk.
    pub fn open(&self, uri: Url, text: String, version: i32) -> Result<Update, IndexError> {
        self.mutate(|draft| {
            draft.put(SourceFile::new(uri, text, Some(version), true));
            Ok(())
        })
    }

    /// Replace the full text of an open document.
    pub fn change(&self, uri: Url, text: String, version: i32) -> Result<Update, IndexError> {
        self.edit(
            uri,
            version,
            vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text,
            }],
        )
    }

    /// Apply content changes in order to an open document. Changes with a range edit
    /// that range; changes without one replace the whole text.
    pub fn edit(
        &self,
        uri: Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<Update, IndexError> {
        self.mutate(|draft| {
            let Some(current) = draft.snapshot.files.get(&uri).filter(|f| f.open) else {
                return Err(IndexError::UnknownDocument(uri));
            };
            if let Some(stored) = current.version
                && version <= stored
            {
                return Err(IndexError::StaleVersion {
                    uri,
                    version,
                    current: stored,
                });
            }

            let text = apply_changes(&current.text, changes);
            draft.put(SourceFile::new(uri, text, Some(version), true));
            Ok(())
        })
    }

    /// Close a document. If other files still import it, it falls back to its content
    /// on disk; otherwise it leaves the index.
    pub fn close(&self, uri: Url) -> Result<Update, IndexError> {
        self.mutate(|draft| {
            if !draft.snapshot.files.get(&uri).is_some_and(|f| f.open) {
                return Err(IndexError::UnknownDocument(uri));
            }
            if draft.snapshot.imports.is_imported(&uri) {
                draft.load(&uri);
            } else {
                draft.drop_file(&uri);
            }
            Ok(())
        })
    }

    /// A file was deleted on disk. Open documents keep their editor content.
    pub fn remove(&self, uri: &Url) -> Result<Update, IndexError> {
        self.mutate(|draft| {
            if draft.snapshot.files.get(uri).is_some_and(|f| !f.open) {
                draft.drop_file(uri);
            }
            Ok(())
        })
    }

    /// A file was created or changed on disk. Open documents keep their editor content.
    pub fn reload(&self, uri: &Url) -> Result<Update, IndexError> {
        self.mutate(|draft| {
            match draft.snapshot.files.get(uri).map(|file| file.open) {
                Some(true) => {}
                Some(false) => draft.load(uri),
                // a new file may satisfy imports that failed so far
                None => draft.relink_unresolved(),
            }
            Ok(())
        })
    }

    /// Apply new settings and re-resolve every import.
    pub fn configure(&self, settings: Settings) -> Result<Update, IndexError> {
        self.mutate(|draft| {
            if *draft.snapshot.settings == settings {
                return Ok(());
            }
            let dirs_changed =
                draft.snapshot.settings.additional_proto_dirs != settings.additional_proto_dirs;
            draft.snapshot.settings = Arc::new(settings);
            if !dirs_changed {
                return Ok(());
            }
            let all: Vec<Url> = draft.snapshot.files.keys().cloned().collect();
            draft.relink.extend(all);
            Ok(())
        })
    }

    fn mutate(
        &self,
        apply: impl FnOnce(&mut Draft<'_>) -> Result<(), IndexError>,
    ) -> Result<Update, IndexError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self.snapshot();
        let mut draft = Draft {
            snapshot: (*base).clone(),
            fs: self.fs.as_ref(),
            changed: HashSet::new(),
            relink: Vec::new(),
            symbols_changed: false,
        };
        apply(&mut draft)?;

        let (snapshot, affected) = draft.finish();
        debug!(
            generation = snapshot.generation,
            files = snapshot.files.len(),
            affected = affected.len(),
            "committed workspace snapshot"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
        Ok(Update { affected })
    }
}

fn apply_changes(text: &str, changes: Vec<TextDocumentContentChangeEvent>) -> String {
    let mut text = text.to_string();
    for change in changes {
        match change.range {
            Some(range) => {
                let span = LineIndex::new(&text).span(&text, range);
                let span = span.start.min(span.end)..span.end.max(span.start);
                text.replace_range(span, &change.text);
            }
            None => text = change.text,
        }
    }
    text
}

/// A snapshot being modified under the writer lock.
struct Draft<'a> {
    snapshot: Snapshot,
    fs: &'a dyn FileSystem,
    /// Files added, removed, edited, or whose imports now point elsewhere.
    changed: HashSet<Url>,
    /// Files whose imports must be resolved again.
    relink: Vec<Url>,
    /// Some declaration was added or removed.
    symbols_changed: bool,
}

impl Draft<'_> {
    fn put(&mut self, file: SourceFile) {
        let uri = file.uri.clone();
        let graph = Arc::make_mut(&mut self.snapshot.graph);
        let is_new = match self.snapshot.files.get(&uri) {
            Some(old) => {
                graph.remove_file(&uri, &old.table);
                old.supersede();
                false
            }
            None => true,
        };
        graph.insert_file(&uri, &file.table);
        self.snapshot.files.insert(uri.clone(), Arc::new(file));
        self.changed.insert(uri.clone());
        self.relink.push(uri);
        self.symbols_changed = true;
        if is_new {
            self.relink_unresolved();
        }
    }

    fn drop_file(&mut self, uri: &Url) {
        if let Some(old) = self.snapshot.files.remove(uri) {
            Arc::make_mut(&mut self.snapshot.graph).remove_file(uri, &old.table);
            old.supersede();
            self.symbols_changed = true;
        }
        self.snapshot.analyses.remove(uri);
        let importers: Vec<Url> = self.snapshot.imports.importers(uri).cloned().collect();
        Arc::make_mut(&mut self.snapshot.imports).remove(uri);
        self.relink.extend(importers);
        self.changed.insert(uri.clone());
    }

    /// Replace a file with its on-disk content, or drop it if it cannot be read.
    fn load(&mut self, uri: &Url) {
        match loader::read_uri(self.fs, uri) {
            Ok(text) => self.put(SourceFile::new(uri.clone(), text, None, false)),
            Err(err) => {
                debug!(%uri, error = %err, "dropping file that cannot be read");
                self.drop_file(uri);
            }
        }
    }

    fn relink_unresolved(&mut self) {
        let pending: Vec<Url> = self
            .snapshot
            .imports
            .files_with_unresolved_imports()
            .cloned()
            .collect();
        self.relink.extend(pending);
    }

    /// Resolve imports of every file queued in `relink`, loading imported files from
    /// disk as they are discovered.
    fn link_all(&mut self) {
        while let Some(uri) = self.relink.pop() {
            let Some(file) = self.snapshot.files.get(&uri).cloned() else {
                continue;
            };

            let links: Vec<ImportLink> = file
                .table
                .imports
                .iter()
                .map(|decl| ImportLink {
                    path: decl.path.clone(),
                    kind: decl.kind,
                    target: self.resolve_import(&uri, &decl.path),
                })
                .collect();

            if self.snapshot.imports.links(&uri) != links.as_slice() {
                Arc::make_mut(&mut self.snapshot.imports).set_links(&uri, links);
                self.changed.insert(uri);
            }
        }
    }

    fn resolve_import(&mut self, importer: &Url, path: &str) -> Option<Url> {
        let files = &self.snapshot.files;
        let target = loader::resolve_import(
            self.fs,
            importer,
            path,
            &self.snapshot.settings.additional_proto_dirs,
            |candidate| files.contains_key(candidate),
        )?;
        if self.snapshot.files.contains_key(&target) {
            return Some(target);
        }

        match loader::read_uri(self.fs, &target) {
            Ok(text) => {
                debug!(%target, "loaded imported file from disk");
                self.put(SourceFile::new(target.clone(), text, None, false));
                Some(target)
            }
            Err(err) => {
                warn!(%target, error = %err, "failed to load imported file");
                None
            }
        }
    }

    /// Drop files that are neither open nor reachable through imports from an open
    /// file.
    fn collect_garbage(&mut self) {
        let mut reachable: HashSet<Url> = HashSet::new();
        let mut queue: Vec<Url> = self
            .snapshot
            .files
            .values()
            .filter(|f| f.open)
            .map(|f| f.uri.clone())
            .collect();
        while let Some(uri) = queue.pop() {
            if !reachable.insert(uri.clone()) {
                continue;
            }
            queue.extend(
                self.snapshot
                    .imports
                    .links(&uri)
                    .iter()
                    .filter_map(|link| link.target.clone()),
            );
        }

        let unreachable: Vec<Url> = self
            .snapshot
            .files
            .keys()
            .filter(|uri| !reachable.contains(*uri))
            .cloned()
            .collect();
        for uri in unreachable {
            debug!(%uri, "dropping file no longer imported");
            self.drop_file(&uri);
        }
    }

    fn finish(mut self) -> (Snapshot, Vec<Url>) {
        self.link_all();
        self.collect_garbage();
        self.link_all();

        let snapshot = &self.snapshot;
        let mut affected: HashSet<Url> = HashSet::new();
        for uri in &self.changed {
            affected.insert(uri.clone());
            affected.extend(snapshot.imports.dependents(uri));
        }
        if self.symbols_changed {
            // unresolved names may now exist elsewhere, which changes their hint
            affected.extend(
                snapshot
                    .analyses
                    .iter()
                    .filter(|(_, a)| {
                        a.references
                            .iter()
                            .any(|r| matches!(r.resolution, Resolution::Unresolved { .. }))
                    })
                    .map(|(uri, _)| uri.clone()),
            );
        }
        affected.retain(|uri| snapshot.files.contains_key(uri));

        let cycles = snapshot.imports.cycles();
        let analysed: Vec<(Url, FileAnalysis)> = affected
            .par_iter()
            .filter_map(|uri| {
                let file = snapshot.files.get(uri)?;
                let analysis =
                    analysis::analyze(file, &snapshot.graph, &snapshot.imports, &cycles);
                Some((uri.clone(), analysis))
            })
            .collect();

        for (uri, analysis) in analysed {
            self.snapshot.analyses.insert(uri, Arc::new(analysis));
        }
        self.snapshot.generation += 1;

        let mut affected: Vec<Url> = affected.into_iter().collect();
        affected.sort();
        (self.snapshot, affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticCode;
    use crate::workspace::loader::{MockFileSystem, RealFs};
    use tower_lsp::lsp_types::{Position, Range};

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///ws/{name}")).unwrap()
    }

    /// An index whose filesystem has no files.
    fn empty_index() -> WorkspaceIndex {
        let mut fs = MockFileSystem::new();
        fs.expect_is_file().returning(|_| false);
        fs.expect_read().returning(|path| {
            Err(loader::FsError::Read {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });
        WorkspaceIndex::new(Arc::new(fs))
    }

    fn codes(index: &WorkspaceIndex, uri: &Url) -> Vec<DiagnosticCode> {
        index
            .snapshot()
            .analysis(uri)
            .map(|a| a.diagnostics.iter().map(|d| d.code).collect())
            .unwrap_or_default()
    }

    const FOO: &str = "message Foo { string name = 1; }\n";
    const BAR: &str = "import \"a.proto\";\nmessage Bar { Foo f = 1; }\n";

    #[test]
    fn open_resolves_field_type_from_imported_file() {
        let index = empty_index();
        index.open(uri("a.proto"), FOO.into(), 1).unwrap();
        let update = index.open(uri("b.proto"), BAR.into(), 1).unwrap();

        assert_eq!(update.affected, vec![uri("b.proto")]);
        assert!(codes(&index, &uri("b.proto")).is_empty());

        let snapshot = index.snapshot();
        let analysis = snapshot.analysis(&uri("b.proto")).unwrap();
        let target = analysis.references[0].resolution.target().unwrap();
        assert_eq!(target.uri, uri("a.proto"));
        assert_eq!(target.fqn, "Foo");
    }

    #[test]
    fn change_removing_import_makes_type_unresolved() {
        let index = empty_index();
        index.open(uri("a.proto"), FOO.into(), 1).unwrap();
        index.open(uri("b.proto"), BAR.into(), 1).unwrap();

        index
            .change(uri("b.proto"), "message Bar { Foo f = 1; }\n".into(), 2)
            .unwrap();

        assert_eq!(
            codes(&index, &uri("b.proto")),
            vec![DiagnosticCode::UnresolvedType]
        );
    }

    #[test]
    fn change_to_imported_file_reanalyses_importers() {
        let index = empty_index();
        index.open(uri("a.proto"), FOO.into(), 1).unwrap();
        index.open(uri("b.proto"), BAR.into(), 1).unwrap();

        let update = index
            .change(uri("a.proto"), "message Renamed {}\n".into(), 2)
            .unwrap();

        assert_eq!(update.affected, vec![uri("a.proto"), uri("b.proto")]);
        assert_eq!(
            codes(&index, &uri("b.proto")),
            vec![DiagnosticCode::UnresolvedType]
        );
    }

    #[test]
    fn change_with_stale_version_leaves_index_untouched() {
        let index = empty_index();
        index.open(uri("a.proto"), FOO.into(), 3).unwrap();
        let before = index.snapshot();

        let result = index.change(uri("a.proto"), "garbage".into(), 3);

        assert_eq!(
            result,
            Err(IndexError::StaleVersion {
                uri: uri("a.proto"),
                version: 3,
                current: 3,
            })
        );
        let after = index.snapshot();
        assert_eq!(after.generation(), before.generation());
        assert_eq!(after.file(&uri("a.proto")).unwrap().text, FOO);
    }

    #[test]
    fn change_to_unknown_document_is_rejected() {
        let index = empty_index();
        assert_eq!(
            index.change(uri("x.proto"), String::new(), 1),
            Err(IndexError::UnknownDocument(uri("x.proto")))
        );
    }

    #[test]
    fn change_supersedes_previous_version() {
        let index = empty_index();
        index.open(uri("a.proto"), FOO.into(), 1).unwrap();
        let old = index.get(&uri("a.proto")).unwrap();

        index.change(uri("a.proto"), FOO.into(), 2).unwrap();

        assert!(old.is_superseded());
        assert!(!index.get(&uri("a.proto")).unwrap().is_superseded());
    }

    #[test]
    fn edit_applies_ranged_changes_in_order() {
        let index = empty_index();
        index.open(uri("a.proto"), "message A {}\n".into(), 1).unwrap();

        let rename = TextDocumentContentChangeEvent {
            range: Some(Range::new(Position::new(0, 8), Position::new(0, 9))),
            range_length: None,
            text: "Alpha".into(),
        };
        let append = TextDocumentContentChangeEvent {
            range: Some(Range::new(Position::new(1, 0), Position::new(1, 0))),
            range_length: None,
            text: "message B {}\n".into(),
        };
        index.edit(uri("a.proto"), 2, vec![rename, append]).unwrap();

        let file = index.get(&uri("a.proto")).unwrap();
        assert_eq!(file.text, "message Alpha {}\nmessage B {}\n");
        assert_eq!(file.version, Some(2));
        assert!(file.table.symbols.contains_key("Alpha"));
    }

    #[test]
    fn import_cycle_is_reported_on_both_files() {
        let index = empty_index();
        index
            .open(uri("a.proto"), "import \"b.proto\";\n".into(), 1)
            .unwrap();
        index
            .open(uri("b.proto"), "import \"a.proto\";\n".into(), 1)
            .unwrap();

        assert_eq!(codes(&index, &uri("a.proto")), vec![DiagnosticCode::ImportCycle]);
        assert_eq!(codes(&index, &uri("b.proto")), vec![DiagnosticCode::ImportCycle]);
    }

    #[test]
    fn opening_missing_import_resolves_pending_importer() {
        let index = empty_index();
        index.open(uri("b.proto"), BAR.into(), 1).unwrap();
        assert_eq!(
            codes(&index, &uri("b.proto")),
            vec![DiagnosticCode::UnresolvedImport, DiagnosticCode::UnresolvedType]
        );

        let update = index.open(uri("a.proto"), FOO.into(), 1).unwrap();

        assert!(update.affected.contains(&uri("b.proto")));
        assert!(codes(&index, &uri("b.proto")).is_empty());
    }

    #[test]
    fn close_drops_unimported_file() {
        let index = empty_index();
        index.open(uri("a.proto"), FOO.into(), 1).unwrap();
        index.close(uri("a.proto")).unwrap();

        assert!(index.get(&uri("a.proto")).is_none());
        assert!(index.snapshot().graph().is_empty());
    }

    #[test]
    fn imported_files_load_from_disk_and_deletion_unresolves() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.proto");
        std::fs::write(&a_path, FOO).unwrap();
        let a = Url::from_file_path(&a_path).unwrap();
        let b = Url::from_file_path(dir.path().join("b.proto")).unwrap();

        let index = WorkspaceIndex::new(Arc::new(RealFs));
        index.open(b.clone(), BAR.into(), 1).unwrap();

        let loaded = index.get(&a).unwrap();
        assert!(!loaded.open);
        assert_eq!(loaded.version, None);
        assert!(codes(&index, &b).is_empty());

        std::fs::remove_file(&a_path).unwrap();
        let update = index.remove(&a).unwrap();

        assert!(update.affected.contains(&b));
        assert!(index.get(&a).is_none());
        assert_eq!(
            codes(&index, &b),
            vec![DiagnosticCode::UnresolvedImport, DiagnosticCode::UnresolvedType]
        );
    }

    #[test]
    fn close_of_imported_file_reverts_to_disk_content() {
        let dir = tempfile::tempdir().unwrap();
        let a_path = dir.path().join("a.proto");
        std::fs::write(&a_path, FOO).unwrap();
        let a = Url::from_file_path(&a_path).unwrap();
        let b = Url::from_file_path(dir.path().join("b.proto")).unwrap();

        let index = WorkspaceIndex::new(Arc::new(RealFs));
        index
            .open(a.clone(), "message Foo {}\nmessage Unsaved {}\n".into(), 1)
            .unwrap();
        index.open(b.clone(), BAR.into(), 1).unwrap();

        index.close(a.clone()).unwrap();

        let reverted = index.get(&a).unwrap();
        assert!(!reverted.open);
        assert_eq!(reverted.text, FOO);
        assert!(codes(&index, &b).is_empty());
    }

    #[test]
    fn closing_importer_collects_disk_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.proto"), FOO).unwrap();
        let a = Url::from_file_path(dir.path().join("a.proto")).unwrap();
        let b = Url::from_file_path(dir.path().join("b.proto")).unwrap();

        let index = WorkspaceIndex::new(Arc::new(RealFs));
        index.open(b.clone(), BAR.into(), 1).unwrap();
        assert!(index.get(&a).is_some());

        index.close(b).unwrap();
        assert!(index.get(&a).is_none());
    }

    #[test]
    fn configure_adds_import_search_dirs() {
        let include = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(include.path().join("dep")).unwrap();
        std::fs::write(include.path().join("dep/foo.proto"), "package dep;\nmessage Foo {}\n")
            .unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let b = Url::from_file_path(workspace.path().join("b.proto")).unwrap();

        let index = WorkspaceIndex::new(Arc::new(RealFs));
        index
            .open(
                b.clone(),
                "import \"dep/foo.proto\";\nmessage Bar { dep.Foo f = 1; }\n".into(),
                1,
            )
            .unwrap();
        assert_eq!(
            codes(&index, &b),
            vec![DiagnosticCode::UnresolvedImport, DiagnosticCode::UnresolvedType]
        );

        let update = index
            .configure(Settings {
                additional_proto_dirs: vec![include.path().to_path_buf()],
                ..Default::default()
            })
            .unwrap();

        assert!(update.affected.contains(&b));
        assert!(codes(&index, &b).is_empty());
    }
}
