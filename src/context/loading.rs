//! The code-loading boundary of a context and the module resolver reading from it.

use crate::resolver::CodeLocation;
use parking_lot::{Mutex, RwLock};
use rhai::module_resolvers::ModuleResolver;
use rhai::{Engine, EvalAltResult, Module, Position, Scope};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Ordered code locations. Earlier locations win when two provide the same module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadingScope {
    locations: Vec<CodeLocation>,
}

impl LoadingScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope made of plain module directories.
    pub fn from_dirs(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            locations: dirs.into_iter().map(CodeLocation::Directory).collect(),
        }
    }

    pub fn push(&mut self, location: CodeLocation) {
        if !self.locations.contains(&location) {
            self.locations.push(location);
        }
    }

    pub fn extend(&mut self, locations: impl IntoIterator<Item = CodeLocation>) {
        for location in locations {
            self.push(location);
        }
    }

    pub fn locations(&self) -> &[CodeLocation] {
        &self.locations
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// File providing module `name`. Directories are searched for `<name>.rhai`; artifacts
    /// answer to their artifact name or their full coordinate.
    /// Names with parent, root or prefix components never match a directory.
    pub fn find_module(&self, name: &str) -> Option<PathBuf> {
        let contained = is_contained(name);
        if !contained {
            debug!(module = name, "Import name leaves its module directory, skipping directories");
        }
        self.locations.iter().find_map(|location| match location {
            CodeLocation::Directory(dir) if contained => {
                let candidate = module_file(dir, name);
                candidate.is_file().then_some(candidate)
            }
            CodeLocation::Directory(_) => None,
            CodeLocation::Artifact { coordinate, path } => {
                let matches = coordinate.artifact == name || coordinate.to_string() == name;
                (matches && path.is_file()).then(|| path.clone())
            }
        })
    }
}

fn is_contained(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn module_file(dir: &Path, name: &str) -> PathBuf {
    let mut path = dir.join(name);
    if path.extension().and_then(|e| e.to_str()) != Some(crate::resolver::coordinate::ARTIFACT_EXTENSION) {
        let mut file_name = path.file_name().map(|f| f.to_os_string()).unwrap_or_default();
        file_name.push(".");
        file_name.push(crate::resolver::coordinate::ARTIFACT_EXTENSION);
        path.set_file_name(file_name);
    }
    path
}

/// Resolves `import` statements against a shared [`LoadingScope`]. Compiled modules are
/// cached per file for the lifetime of the resolver, which is the lifetime of one context.
pub struct ScopeModuleResolver {
    scope: Arc<RwLock<LoadingScope>>,
    cache: Mutex<HashMap<PathBuf, Arc<Module>>>,
}

impl ScopeModuleResolver {
    pub fn new(scope: Arc<RwLock<LoadingScope>>) -> Self {
        Self {
            scope,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl ModuleResolver for ScopeModuleResolver {
    fn resolve(
        &self,
        engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> Result<Arc<Module>, Box<EvalAltResult>> {
        let file = self
            .scope
            .read()
            .find_module(path)
            .ok_or_else(|| Box::new(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos)))?;

        if let Some(module) = self.cache.lock().get(&file) {
            return Ok(module.clone());
        }

        debug!(module = path, file = %file.display(), "Loading module");
        let in_module = |err: Box<EvalAltResult>| {
            Box::new(EvalAltResult::ErrorInModule(path.to_string(), err, pos))
        };
        let mut ast = engine.compile_file(file.clone()).map_err(in_module)?;
        ast.set_source(file.to_string_lossy().as_ref());
        let mut module = Module::eval_ast_as_new(Scope::new(), &ast, engine).map_err(in_module)?;
        module.build_index();

        let module: Arc<Module> = Arc::new(module);
        self.cache.lock().insert(file, module.clone());
        Ok(module)
    }
}
